//! Detection adapter over face analysis and text recognition.
//!
//! The classification engine only sees [`DetectionAdapter`]; concrete
//! backends plug in through [`FaceAnalyzer`] and [`TextReader`].

use crate::detector::{DetectorError, FaceDetector};
use crate::ocr::{OcrError, TesseractReader};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::DetectedFace;
use image::{DynamicImage, GrayImage, RgbImage};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("face detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("face recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("text recognition: {0}")]
    Ocr(#[from] OcrError),
    #[error("detection backend unavailable: {0}")]
    Unavailable(String),
}

/// Finds faces and computes one embedding per face.
pub trait FaceAnalyzer: Send + Sync {
    fn detect_faces(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectionError>;
}

/// Recognises text fragments in an image.
pub trait TextReader: Send + Sync {
    fn read_text(&self, image: &GrayImage) -> Result<Vec<String>, DetectionError>;
}

/// SCRFD + ArcFace behind a single lock.
///
/// ONNX sessions need exclusive access to run, so face inference is
/// serialised across workers in one process.
pub struct OnnxFaceAnalyzer {
    models: Mutex<(FaceDetector, FaceRecognizer)>,
}

impl OnnxFaceAnalyzer {
    /// Load both ONNX models. Fails fast if either is missing.
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, DetectionError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self {
            models: Mutex::new((detector, recognizer)),
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn detect_faces(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectionError> {
        let mut models = self
            .models
            .lock()
            .map_err(|_| DetectionError::Unavailable("face model lock poisoned".into()))?;
        let (detector, recognizer) = &mut *models;

        let boxes = detector.detect(image)?;
        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let embedding = recognizer.extract(image, &bbox)?;
            faces.push(DetectedFace { bbox, embedding });
        }
        Ok(faces)
    }
}

impl TextReader for TesseractReader {
    fn read_text(&self, image: &GrayImage) -> Result<Vec<String>, DetectionError> {
        Ok(self.read(image)?)
    }
}

/// Uniform entry point used by the classification engine.
#[derive(Clone)]
pub struct DetectionAdapter {
    faces: Arc<dyn FaceAnalyzer>,
    text: Arc<dyn TextReader>,
}

impl DetectionAdapter {
    pub fn new(faces: Arc<dyn FaceAnalyzer>, text: Arc<dyn TextReader>) -> Self {
        Self { faces, text }
    }

    pub fn face_analyzer(&self) -> &dyn FaceAnalyzer {
        self.faces.as_ref()
    }

    /// Zero or more faces, each with its bounding box and embedding.
    pub fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, DetectionError> {
        let started = Instant::now();
        let faces = self.faces.detect_faces(&image.to_rgb8())?;
        tracing::debug!(
            faces = faces.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "face pass"
        );
        Ok(faces)
    }

    /// Zero or more recognised text fragments, read from the grayscale image.
    pub fn detect_text(&self, image: &DynamicImage) -> Result<Vec<String>, DetectionError> {
        let started = Instant::now();
        let fragments = self.text.read_text(&image.to_luma8())?;
        tracing::debug!(
            fragments = fragments.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "text pass"
        );
        Ok(fragments)
    }
}
