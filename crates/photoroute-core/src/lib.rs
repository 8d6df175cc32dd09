//! photoroute-core — detection, identity and record keeping for the photo router.
//!
//! Faces are found with SCRFD and embedded with ArcFace (both via ONNX
//! Runtime); text is read by an external Tesseract process. Known faces
//! live in a [`FaceIdentityStore`], outcomes in a [`PhotoRecorder`].

pub mod adapter;
pub mod alignment;
pub mod config;
pub mod detector;
pub mod identity;
pub mod ocr;
pub mod recognizer;
pub mod records;
pub mod types;

pub use adapter::{DetectionAdapter, DetectionError, FaceAnalyzer, OnnxFaceAnalyzer, TextReader};
pub use config::{default_data_dir, Config, ConfigError, UndetectedPolicy};
pub use detector::FaceDetector;
pub use identity::{FaceCache, FaceIdentityStore, IdentityPaths, IdentityPolicy, StoreError};
pub use ocr::TesseractReader;
pub use recognizer::FaceRecognizer;
pub use records::{PhotoRecord, PhotoRecorder, RecordError};
pub use types::{BoundingBox, DetectedFace, DetectionKind, Embedding, RecordStatus};

/// File extensions treated as photos, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Whether `path` has a photo extension.
pub fn is_image_path(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}
