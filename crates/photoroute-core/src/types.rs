use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
///
/// Serialized as a bare array so the face cache stays a pair of parallel lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    ///
    /// A zero-norm vector has similarity 0 with everything.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Cosine distance in [0, 2]. Lower = more similar.
    pub fn distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// One face found in a photo: where it is and who it looks like.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Gallery index of the accepted candidate, if any.
    pub index: Option<usize>,
    /// Distance of the nearest candidate (accepted or not). `None` for an empty gallery.
    pub distance: Option<f32>,
}

/// Strategy for comparing a probe embedding against a gallery of known faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[Embedding], tolerance: f32) -> MatchResult;
}

/// Nearest-neighbour matcher over cosine distance.
///
/// The first minimum wins on exact ties, so earlier (older) identities take
/// precedence. The nearest candidate is accepted only when its distance is
/// strictly below the tolerance.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[Embedding], tolerance: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, known) in gallery.iter().enumerate() {
            let d = probe.distance(known);
            if d.is_nan() {
                continue;
            }
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((i, d)),
            }
        }

        match best {
            Some((idx, d)) if d < tolerance => MatchResult {
                index: Some(idx),
                distance: Some(d),
            },
            Some((_, d)) => MatchResult {
                index: None,
                distance: Some(d),
            },
            None => MatchResult {
                index: None,
                distance: None,
            },
        }
    }
}

/// What a processed photo turned out to contain.
///
/// The string forms are the values stored in the `photos.type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    /// Neither a face nor digits.
    None,
    /// At least one face, no digits.
    #[serde(rename = "wajah")]
    Face,
    /// Digits, no face.
    #[serde(rename = "angka")]
    Digits,
    /// Both a face and digits.
    #[serde(rename = "campuran")]
    Mixed,
    /// Processing failed.
    Error,
    /// Rejected before detection (oversize).
    Skipped,
}

impl DetectionKind {
    pub const ALL: [DetectionKind; 6] = [
        DetectionKind::None,
        DetectionKind::Face,
        DetectionKind::Digits,
        DetectionKind::Mixed,
        DetectionKind::Error,
        DetectionKind::Skipped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionKind::None => "none",
            DetectionKind::Face => "wajah",
            DetectionKind::Digits => "angka",
            DetectionKind::Mixed => "campuran",
            DetectionKind::Error => "error",
            DetectionKind::Skipped => "skipped",
        }
    }

    /// Combine the two detection passes into one routing kind.
    pub fn from_flags(face_detected: bool, digits_detected: bool) -> Self {
        match (face_detected, digits_detected) {
            (true, true) => DetectionKind::Mixed,
            (true, false) => DetectionKind::Face,
            (false, true) => DetectionKind::Digits,
            (false, false) => DetectionKind::None,
        }
    }
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown detection kind: {0}")]
pub struct ParseKindError(String);

impl FromStr for DetectionKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// Final status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Failed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
