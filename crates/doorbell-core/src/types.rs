use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A 2-D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Raw detector output in frame pixel coordinates. May extend past the frame.
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

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
            landmarks: None,
        }
    }

    /// Intersection-over-Union between two boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union_area = self.width * self.height + other.width * other.height - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// Integer pixel rectangle, always inside the frame it was clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const EMPTY: Rect = Rect {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Outcome of a single localization step.
///
/// `rect` is clamped to the frame; a zero-area rect is never stored here,
/// it collapses to `None` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    None,
    Face { rect: Rect, confidence: f32 },
    Person { rect: Rect, confidence: f32 },
}

impl Detection {
    pub fn face(rect: Rect, confidence: f32) -> Self {
        if rect.is_empty() {
            Detection::None
        } else {
            Detection::Face { rect, confidence }
        }
    }

    pub fn person(rect: Rect, confidence: f32) -> Self {
        if rect.is_empty() {
            Detection::None
        } else {
            Detection::Person { rect, confidence }
        }
    }

    pub fn rect(&self) -> Option<Rect> {
        match self {
            Detection::None => None,
            Detection::Face { rect, .. } | Detection::Person { rect, .. } => Some(*rect),
        }
    }
}

/// One result of a general object detector.
#[derive(Debug, Clone)]
pub struct ObjectDetection {
    pub bbox: BoundingBox,
    pub label: String,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
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

    /// Cosine distance `1 - similarity`, in [0, 2]. Lower = more similar.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// Nearest gallery entry reported by an identity matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentificationResult {
    Known { name: String },
    Unknown,
}

impl IdentificationResult {
    /// Accept a candidate only when its distance is strictly below `max_distance`.
    pub fn from_candidate(candidate: Option<Candidate>, max_distance: f32) -> Self {
        match candidate {
            Some(c) if c.distance < max_distance => IdentificationResult::Known { name: c.name },
            _ => IdentificationResult::Unknown,
        }
    }
}

/// Probability vector over a classifier's fixed label set.
#[derive(Debug, Clone)]
pub struct ClassScores {
    pub labels: Arc<[String]>,
    pub probabilities: Vec<f32>,
}

/// Label that marks the classifier's background class.
const BACKGROUND_LABEL: &str = "unknown";

impl ClassScores {
    /// Resolve the arg-max label, accepted only when its probability is
    /// strictly above `min_confidence`.
    pub fn resolve(&self, min_confidence: f32) -> OccupationResult {
        if self.labels.len() != self.probabilities.len() {
            tracing::warn!(
                labels = self.labels.len(),
                probabilities = self.probabilities.len(),
                "classifier output does not match its label set"
            );
            return OccupationResult::Unknown;
        }

        let best = self
            .probabilities
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((idx, &p))
                if p > min_confidence && !self.labels[idx].eq_ignore_ascii_case(BACKGROUND_LABEL) =>
            {
                OccupationResult::Role {
                    label: self.labels[idx].clone(),
                    confidence: p,
                }
            }
            _ => OccupationResult::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OccupationResult {
    Role { label: String, confidence: f32 },
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(labels: &[&str], probabilities: Vec<f32>) -> ClassScores {
        ClassScores {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            probabilities,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = BoundingBox::new(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_detection_collapses_empty_rect() {
        assert_eq!(Detection::face(Rect::EMPTY, 0.9), Detection::None);
        let rect = Rect { x: 1, y: 2, width: 0, height: 5 };
        assert_eq!(Detection::person(rect, 0.9), Detection::None);
        let rect = Rect { x: 1, y: 2, width: 3, height: 5 };
        assert_eq!(Detection::person(rect, 0.9).rect(), Some(rect));
    }

    #[test]
    fn test_cosine_distance() {
        let a = Embedding { values: vec![1.0, 0.0] };
        let b = Embedding { values: vec![0.0, 1.0] };
        assert!(a.cosine_distance(&a).abs() < 1e-6);
        assert!((a.cosine_distance(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding { values: vec![0.0, 0.0] };
        let b = Embedding { values: vec![1.0, 0.0] };
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_identify_accepts_below_threshold() {
        let c = Candidate { name: "Alice".into(), distance: 0.39 };
        assert_eq!(
            IdentificationResult::from_candidate(Some(c), 0.4),
            IdentificationResult::Known { name: "Alice".into() }
        );
    }

    #[test]
    fn test_identify_rejects_exact_threshold() {
        let c = Candidate { name: "Alice".into(), distance: 0.4 };
        assert_eq!(IdentificationResult::from_candidate(Some(c), 0.4), IdentificationResult::Unknown);
    }

    #[test]
    fn test_identify_no_candidate() {
        assert_eq!(IdentificationResult::from_candidate(None, 0.4), IdentificationResult::Unknown);
    }

    #[test]
    fn test_resolve_picks_argmax() {
        let s = scores(&["Fireman", "courier"], vec![0.08, 0.92]);
        assert_eq!(
            s.resolve(0.7),
            OccupationResult::Role { label: "courier".into(), confidence: 0.92 }
        );
    }

    #[test]
    fn test_resolve_rejects_exact_threshold() {
        let s = scores(&["Fireman", "courier"], vec![0.3, 0.7]);
        assert_eq!(s.resolve(0.7), OccupationResult::Unknown);
    }

    #[test]
    fn test_resolve_background_label_is_unknown() {
        let s = scores(&["Fireman", "Unknown"], vec![0.05, 0.95]);
        assert_eq!(s.resolve(0.7), OccupationResult::Unknown);
    }

    #[test]
    fn test_resolve_length_mismatch_is_unknown() {
        let s = scores(&["Fireman"], vec![0.05, 0.95]);
        assert_eq!(s.resolve(0.7), OccupationResult::Unknown);
    }
}
