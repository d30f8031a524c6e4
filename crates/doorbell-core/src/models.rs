//! Collaborator interfaces consumed by the cascade.
//!
//! Implementations may be stateful (session buffers, per-frame caches),
//! hence `&mut self`. Every call is synchronous from the caller's view;
//! wrap a model in [`ModelWorker`](crate::worker::ModelWorker) to bound it
//! with a deadline.

use crate::alignment::AlignedFaceImage;
use crate::frame::Frame;
use crate::person::PersonImage;
use crate::types::{BoundingBox, Candidate, ClassScores, ObjectDetection, Point};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("{model} did not answer within {timeout:?}")]
    Timeout { model: String, timeout: Duration },
    #[error("{0} worker thread exited")]
    WorkerGone(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl ModelError {
    /// A model whose worker thread has exited will fail every later call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ModelError::WorkerGone(_))
    }
}

/// Face localization. Results are in frame pixel coordinates, in any order.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ModelError>;
}

/// Facial landmark localization for the most prominent face in a frame.
pub trait LandmarkModel: Send {
    /// Landmark points in frame pixel coordinates; empty when no face was found.
    fn landmarks(&mut self, frame: &Frame) -> Result<Vec<Point>, ModelError>;

    /// Indices of the (left eye, right eye) points in [`landmarks`](Self::landmarks).
    fn eye_indices(&self) -> (usize, usize);
}

/// General object detection. Results are reported in the detector's own order.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<ObjectDetection>, ModelError>;
}

/// Face identity lookup against a reference gallery.
pub trait IdentityMatcher: Send {
    /// Closest gallery entry and its distance, or `None` when the gallery
    /// has no candidate at all. Thresholding is the caller's decision.
    fn match_face(&mut self, face: &AlignedFaceImage) -> Result<Option<Candidate>, ModelError>;
}

/// Occupation classification of a cropped person.
pub trait OccupationClassifier: Send {
    fn classify(&mut self, person: &PersonImage) -> Result<ClassScores, ModelError>;
}
