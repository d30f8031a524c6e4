//! doorbell-core: visitor identification and alert decisions.
//!
//! Aligns faces with SCRFD, matches them against a gallery with ArcFace,
//! locates persons with YOLO and classifies their occupation, all running
//! via ONNX Runtime for CPU inference. The [`Cascade`] turns one frame into
//! at most one [`AlertEvent`].

pub mod alert;
pub mod alignment;
pub mod cascade;
pub mod classifier;
pub mod detector;
pub mod frame;
pub mod geometry;
pub mod models;
pub mod object_detector;
pub mod person;
pub mod recognizer;
pub mod source;
pub mod tensor;
pub mod types;
pub mod worker;

#[cfg(test)]
mod testing;

pub use alert::{AlertCategory, AlertEvent, CycleOutcome};
pub use alignment::{AlignedFaceImage, FaceAligner, LocalizeError};
pub use cascade::{Cascade, CascadePolicy};
pub use frame::{Frame, FrameError, PixelLayout};
pub use models::ModelError;
pub use person::{PersonImage, PersonLocator};
pub use source::{CaptureError, FrameSource};
pub use types::{BoundingBox, Candidate, ClassScores, Detection, Embedding, IdentificationResult, OccupationResult};
pub use worker::{LandmarkWorker, ModelWorker};
