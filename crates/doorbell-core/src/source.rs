use crate::frame::{Frame, FrameError};
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a frame source produced nothing usable this cycle.
///
/// All variants are recoverable: the run loop waits and asks again.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("frame unavailable: {0}")]
    Unavailable(String),
    #[error("frame unusable: {0}")]
    Unusable(String),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that yields one frame per cascade cycle.
///
/// Live sensors and deterministic fixtures implement the same trait; the
/// cascade cannot tell them apart.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;
}
