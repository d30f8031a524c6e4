//! doorbell-hw: frame sources for the doorbell daemon.
//!
//! Provides V4L2-based camera capture and a fixture-directory source that
//! implement the same [`FrameSource`](doorbell_core::FrameSource) trait.

pub mod camera;
pub mod convert;
pub mod fixtures;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use fixtures::FixtureSource;
