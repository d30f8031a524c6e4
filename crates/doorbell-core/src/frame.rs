//! Immutable pixel frames.
//!
//! A `Frame` owns its pixels behind an `Arc`, so handing a frame to a model
//! worker thread is a reference-count bump rather than a copy. Every frame,
//! including frames derived by rotation or cropping, gets a process-unique id
//! that models may use to cache per-frame work.

use crate::types::Rect;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Channel order of a frame's interleaved pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// One luma byte per pixel.
    Gray,
    /// Three bytes per pixel, R then G then B.
    Rgb,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Gray => 1,
            PixelLayout::Rgb => 3,
        }
    }
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[derive(Clone)]
pub struct Frame {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    layout: PixelLayout,
    timestamp: Instant,
    id: u64,
}

impl Frame {
    /// Wrap a row-major interleaved buffer, stamping it with the current time.
    pub fn new(data: Vec<u8>, width: u32, height: u32, layout: PixelLayout) -> Result<Self, FrameError> {
        Self::with_timestamp(data, width, height, layout, Instant::now())
    }

    fn with_timestamp(
        data: Vec<u8>,
        width: u32,
        height: u32,
        layout: PixelLayout,
        timestamp: Instant,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data: data.into(),
            width,
            height,
            layout,
            timestamp,
            id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Build a frame of the same layout and capture time from new pixel data.
    pub(crate) fn derive(&self, data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        Self::with_timestamp(data, width, height, self.layout, self.timestamp)
    }

    pub fn from_rgb_image(image: image::RgbImage) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, PixelLayout::Rgb)
    }

    pub fn from_dynamic_image(image: &image::DynamicImage) -> Result<Self, FrameError> {
        Self::from_rgb_image(image.to_rgb8())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    /// Capture time, carried unchanged through derived frames.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// RGB value at integer coordinates; gray frames replicate luma.
    ///
    /// Callers must stay inside the frame.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * self.channels();
        match self.layout {
            PixelLayout::Gray => {
                let v = self.data[idx];
                [v, v, v]
            }
            PixelLayout::Rgb => [self.data[idx], self.data[idx + 1], self.data[idx + 2]],
        }
    }

    /// Copy out the pixels under `rect`. `None` when the rect is empty or
    /// not fully inside the frame.
    pub fn crop(&self, rect: &Rect) -> Option<Frame> {
        if rect.is_empty()
            || rect.x.checked_add(rect.width)? > self.width
            || rect.y.checked_add(rect.height)? > self.height
        {
            return None;
        }

        let channels = self.channels();
        let row_len = rect.width as usize * channels;
        let mut out = Vec::with_capacity(row_len * rect.height as usize);
        for y in rect.y..rect.y + rect.height {
            let start = (y as usize * self.width as usize + rect.x as usize) * channels;
            out.extend_from_slice(&self.data[start..start + row_len]);
        }

        self.derive(out, rect.width, rect.height).ok()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
