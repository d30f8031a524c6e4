//! V4L2 camera capture via the `v4l` crate.

use crate::convert;
use doorbell_core::{CaptureError, Frame, FrameSource, PixelLayout};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// Startup failures opening the camera. Fatal to the daemon.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, converted to RGB.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(PixelFormat::Grey)
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            Some(PixelFormat::Y16)
        } else {
            None
        }
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
    /// Frames dropped after each stream start while exposure settles.
    warmup_frames: usize,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str, warmup_frames: usize) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for color YUYV; monochrome sensors may negotiate GREY or Y16 instead.
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = CAPTURE_WIDTH;
        fmt.height = CAPTURE_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, GREY, or Y16)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            warmup_frames,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
            warmup_frames,
        })
    }

    /// Convert a raw buffer according to the negotiated format.
    fn decode(&self, buf: &[u8]) -> Result<Frame, CaptureError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => convert::yuyv_to_rgb(buf, self.width, self.height)
                .map(|rgb| (rgb, PixelLayout::Rgb)),
            PixelFormat::Grey => convert::grey_to_gray(buf, self.width, self.height)
                .map(|gray| (gray, PixelLayout::Gray)),
            PixelFormat::Y16 => convert::y16_to_gray(buf, self.width, self.height)
                .map(|gray| (gray, PixelLayout::Gray)),
        };
        let (data, layout) = converted.map_err(|e| CaptureError::Unusable(e.to_string()))?;

        let dark = match layout {
            PixelLayout::Rgb => convert::is_dark_frame(&convert::rgb_luma(&data), DARK_FRAME_THRESHOLD),
            PixelLayout::Gray => convert::is_dark_frame(&data, DARK_FRAME_THRESHOLD),
        };
        if dark {
            return Err(CaptureError::Unusable(format!("{} returned a dark frame", self.device_path)));
        }

        Ok(Frame::new(data, self.width, self.height, layout)?)
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl FrameSource for Camera {
    /// Start a stream, drop the warmup frames, and convert the next one.
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CaptureError::Unavailable(format!("failed to create mmap stream: {e}")))?;

        for _ in 0..self.warmup_frames {
            stream
                .next()
                .map_err(|e| CaptureError::Unavailable(format!("failed to dequeue warmup buffer: {e}")))?;
        }

        let (buf, meta) = stream
            .next()
            .map_err(|e| CaptureError::Unavailable(format!("failed to dequeue buffer: {e}")))?;

        let frame = self.decode(buf)?;
        tracing::debug!(seq = meta.sequence, frame = frame.id(), "captured frame");
        Ok(frame)
    }
}
