//! Frame to NCHW tensor preprocessing shared by the ONNX models.

use crate::frame::Frame;
use ndarray::Array4;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-pixel normalization applied while filling a tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// `(p - mean) / std` on raw 0..255 values, same for every channel.
    MeanStd { mean: f32, std: f32 },
    /// `p / 255`.
    UnitRange,
    /// `(p / 255 - mean[c]) / std[c]` with the ImageNet statistics.
    ImageNet,
}

impl Normalization {
    pub fn apply(self, channel: usize, pixel: f32) -> f32 {
        match self {
            Normalization::MeanStd { mean, std } => (pixel - mean) / std,
            Normalization::UnitRange => pixel / 255.0,
            Normalization::ImageNet => (pixel / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
        }
    }
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Fit a `width`×`height` frame into a `target_w`×`target_h` canvas.
    pub fn fit(width: u32, height: u32, target_w: usize, target_h: usize) -> Self {
        let scale = (target_w as f32 / width as f32).min(target_h as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (target_w as f32 - new_w) / 2.0,
            pad_y: (target_h as f32 - new_h) / 2.0,
        }
    }

    /// Map a point from tensor space back to frame pixels.
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Bilinear resize to RGB, gray frames replicated across channels.
pub fn resize_rgb(frame: &Frame, new_w: usize, new_h: usize) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let channels = frame.channels();
    let data = frame.data();
    let mut out = vec![0u8; new_w * new_h * 3];
    if width == 0 || height == 0 || new_w == 0 || new_h == 0 {
        return out;
    }

    let inv_x = width as f32 / new_w as f32;
    let inv_y = height as f32 / new_h as f32;

    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * inv_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * inv_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..3 {
                let sc = if channels == 1 { 0 } else { c };
                let px = |xx: usize, yy: usize| data[(yy * width + xx) * channels + sc] as f32;
                let val = px(x0, y0) * (1.0 - fx) * (1.0 - fy)
                    + px(x1, y0) * fx * (1.0 - fy)
                    + px(x0, y1) * (1.0 - fx) * fy
                    + px(x1, y1) * fx * fy;
                out[(y * new_w + x) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

/// Letterbox `frame` into a `target_w`×`target_h` NCHW tensor.
///
/// Padding is filled with `pad_value` before normalization.
pub fn letterbox_tensor(
    frame: &Frame,
    target_w: usize,
    target_h: usize,
    pad_value: f32,
    norm: Normalization,
) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(frame.width(), frame.height(), target_w, target_h);
    let new_w = ((frame.width() as f32 * letterbox.scale).round() as usize).min(target_w);
    let new_h = ((frame.height() as f32 * letterbox.scale).round() as usize).min(target_h);
    let resized = resize_rgb(frame, new_w, new_h);

    let pad_x_start = letterbox.pad_x.floor() as usize;
    let pad_y_start = letterbox.pad_y.floor() as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, target_h, target_w));

    for y in 0..target_h {
        for x in 0..target_w {
            let inside = y >= pad_y_start && y < pad_y_start + new_h && x >= pad_x_start && x < pad_x_start + new_w;
            for c in 0..3 {
                let pixel = if inside {
                    resized[((y - pad_y_start) * new_w + (x - pad_x_start)) * 3 + c] as f32
                } else {
                    pad_value
                };
                tensor[[0, c, y, x]] = norm.apply(c, pixel);
            }
        }
    }

    (tensor, letterbox)
}

/// Stretch `frame` to exactly `target_w`×`target_h`, ignoring aspect ratio.
pub fn stretch_tensor(frame: &Frame, target_w: usize, target_h: usize, norm: Normalization) -> Array4<f32> {
    let resized = resize_rgb(frame, target_w, target_h);
    let mut tensor = Array4::<f32>::zeros((1, 3, target_h, target_w));
    for y in 0..target_h {
        for x in 0..target_w {
            for c in 0..3 {
                tensor[[0, c, y, x]] = norm.apply(c, resized[(y * target_w + x) * 3 + c] as f32);
            }
        }
    }
    tensor
}

/// Read a fixed spatial input size from an NCHW model input, if declared.
pub fn declared_input_size(session: &ort::session::Session) -> Option<(usize, usize)> {
    let input = session.inputs().first()?;
    if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
        if shape.len() == 4 && shape[2] > 0 && shape[3] > 0 {
            return Some((shape[3] as usize, shape[2] as usize));
        }
    }
    None
}
