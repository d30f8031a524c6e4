//! Roll estimation, rotation about the frame center, and box clamping.
//!
//! All angles are in degrees and follow the image-coordinate convention
//! (y axis pointing down): rotating by `-roll_angle(l, r)` brings the right
//! eye level with the left.

use crate::frame::Frame;
use crate::types::{BoundingBox, Point, Rect};

/// Roll of the line from `left_eye` to `right_eye`, in degrees.
///
/// Returns `None` when the points coincide and the angle is undefined.
pub fn roll_angle(left_eye: Point, right_eye: Point) -> Option<f32> {
    let dx = right_eye.x - left_eye.x;
    let dy = right_eye.y - left_eye.y;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    Some(dy.atan2(dx).to_degrees())
}

/// Geometric center of a `width` × `height` pixel grid.
pub fn frame_center(width: u32, height: u32) -> Point {
    Point::new((width as f32 - 1.0) / 2.0, (height as f32 - 1.0) / 2.0)
}

/// Rotate `point` about `center` by `degrees`.
pub fn rotate_point(point: Point, center: Point, degrees: f32) -> Point {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let dx = point.x - center.x;
    let dy = point.y - center.y;
    Point::new(center.x + cos * dx - sin * dy, center.y + sin * dx + cos * dy)
}

/// Rotate frame content about its center, keeping the frame dimensions.
///
/// Uses bilinear interpolation. Content rotated past the frame edge is
/// discarded and uncovered pixels are filled with 0.
pub fn rotate_about_center(frame: &Frame, degrees: f32) -> Frame {
    if degrees == 0.0 || !degrees.is_finite() {
        return frame.clone();
    }

    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let channels = frame.channels();
    let src = frame.data();
    let center = frame_center(frame.width(), frame.height());

    // Inverse mapping: each output pixel samples the source at the point
    // that the forward rotation carries onto it.
    let (sin, cos) = (-degrees).to_radians().sin_cos();

    let sample = |x: i32, y: i32, c: usize| -> f32 {
        if x >= 0 && x < width as i32 && y >= 0 && y < height as i32 {
            src[(y as usize * width + x as usize) * channels + c] as f32
        } else {
            0.0
        }
    };

    let mut out = vec![0u8; src.len()];
    for oy in 0..height {
        for ox in 0..width {
            let dx = ox as f32 - center.x;
            let dy = oy as f32 - center.y;
            let sx = center.x + cos * dx - sin * dy;
            let sy = center.y + sin * dx + cos * dy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            for c in 0..channels {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                out[(oy * width + ox) * channels + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    match frame.derive(out, frame.width(), frame.height()) {
        Ok(rotated) => rotated,
        // Same dimensions and layout as the source, so this cannot fail.
        Err(_) => frame.clone(),
    }
}

/// Intersect a detector box with the `width` × `height` frame.
///
/// Edges are rounded outward to whole pixels before clipping. Returns
/// [`Rect::EMPTY`] when nothing of the box lies inside the frame.
pub fn clamp_box(bbox: &BoundingBox, width: u32, height: u32) -> Rect {
    if !(bbox.x.is_finite() && bbox.y.is_finite() && bbox.width.is_finite() && bbox.height.is_finite()) {
        return Rect::EMPTY;
    }

    let x0 = bbox.x.floor().max(0.0);
    let y0 = bbox.y.floor().max(0.0);
    let x1 = (bbox.x + bbox.width).ceil().min(width as f32);
    let y1 = (bbox.y + bbox.height).ceil().min(height as f32);

    if x1 <= x0 || y1 <= y0 {
        return Rect::EMPTY;
    }

    Rect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    }
}
