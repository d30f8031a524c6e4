//! Raw buffer conversions: YUYV to RGB, Y16 to 8-bit, dark-frame detection.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid {format} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
}

fn check_len(format: &'static str, buf: &[u8], expected: usize) -> Result<(), ConvertError> {
    if buf.len() < expected {
        return Err(ConvertError::InvalidLength {
            format,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Convert packed YUYV (4:2:2) to interleaved RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConvertError> {
    let pixels = (width * height) as usize;
    check_len("YUYV", yuyv, pixels * 2)?;

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..pixels * 2].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push((y + 1.402 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344_136 * u - 0.714_136 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}

/// Copy the first `width * height` bytes of an 8-bit GREY buffer.
pub fn grey_to_gray(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConvertError> {
    let pixels = (width * height) as usize;
    check_len("GREY", buf, pixels)?;
    Ok(buf[..pixels].to_vec())
}

/// Downscale 16-bit little-endian grayscale to 8-bit by keeping the high byte.
pub fn y16_to_gray(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConvertError> {
    let pixels = (width * height) as usize;
    check_len("Y16", buf, pixels * 2)?;
    Ok(buf[..pixels * 2].chunks_exact(2).map(|px| px[1]).collect())
}

/// Integer BT.601 luma of interleaved RGB.
pub fn rgb_luma(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|p| ((p[0] as u32 * 299 + p[1] as u32 * 587 + p[2] as u32 * 114) / 1000) as u8)
        .collect()
}

/// Check if a frame is dark: true if more than `threshold_pct` of luma
/// values fall in the darkest bucket (0–31).
pub fn is_dark_frame(luma: &[u8], threshold_pct: f32) -> bool {
    if luma.is_empty() {
        return true;
    }
    let dark_count = luma.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / luma.len() as f32) > threshold_pct
}
