//! Directory-backed frame source for dry runs and tests.

use doorbell_core::{CaptureError, Frame, FrameSource};
use std::path::{Path, PathBuf};

const FIXTURE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Cycles through the images of a directory in file-name order.
///
/// The directory is listed on every call, so fixtures added or removed
/// while running are picked up on the next frame.
pub struct FixtureSource {
    dir: PathBuf,
    next: usize,
}

impl FixtureSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next: 0,
        }
    }

    /// Image files in the fixture directory, sorted by name.
    pub fn list(&self) -> Result<Vec<PathBuf>, CaptureError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_fixture(p))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

fn is_fixture(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FIXTURE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

impl FrameSource for FixtureSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let paths = self.list()?;
        if paths.is_empty() {
            return Err(CaptureError::Unavailable(format!(
                "no .jpg, .jpeg or .png fixtures in {}",
                self.dir.display()
            )));
        }

        let path = &paths[self.next % paths.len()];
        self.next = (self.next + 1) % paths.len();

        let image = image::open(path).map_err(|source| CaptureError::Decode {
            path: path.clone(),
            source,
        })?;
        let frame = Frame::from_dynamic_image(&image)?;

        tracing::debug!(path = %path.display(), frame = frame.id(), "loaded fixture");
        Ok(frame)
    }
}
