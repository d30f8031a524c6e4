//! Gallery enrollment from a directory of reference photos.
//!
//! Layout: `<gallery>/<name>/<image>`. Every image is aligned the same way
//! live frames are, then embedded; images that fail either step are skipped.

use doorbell_core::recognizer::Gallery;
use doorbell_core::{Embedding, FaceAligner, Frame, FrameError, LocalizeError, ModelError};
use std::path::{Path, PathBuf};
use thiserror::Error;

const GALLERY_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read gallery directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("unusable image {path}: {source}")]
    Frame {
        path: PathBuf,
        #[source]
        source: FrameError,
    },
    #[error("no usable face in {path}: {source}")]
    Align {
        path: PathBuf,
        #[source]
        source: LocalizeError,
    },
    #[error("failed to embed {path}: {source}")]
    Embed {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
}

impl GalleryError {
    /// Errors that stop enrollment instead of skipping one image.
    fn is_fatal(&self) -> bool {
        match self {
            GalleryError::Io { .. } => true,
            GalleryError::Align {
                source: LocalizeError::Model(e),
                ..
            }
            | GalleryError::Embed { source: e, .. } => e.is_fatal(),
            _ => false,
        }
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let entries = std::fs::read_dir(dir).map_err(|source| GalleryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| GALLERY_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
}

/// Enroll every identity under `dir`.
///
/// A missing directory yields an empty gallery, so every face is unknown.
pub fn load_gallery<F>(dir: &Path, aligner: &mut FaceAligner, mut embed: F) -> Result<Gallery, GalleryError>
where
    F: FnMut(&Frame) -> Result<Embedding, ModelError>,
{
    let mut gallery = Gallery::new();
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "gallery directory missing; all faces will be unknown");
        return Ok(gallery);
    }

    for person_dir in read_dir_sorted(dir)?.into_iter().filter(|p| p.is_dir()) {
        let Some(name) = person_dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        let mut enrolled = 0usize;
        for path in read_dir_sorted(&person_dir)?.into_iter().filter(|p| is_image(p)) {
            match enroll_image(&path, aligner, &mut embed) {
                Ok(embedding) => {
                    gallery.insert(name.clone(), embedding);
                    enrolled += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping gallery image");
                }
            }
        }
        tracing::info!(name = %name, images = enrolled, "enrolled identity");
    }

    tracing::info!(
        dir = %dir.display(),
        identities = gallery.names().len(),
        embeddings = gallery.len(),
        "gallery loaded"
    );
    Ok(gallery)
}

fn enroll_image<F>(path: &Path, aligner: &mut FaceAligner, embed: &mut F) -> Result<Embedding, GalleryError>
where
    F: FnMut(&Frame) -> Result<Embedding, ModelError>,
{
    let path_buf = || path.to_path_buf();
    let image = image::open(path).map_err(|source| GalleryError::Decode { path: path_buf(), source })?;
    let frame = Frame::from_dynamic_image(&image).map_err(|source| GalleryError::Frame { path: path_buf(), source })?;
    let face = aligner
        .align(&frame)
        .map_err(|source| GalleryError::Align { path: path_buf(), source })?;
    embed(&face.image).map_err(|source| GalleryError::Embed { path: path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::aligner;

    fn write_png(path: &Path, color: [u8; 3], bright: bool) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut img = image::RgbImage::new(40, 40);
        if bright {
            for y in 10..30 {
                for x in 10..30 {
                    img.put_pixel(x, y, image::Rgb(color));
                }
            }
        }
        img.save(path).unwrap();
    }

    /// Mean colour of the crop, as a three-value embedding.
    fn mean_color(frame: &Frame) -> Result<Embedding, ModelError> {
        let mut sum = [0f32; 3];
        let n = (frame.width() * frame.height()) as f32;
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                let px = frame.rgb_at(x, y);
                for c in 0..3 {
                    sum[c] += px[c] as f32 / n;
                }
            }
        }
        Ok(Embedding { values: sum.to_vec() })
    }

    #[test]
    fn test_loads_identities_and_skips_bad_images() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("alice/1.png"), [250, 0, 0], true);
        write_png(&dir.path().join("alice/2.png"), [200, 10, 10], true);
        write_png(&dir.path().join("bob/a.png"), [130, 0, 250], true);
        write_png(&dir.path().join("bob/dark.png"), [0, 0, 0], false);
        std::fs::write(dir.path().join("bob/notes.txt"), "ignored").unwrap();
        std::fs::create_dir_all(dir.path().join("carol")).unwrap();
        std::fs::write(dir.path().join("carol/broken.jpg"), b"not an image").unwrap();
        std::fs::write(dir.path().join("stray.png"), b"ignored too").unwrap();

        let mut aligner = aligner();
        let gallery = load_gallery(dir.path(), &mut aligner, mean_color).unwrap();

        assert_eq!(gallery.len(), 3);
        assert_eq!(gallery.names(), vec!["alice", "bob"]);

        let probe = Embedding { values: vec![240.0, 5.0, 5.0] };
        assert_eq!(gallery.nearest(&probe).unwrap().name, "alice");
    }

    #[test]
    fn test_missing_directory_is_empty_gallery() {
        let dir = tempfile::tempdir().unwrap();
        let mut aligner = aligner();
        let gallery = load_gallery(&dir.path().join("none"), &mut aligner, mean_color).unwrap();
        assert!(gallery.is_empty());
    }

    #[test]
    fn test_embedding_failure_skips_image() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("dave/1.png"), [250, 250, 250], true);
        let mut aligner = aligner();
        let gallery = load_gallery(dir.path(), &mut aligner, |_: &Frame| {
            Err(ModelError::InferenceFailed("offline".into()))
        })
        .unwrap();
        assert!(gallery.is_empty());
    }

    #[test]
    fn test_enroll_errors_name_the_failing_step() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.jpg");
        std::fs::write(&broken, b"not an image").unwrap();
        let dark = dir.path().join("dark.png");
        write_png(&dark, [0, 0, 0], false);

        let mut aligner = aligner();
        let err = enroll_image(&broken, &mut aligner, &mut mean_color).unwrap_err();
        assert!(matches!(err, GalleryError::Decode { ref path, .. } if path == &broken));
        let err = enroll_image(&dark, &mut aligner, &mut mean_color).unwrap_err();
        assert!(matches!(err, GalleryError::Align { source: LocalizeError::NoFace, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_lost_embedding_worker_aborts_enrollment() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("erin/1.png"), [250, 250, 250], true);
        let mut aligner = aligner();
        let err = load_gallery(dir.path(), &mut aligner, |_: &Frame| Err(ModelError::WorkerGone("arcface".into())))
            .unwrap_err();
        assert!(matches!(err, GalleryError::Embed { source: ModelError::WorkerGone(_), .. }));
    }
}
