//! ArcFace face recognizer via ONNX Runtime.
//!
//! Extracts 512-dimensional face embeddings from aligned face crops,
//! using the w600k_r50 ArcFace model, and matches them against an
//! in-memory gallery of enrolled identities.

use crate::alignment::AlignedFaceImage;
use crate::frame::Frame;
use crate::models::{IdentityMatcher, ModelError};
use crate::tensor::{stretch_tensor, Normalization};
use crate::types::{Candidate, Embedding};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

// --- Named constants (different from SCRFD!) ---
const ARCFACE_INPUT_SIZE: usize = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // not 128.0; symmetric around 127.5
const ARCFACE_EMBEDDING_DIM: usize = 512;

const ARCFACE_NORM: Normalization = Normalization::MeanStd {
    mean: ARCFACE_MEAN,
    std: ARCFACE_STD,
};

/// ArcFace-based face embedder.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Extract an L2-normalized embedding from an aligned face crop.
    pub fn extract(&mut self, face: &Frame) -> Result<Embedding, ModelError> {
        let input = stretch_tensor(face, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE, ARCFACE_NORM);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw_data.len() != ARCFACE_EMBEDDING_DIM {
            return Err(ModelError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw_data.len()
            )));
        }

        Ok(l2_normalize(raw_data.to_vec()))
    }
}

fn l2_normalize(raw: Vec<f32>) -> Embedding {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    let values = if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    };
    Embedding { values }
}

/// Enrolled identities and their reference embeddings.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<(String, Embedding)>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, embedding: Embedding) {
        self.entries.push((name.into(), embedding));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct identity names, in enrollment order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.entries {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Closest entry by cosine distance. Ties keep the earlier entry.
    pub fn nearest(&self, probe: &Embedding) -> Option<Candidate> {
        self.entries
            .iter()
            .map(|(name, reference)| (name, probe.cosine_distance(reference)))
            .fold(None, |best: Option<(&String, f32)>, (name, distance)| match best {
                Some((_, d)) if d <= distance => best,
                _ => Some((name, distance)),
            })
            .map(|(name, distance)| Candidate {
                name: name.clone(),
                distance,
            })
    }
}

/// Identity matcher: ArcFace embedding plus nearest gallery lookup.
pub struct ArcFaceMatcher {
    recognizer: FaceRecognizer,
    gallery: Gallery,
}

impl ArcFaceMatcher {
    pub fn new(recognizer: FaceRecognizer, gallery: Gallery) -> Self {
        Self { recognizer, gallery }
    }
}

impl IdentityMatcher for ArcFaceMatcher {
    fn match_face(&mut self, face: &AlignedFaceImage) -> Result<Option<Candidate>, ModelError> {
        if self.gallery.is_empty() {
            return Ok(None);
        }
        let probe = self.recognizer.extract(&face.image)?;
        Ok(self.gallery.nearest(&probe))
    }
}
