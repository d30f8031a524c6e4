//! ONNX occupation classifier for cropped persons.

use crate::frame::Frame;
use crate::models::{ModelError, OccupationClassifier};
use crate::person::PersonImage;
use crate::tensor::{declared_input_size, stretch_tensor, Normalization};
use crate::types::ClassScores;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Arc;

const CLASSIFIER_DEFAULT_INPUT_SIZE: usize = 224;

/// Labels used when none are configured.
pub const DEFAULT_OCCUPATION_LABELS: [&str; 3] = ["Fireman", "Police Officer", "Delivery Person"];

pub struct OnnxOccupationClassifier {
    session: Session,
    input_width: usize,
    input_height: usize,
    labels: Arc<[String]>,
}

impl OnnxOccupationClassifier {
    pub fn load(model_path: &Path, labels: Vec<String>) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let (input_width, input_height) = declared_input_size(&session)
            .unwrap_or((CLASSIFIER_DEFAULT_INPUT_SIZE, CLASSIFIER_DEFAULT_INPUT_SIZE));

        tracing::info!(
            path = %model_path.display(),
            input_width,
            input_height,
            ?labels,
            "loaded occupation classifier"
        );

        Ok(Self {
            session,
            input_width,
            input_height,
            labels: labels.into(),
        })
    }

    fn scores(&mut self, image: &Frame) -> Result<Vec<f32>, ModelError> {
        let input = stretch_tensor(image, self.input_width, self.input_height, Normalization::ImageNet);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("classifier output: {e}")))?;
        Ok(to_distribution(raw))
    }
}

impl OccupationClassifier for OnnxOccupationClassifier {
    fn classify(&mut self, person: &PersonImage) -> Result<ClassScores, ModelError> {
        let probabilities = self.scores(&person.image)?;
        if probabilities.len() != self.labels.len() {
            return Err(ModelError::InferenceFailed(format!(
                "classifier produced {} scores for {} labels",
                probabilities.len(),
                self.labels.len()
            )));
        }
        Ok(ClassScores {
            labels: Arc::clone(&self.labels),
            probabilities,
        })
    }
}

/// Softmax, unless `raw` already is a probability distribution.
fn to_distribution(raw: &[f32]) -> Vec<f32> {
    let is_distribution =
        raw.iter().all(|&p| (0.0..=1.0).contains(&p)) && (raw.iter().sum::<f32>() - 1.0).abs() < 1e-3;
    if is_distribution || raw.is_empty() {
        return raw.to_vec();
    }

    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = raw.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
