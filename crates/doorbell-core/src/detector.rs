//! SCRFD face detector via ONNX Runtime.
//!
//! Implements the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model with 3-stride anchor-free decoding and NMS post-processing.
//! The same model also supplies the five-point landmarks used for alignment.

use crate::frame::Frame;
use crate::models::{FaceDetector, LandmarkModel, ModelError};
use crate::tensor::{letterbox_tensor, Letterbox, Normalization};
use crate::types::{BoundingBox, Point};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

// --- Named constants (no magic numbers) ---
const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Landmark order: left eye, right eye, nose, left mouth, right mouth.
const SCRFD_EYE_INDICES: (usize, usize) = (0, 1);

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector and landmark model.
pub struct ScrfdDetector {
    session: Session,
    input_height: usize,
    input_width: usize,
    threshold: f32,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    /// Discovered by name at load time; falls back to positional ordering.
    stride_indices: [StrideOutputIndices; 3],
    /// Decoded faces of the most recent frame, keyed by frame id.
    last: Option<(u64, Vec<BoundingBox>)>,
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        let num_outputs = output_names.len();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if num_outputs < 9 {
            return Err(ModelError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {num_outputs}"
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_height: SCRFD_INPUT_SIZE,
            input_width: SCRFD_INPUT_SIZE,
            threshold: SCRFD_CONFIDENCE_THRESHOLD,
            stride_indices,
            last: None,
        })
    }

    /// Lower or raise the per-anchor score floor used while decoding.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Faces in `frame` sorted by confidence, reusing the last decode when
    /// the same frame is asked for twice.
    fn faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        if let Some((id, faces)) = &self.last {
            if *id == frame.id() {
                return Ok(faces.clone());
            }
        }

        let faces = self.infer(frame)?;
        self.last = Some((frame.id(), faces.clone()));
        Ok(faces)
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        let norm = Normalization::MeanStd {
            mean: SCRFD_MEAN,
            std: SCRFD_STD,
        };
        // Pad with the mean so padding normalizes to 0.0.
        let (input, letterbox) = letterbox_tensor(frame, self.input_width, self.input_height, SCRFD_MEAN, norm);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            let grid = (self.input_width / stride, self.input_height / stride);
            all_detections.extend(decode_stride(scores, bboxes, kps, stride, grid, &letterbox, self.threshold));
        }

        let mut result = nms(all_detections, SCRFD_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(frame = frame.id(), faces = result.len(), "SCRFD inference");
        Ok(result)
    }
}

impl FaceDetector for ScrfdDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        self.faces(frame)
    }
}

impl LandmarkModel for ScrfdDetector {
    /// Keypoints of the most confident face; empty when there is none.
    fn landmarks(&mut self, frame: &Frame) -> Result<Vec<Point>, ModelError> {
        let faces = self.faces(frame)?;
        Ok(faces
            .first()
            .and_then(|f| f.landmarks)
            .map(|lms| lms.iter().map(|&(x, y)| Point::new(x, y)).collect())
            .unwrap_or_default())
    }

    fn eye_indices(&self) -> (usize, usize) {
        SCRFD_EYE_INDICES
    }
}

/// Discover output tensor ordering by name.
///
/// SCRFD models may export tensors with named outputs ("score_8", "bbox_16", ...) or
/// generic numeric names. If the named pattern is complete, maps them to stride slots.
/// Otherwise falls back to the standard positional ordering:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
///   [6-8] = kps    (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(v) if v.len() == 3 => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [v[0], v[1], v[2]]
        }
        _ => {
            tracing::info!(
                ?names,
                "SCRFD: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes, [6-8]=kps"
            );
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Decode detections for a single stride level over a `(grid_w, grid_h)` grid.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    (grid_w, grid_h): (usize, usize),
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let num_anchors = grid_h * grid_w * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score < threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid_w) as f32 * s;
        let anchor_cy = (anchor_idx / grid_w) as f32 * s;

        // [x1_offset, y1_offset, x2_offset, y2_offset] * stride
        let bbox_off = idx * 4;
        if bbox_off + 3 >= bboxes.len() {
            continue;
        }
        let (x1, y1) = letterbox.to_frame(anchor_cx - bboxes[bbox_off] * s, anchor_cy - bboxes[bbox_off + 1] * s);
        let (x2, y2) = letterbox.to_frame(anchor_cx + bboxes[bbox_off + 2] * s, anchor_cy + bboxes[bbox_off + 3] * s);

        let kps_off = idx * 10;
        let landmarks = (kps_off + 9 < kps.len()).then(|| {
            std::array::from_fn(|i| {
                letterbox.to_frame(anchor_cx + kps[kps_off + i * 2] * s, anchor_cy + kps[kps_off + i * 2 + 1] * s)
            })
        });

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
pub(crate) fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if !suppressed[j] && detections[i].iou(&detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}
