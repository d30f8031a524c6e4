//! YOLO object detector via ONNX Runtime (COCO-80 classes).
//!
//! Accepts both YOLOv8-style heads (`[cx, cy, w, h, class scores...]`) and
//! YOLOv5-style heads with an objectness column, in either
//! `[1, features, detections]` or `[1, detections, features]` layout.

use crate::detector::nms;
use crate::frame::Frame;
use crate::models::{ModelError, ObjectDetector};
use crate::tensor::{declared_input_size, letterbox_tensor, Letterbox, Normalization};
use crate::types::{BoundingBox, ObjectDetection};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// Fallback input resolution when the model declares dynamic dimensions.
const YOLO_DEFAULT_INPUT_SIZE: usize = 640;
const YOLO_PAD_VALUE: f32 = 114.0;
const YOLO_NMS_THRESHOLD: f32 = 0.45;
const YOLO_DEFAULT_SCORE: f32 = 0.25;
const YOLO_DEFAULT_MAX_RESULTS: usize = 5;

pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

pub struct YoloDetector {
    session: Session,
    input_width: usize,
    input_height: usize,
    min_score: f32,
    max_results: usize,
}

impl YoloDetector {
    /// Load a YOLO ONNX model. The input resolution is read from the model
    /// when it is fixed.
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let (input_width, input_height) =
            declared_input_size(&session).unwrap_or((YOLO_DEFAULT_INPUT_SIZE, YOLO_DEFAULT_INPUT_SIZE));

        tracing::info!(
            path = %model_path.display(),
            input_width,
            input_height,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded YOLO model"
        );

        Ok(Self {
            session,
            input_width,
            input_height,
            min_score: YOLO_DEFAULT_SCORE,
            max_results: YOLO_DEFAULT_MAX_RESULTS,
        })
    }

    pub fn with_limits(mut self, min_score: f32, max_results: usize) -> Self {
        self.min_score = min_score;
        self.max_results = max_results;
        self
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<ObjectDetection>, ModelError> {
        let (input, letterbox) = letterbox_tensor(
            frame,
            self.input_width,
            self.input_height,
            YOLO_PAD_VALUE,
            Normalization::UnitRange,
        );

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("YOLO output: {e}")))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let head = HeadLayout::from_shape(&dims)?;

        let detections = decode(data, head, &letterbox, self.min_score, self.max_results);
        tracing::debug!(frame = frame.id(), objects = detections.len(), "YOLO inference");
        Ok(detections)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeadLayout {
    num_dets: usize,
    num_feats: usize,
    /// `[1, features, detections]`
    transposed: bool,
    /// YOLOv5 heads carry an objectness column before the class scores.
    objectness: bool,
}

impl HeadLayout {
    fn from_shape(shape: &[usize]) -> Result<Self, ModelError> {
        if shape.len() != 3 {
            return Err(ModelError::InferenceFailed(format!("unexpected YOLO output shape: {shape:?}")));
        }
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed { (shape[2], shape[1]) } else { (shape[1], shape[2]) };

        let objectness = match num_feats.checked_sub(4) {
            Some(n) if n == COCO_LABELS.len() => false,
            Some(n) if n == COCO_LABELS.len() + 1 => true,
            _ => {
                return Err(ModelError::InferenceFailed(format!(
                    "YOLO head has {num_feats} features, expected {} or {}",
                    COCO_LABELS.len() + 4,
                    COCO_LABELS.len() + 5
                )))
            }
        };

        Ok(Self {
            num_dets,
            num_feats,
            transposed,
            objectness,
        })
    }

    fn value(&self, data: &[f32], det: usize, feat: usize) -> f32 {
        let idx = if self.transposed {
            feat * self.num_dets + det
        } else {
            det * self.num_feats + feat
        };
        data.get(idx).copied().unwrap_or(0.0)
    }
}

fn decode(
    data: &[f32],
    head: HeadLayout,
    letterbox: &Letterbox,
    min_score: f32,
    max_results: usize,
) -> Vec<ObjectDetection> {
    let class_offset = if head.objectness { 5 } else { 4 };
    let mut per_class: Vec<Vec<BoundingBox>> = vec![Vec::new(); COCO_LABELS.len()];

    for det in 0..head.num_dets {
        let (class, class_score) = (0..COCO_LABELS.len())
            .map(|c| (c, head.value(data, det, class_offset + c)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        let score = if head.objectness {
            class_score * head.value(data, det, 4)
        } else {
            class_score
        };
        if score < min_score {
            continue;
        }

        let cx = head.value(data, det, 0);
        let cy = head.value(data, det, 1);
        let w = head.value(data, det, 2);
        let h = head.value(data, det, 3);
        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

        per_class[class].push(BoundingBox::new(x1, y1, x2 - x1, y2 - y1, score));
    }

    let mut detections: Vec<ObjectDetection> = per_class
        .into_iter()
        .enumerate()
        .flat_map(|(class, boxes)| {
            nms(boxes, YOLO_NMS_THRESHOLD).into_iter().map(move |bbox| ObjectDetection {
                bbox,
                label: COCO_LABELS[class].to_string(),
            })
        })
        .collect();

    detections.sort_by(|a, b| {
        b.bbox
            .confidence
            .partial_cmp(&a.bbox.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    detections.truncate(max_results);
    detections
}
