//! Fake collaborators shared by the unit tests.

use crate::alignment::AlignedFaceImage;
use crate::frame::{Frame, PixelLayout};
use crate::models::{FaceDetector, IdentityMatcher, LandmarkModel, ModelError, ObjectDetector, OccupationClassifier};
use crate::person::PersonImage;
use crate::types::{BoundingBox, Candidate, ClassScores, ObjectDetection, Point};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn blank_frame(width: u32, height: u32) -> Frame {
    Frame::new(vec![0u8; (width * height * 3) as usize], width, height, PixelLayout::Rgb).unwrap()
}

/// Returns the same boxes for every frame.
pub struct FixedFaces {
    boxes: Vec<BoundingBox>,
    calls: CallCounter,
}

impl FixedFaces {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes, calls: CallCounter::default() }
    }

    pub fn none() -> Self {
        Self::new(vec![])
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl FaceDetector for FixedFaces {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        self.calls.hit();
        Ok(self.boxes.clone())
    }
}

/// Finds a face only in the first frame it is shown.
pub struct FirstFrameOnly {
    face: BoundingBox,
    first_id: Option<u64>,
}

impl FirstFrameOnly {
    pub fn new(face: BoundingBox) -> Self {
        Self { face, first_id: None }
    }
}

impl FaceDetector for FirstFrameOnly {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        let first = *self.first_id.get_or_insert(frame.id());
        if first == frame.id() {
            Ok(vec![self.face.clone()])
        } else {
            Ok(vec![])
        }
    }
}

pub struct FailingFaceDetector;

impl FaceDetector for FailingFaceDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        Err(ModelError::InferenceFailed("detector offline".into()))
    }
}

/// Answers like a model whose worker thread has exited.
pub struct DeadFaceDetector;

impl FaceDetector for DeadFaceDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        Err(ModelError::WorkerGone("scrfd".into()))
    }
}

/// Boxes every pixel whose red channel is at least 128.
pub struct BrightBlobDetector;

impl BrightBlobDetector {
    pub fn bounds(frame: &Frame) -> Option<BoundingBox> {
        let mut min = (u32::MAX, u32::MAX);
        let mut max = (0u32, 0u32);
        let mut found = false;
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                if frame.rgb_at(x, y)[0] >= 128 {
                    found = true;
                    min = (min.0.min(x), min.1.min(y));
                    max = (max.0.max(x), max.1.max(y));
                }
            }
        }
        found.then(|| {
            BoundingBox::new(
                min.0 as f32,
                min.1 as f32,
                (max.0 - min.0 + 1) as f32,
                (max.1 - min.1 + 1) as f32,
                0.9,
            )
        })
    }
}

impl FaceDetector for BrightBlobDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        Ok(Self::bounds(frame).into_iter().collect())
    }
}

pub struct FixedLandmarks {
    points: Vec<Point>,
    calls: CallCounter,
}

impl FixedLandmarks {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points, calls: CallCounter::default() }
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl LandmarkModel for FixedLandmarks {
    fn landmarks(&mut self, _frame: &Frame) -> Result<Vec<Point>, ModelError> {
        self.calls.hit();
        Ok(self.points.clone())
    }

    fn eye_indices(&self) -> (usize, usize) {
        (0, 1)
    }
}

pub struct FixedObjects {
    detections: Vec<ObjectDetection>,
    calls: CallCounter,
}

impl FixedObjects {
    pub fn new(detections: Vec<(&str, BoundingBox)>) -> Self {
        Self {
            detections: detections
                .into_iter()
                .map(|(label, bbox)| ObjectDetection { bbox, label: label.to_string() })
                .collect(),
            calls: CallCounter::default(),
        }
    }

    pub fn none() -> Self {
        Self::new(vec![])
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl ObjectDetector for FixedObjects {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<ObjectDetection>, ModelError> {
        self.calls.hit();
        Ok(self.detections.clone())
    }
}

pub struct FixedMatcher {
    candidate: Result<Option<Candidate>, String>,
    calls: CallCounter,
}

impl FixedMatcher {
    pub fn new(candidate: Option<Candidate>) -> Self {
        Self { candidate: Ok(candidate), calls: CallCounter::default() }
    }

    pub fn named(name: &str, distance: f32) -> Self {
        Self::new(Some(Candidate { name: name.to_string(), distance }))
    }

    pub fn failing() -> Self {
        Self { candidate: Err("matcher offline".into()), calls: CallCounter::default() }
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl IdentityMatcher for FixedMatcher {
    fn match_face(&mut self, _face: &AlignedFaceImage) -> Result<Option<Candidate>, ModelError> {
        self.calls.hit();
        self.candidate.clone().map_err(ModelError::InferenceFailed)
    }
}

pub struct FixedClassifier {
    scores: Result<ClassScores, String>,
    calls: CallCounter,
}

impl FixedClassifier {
    pub fn new(labels: &[&str], probabilities: Vec<f32>) -> Self {
        Self {
            scores: Ok(ClassScores {
                labels: labels.iter().map(|s| s.to_string()).collect(),
                probabilities,
            }),
            calls: CallCounter::default(),
        }
    }

    pub fn failing() -> Self {
        Self { scores: Err("classifier offline".into()), calls: CallCounter::default() }
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl OccupationClassifier for FixedClassifier {
    fn classify(&mut self, _person: &PersonImage) -> Result<ClassScores, ModelError> {
        self.calls.hit();
        self.scores.clone().map_err(ModelError::InferenceFailed)
    }
}
