//! Fake collaborators for the daemon's unit tests.

use crate::channel::{AlertChannel, ChannelError};
use doorbell_core::models::{FaceDetector, IdentityMatcher, LandmarkModel, ModelError, ObjectDetector, OccupationClassifier};
use doorbell_core::types::{ObjectDetection, Point};
use doorbell_core::{
    AlertEvent, AlignedFaceImage, BoundingBox, CaptureError, Candidate, Cascade, CascadePolicy, ClassScores,
    FaceAligner, Frame, FrameSource, PersonImage, PersonLocator, PixelLayout,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bounding box of every pixel whose red channel is at least 128.
fn bright_bounds(frame: &Frame) -> Option<BoundingBox> {
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

/// Finds a face wherever the frame is bright.
pub struct BrightFace;

impl FaceDetector for BrightFace {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        Ok(bright_bounds(frame).into_iter().collect())
    }
}

/// Answers like a face model whose worker thread has exited.
pub struct DeadFace;

impl FaceDetector for DeadFace {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        Err(ModelError::WorkerGone("scrfd".into()))
    }
}

/// Always reports level eyes, so alignment never rotates.
pub struct LevelEyes;

impl LandmarkModel for LevelEyes {
    fn landmarks(&mut self, _frame: &Frame) -> Result<Vec<Point>, ModelError> {
        Ok(vec![Point::new(10.0, 20.0), Point::new(30.0, 20.0)])
    }

    fn eye_indices(&self) -> (usize, usize) {
        (0, 1)
    }
}

/// Finds a person wherever the frame is bright.
pub struct BrightPerson;

impl ObjectDetector for BrightPerson {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<ObjectDetection>, ModelError> {
        Ok(bright_bounds(frame)
            .map(|bbox| ObjectDetection {
                bbox,
                label: "person".to_string(),
            })
            .into_iter()
            .collect())
    }
}

pub struct FixedMatch(Option<Candidate>);

impl IdentityMatcher for FixedMatch {
    fn match_face(&mut self, _face: &AlignedFaceImage) -> Result<Option<Candidate>, ModelError> {
        Ok(self.0.clone())
    }
}

/// Scores "courier" with a fixed probability.
pub struct Courier(f32);

impl OccupationClassifier for Courier {
    fn classify(&mut self, _person: &PersonImage) -> Result<ClassScores, ModelError> {
        Ok(ClassScores {
            labels: vec!["Fireman".to_string(), "courier".to_string()].into(),
            probabilities: vec![1.0 - self.0, self.0],
        })
    }
}

pub fn policy() -> CascadePolicy {
    CascadePolicy {
        match_distance: 0.4,
        occupation_confidence: 0.7,
        known_cooldown: Duration::from_millis(100),
        visitor_cooldown: Duration::from_millis(50),
        idle_delay: Duration::from_millis(10),
    }
}

pub fn aligner() -> FaceAligner {
    FaceAligner::new(Box::new(BrightFace), Box::new(LevelEyes))
}

pub fn cascade(known: Option<(&str, f32)>, courier: f32) -> Cascade {
    let candidate = known.map(|(name, distance)| Candidate {
        name: name.to_string(),
        distance,
    });
    Cascade::new(
        aligner(),
        PersonLocator::new(Box::new(BrightPerson)),
        Box::new(FixedMatch(candidate)),
        Box::new(Courier(courier)),
        policy(),
    )
}

pub fn dead_face_cascade() -> Cascade {
    Cascade::new(
        FaceAligner::new(Box::new(DeadFace), Box::new(LevelEyes)),
        PersonLocator::new(Box::new(BrightPerson)),
        Box::new(FixedMatch(None)),
        Box::new(Courier(0.95)),
        policy(),
    )
}

/// 64×64 frame with a bright 24×32 block: one face, one person.
pub fn person_frame() -> Frame {
    let mut data = vec![0u8; 64 * 64 * 3];
    for y in 16..48 {
        for x in 20..44 {
            let i = (y * 64 + x) * 3;
            data[i..i + 3].copy_from_slice(&[200, 180, 160]);
        }
    }
    Frame::new(data, 64, 64, PixelLayout::Rgb).unwrap()
}

/// Yields queued results, then reports itself unavailable.
pub struct FrameQueue(VecDeque<Result<Frame, CaptureError>>);

impl FrameQueue {
    pub fn new(items: Vec<Result<Frame, CaptureError>>) -> Self {
        Self(items.into())
    }
}

impl FrameSource for FrameQueue {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.0
            .pop_front()
            .unwrap_or_else(|| Err(CaptureError::Unavailable("queue drained".into())))
    }
}

/// Produces a fresh black frame on every call.
pub struct Looping {
    width: u32,
    height: u32,
}

impl Looping {
    pub fn blank() -> Self {
        Self { width: 32, height: 32 }
    }
}

impl FrameSource for Looping {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let data = vec![0u8; (self.width * self.height * 3) as usize];
        Ok(Frame::new(data, self.width, self.height, PixelLayout::Rgb)?)
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<AlertEvent>>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Arc<Mutex<Vec<AlertEvent>>> {
        Arc::clone(&self.sent)
    }
}

impl AlertChannel for RecordingChannel {
    async fn publish(&mut self, event: &AlertEvent) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(event.clone());
        Ok(())
    }
}
