//! Face localization with roll correction.
//!
//! Detects a face, levels the eyes by rotating the whole frame about its
//! center, then detects again on the rotated frame and crops. The second
//! detection is required: boxes from the first pass are expressed in the
//! un-rotated frame and do not describe the rotated face.

use crate::frame::Frame;
use crate::geometry::{clamp_box, roll_angle, rotate_about_center};
use crate::models::{FaceDetector, LandmarkModel, ModelError};
use crate::types::{BoundingBox, Detection};
use thiserror::Error;

/// Minimum detector confidence for a face to be considered.
pub const DEFAULT_FACE_CONFIDENCE: f32 = 0.5;

/// Why a localization step produced nothing. Never fatal to the cascade.
#[derive(Error, Debug)]
pub enum LocalizeError {
    #[error("no face above the confidence floor")]
    NoFace,
    #[error("no person detected")]
    NoPerson,
    #[error("eye landmarks unavailable")]
    NoLandmarks,
    #[error("eye landmarks coincide, roll is undefined")]
    DegenerateEyes,
    #[error("face not found again after rotation")]
    LostAfterRotation,
    #[error("bounding box is empty after clamping to the frame")]
    EmptyCrop,
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl LocalizeError {
    /// True for failures of the alignment stage itself, as opposed to
    /// nothing being there to align.
    pub fn is_alignment_failure(&self) -> bool {
        matches!(
            self,
            LocalizeError::NoLandmarks | LocalizeError::DegenerateEyes | LocalizeError::LostAfterRotation
        )
    }
}

/// A face crop taken from the roll-corrected frame.
#[derive(Debug, Clone)]
pub struct AlignedFaceImage {
    pub image: Frame,
    /// Post-rotation detection, in rotated-frame coordinates.
    pub detection: Detection,
    /// Rotation applied to the source frame, in degrees.
    pub correction_degrees: f32,
}

pub struct FaceAligner {
    detector: Box<dyn FaceDetector>,
    landmarks: Box<dyn LandmarkModel>,
    min_confidence: f32,
}

impl FaceAligner {
    pub fn new(detector: Box<dyn FaceDetector>, landmarks: Box<dyn LandmarkModel>) -> Self {
        Self {
            detector,
            landmarks,
            min_confidence: DEFAULT_FACE_CONFIDENCE,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Localize, level and crop the first accepted face in `frame`.
    pub fn align(&mut self, frame: &Frame) -> Result<AlignedFaceImage, LocalizeError> {
        let first = self.first_face(frame)?.ok_or(LocalizeError::NoFace)?;

        let points = self.landmarks.landmarks(frame)?;
        let (left_idx, right_idx) = self.landmarks.eye_indices();
        let (left_eye, right_eye) = match (points.get(left_idx), points.get(right_idx)) {
            (Some(l), Some(r)) => (*l, *r),
            _ => return Err(LocalizeError::NoLandmarks),
        };

        let roll = roll_angle(left_eye, right_eye).ok_or(LocalizeError::DegenerateEyes)?;
        let correction = -roll;
        let rotated = rotate_about_center(frame, correction);

        let face = self
            .first_face(&rotated)?
            .ok_or(LocalizeError::LostAfterRotation)?;

        let rect = clamp_box(&face, rotated.width(), rotated.height());
        let detection = Detection::face(rect, face.confidence);
        let image = detection
            .rect()
            .and_then(|r| rotated.crop(&r))
            .ok_or(LocalizeError::EmptyCrop)?;

        tracing::debug!(
            first_confidence = first.confidence,
            confidence = face.confidence,
            roll,
            width = image.width(),
            height = image.height(),
            "face aligned"
        );

        Ok(AlignedFaceImage {
            image,
            detection,
            correction_degrees: correction,
        })
    }

    fn first_face(&mut self, frame: &Frame) -> Result<Option<BoundingBox>, ModelError> {
        let faces = self.detector.detect(frame)?;
        Ok(faces.into_iter().find(|f| f.confidence >= self.min_confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        blank_frame, BrightBlobDetector, FailingFaceDetector, FirstFrameOnly, FixedFaces, FixedLandmarks,
    };
    use crate::types::{Point, Rect};
    use crate::frame::PixelLayout;

    /// Gray frame with 3x3 bright dots at each point.
    fn frame_with_dots(width: u32, height: u32, dots: &[(u32, u32)]) -> Frame {
        let mut data = vec![0u8; (width * height) as usize];
        for &(cx, cy) in dots {
            for y in cy - 1..=cy + 1 {
                for x in cx - 1..=cx + 1 {
                    data[(y * width + x) as usize] = 255;
                }
            }
        }
        Frame::new(data, width, height, PixelLayout::Gray).unwrap()
    }

    fn eyes(left: (f32, f32), right: (f32, f32)) -> FixedLandmarks {
        FixedLandmarks::new(vec![Point::new(left.0, left.1), Point::new(right.0, right.1)])
    }

    #[test]
    fn test_no_face_skips_landmarks() {
        let landmarks = eyes((10.0, 10.0), (20.0, 10.0));
        let landmark_calls = landmarks.calls();
        let mut aligner = FaceAligner::new(Box::new(FixedFaces::none()), Box::new(landmarks));

        let err = aligner.align(&blank_frame(64, 64)).unwrap_err();
        assert!(matches!(err, LocalizeError::NoFace));
        assert_eq!(landmark_calls.get(), 0);
    }

    #[test]
    fn test_low_confidence_face_is_ignored() {
        let faces = FixedFaces::new(vec![BoundingBox::new(10.0, 10.0, 20.0, 20.0, 0.49)]);
        let mut aligner = FaceAligner::new(Box::new(faces), Box::new(eyes((12.0, 15.0), (25.0, 15.0))));
        assert!(matches!(aligner.align(&blank_frame(64, 64)), Err(LocalizeError::NoFace)));
    }

    #[test]
    fn test_first_accepted_face_wins() {
        let faces = FixedFaces::new(vec![
            BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0.2),
            BoundingBox::new(10.0, 10.0, 20.0, 20.0, 0.6),
            BoundingBox::new(30.0, 30.0, 20.0, 20.0, 0.9),
        ]);
        let mut aligner = FaceAligner::new(Box::new(faces), Box::new(eyes((12.0, 15.0), (25.0, 15.0))));
        let aligned = aligner.align(&blank_frame(64, 64)).unwrap();
        assert_eq!(aligned.detection.rect(), Some(Rect { x: 10, y: 10, width: 20, height: 20 }));
    }

    #[test]
    fn test_missing_landmarks() {
        let faces = FixedFaces::new(vec![BoundingBox::new(10.0, 10.0, 20.0, 20.0, 0.9)]);
        let mut aligner = FaceAligner::new(Box::new(faces), Box::new(FixedLandmarks::new(vec![])));
        let err = aligner.align(&blank_frame(64, 64)).unwrap_err();
        assert!(matches!(err, LocalizeError::NoLandmarks));
        assert!(err.is_alignment_failure());
    }

    #[test]
    fn test_coincident_eyes() {
        let faces = FixedFaces::new(vec![BoundingBox::new(10.0, 10.0, 20.0, 20.0, 0.9)]);
        let mut aligner = FaceAligner::new(Box::new(faces), Box::new(eyes((15.0, 15.0), (15.0, 15.0))));
        assert!(matches!(aligner.align(&blank_frame(64, 64)), Err(LocalizeError::DegenerateEyes)));
    }

    #[test]
    fn test_lost_after_rotation() {
        let faces = FirstFrameOnly::new(BoundingBox::new(10.0, 10.0, 20.0, 20.0, 0.9));
        let mut aligner = FaceAligner::new(Box::new(faces), Box::new(eyes((12.0, 12.0), (25.0, 20.0))));
        let err = aligner.align(&blank_frame(64, 64)).unwrap_err();
        assert!(matches!(err, LocalizeError::LostAfterRotation));
    }

    #[test]
    fn test_box_outside_frame_is_empty_crop() {
        let faces = FixedFaces::new(vec![BoundingBox::new(100.0, 100.0, 20.0, 20.0, 0.9)]);
        let mut aligner = FaceAligner::new(Box::new(faces), Box::new(eyes((12.0, 15.0), (25.0, 15.0))));
        assert!(matches!(aligner.align(&blank_frame(64, 64)), Err(LocalizeError::EmptyCrop)));
    }

    #[test]
    fn test_detector_error_is_model_failure() {
        let mut aligner = FaceAligner::new(
            Box::new(FailingFaceDetector),
            Box::new(eyes((12.0, 15.0), (25.0, 15.0))),
        );
        let err = aligner.align(&blank_frame(64, 64)).unwrap_err();
        assert!(matches!(err, LocalizeError::Model(ModelError::InferenceFailed(_))));
        assert!(!err.is_alignment_failure());
    }

    #[test]
    fn test_crop_is_taken_from_rotated_frame() {
        // Two "eyes" on a 45° diagonal. The blob detector boxes whatever is
        // bright, so after leveling the box must be wide and short.
        let frame = frame_with_dots(101, 101, &[(40, 40), (60, 60)]);
        let mut aligner = FaceAligner::new(
            Box::new(BrightBlobDetector),
            Box::new(eyes((40.0, 40.0), (60.0, 60.0))),
        );

        let aligned = aligner.align(&frame).unwrap();
        assert!((aligned.correction_degrees + 45.0).abs() < 1e-3);
        assert!(
            aligned.image.width() > 3 * aligned.image.height(),
            "expected a level crop, got {}x{}",
            aligned.image.width(),
            aligned.image.height()
        );
    }

    #[test]
    fn test_level_face_matches_unrotated_crop() {
        let frame = frame_with_dots(101, 101, &[(40, 50), (60, 50)]);
        let mut aligner = FaceAligner::new(
            Box::new(BrightBlobDetector),
            Box::new(eyes((40.0, 50.0), (60.0, 50.0))),
        );
        let aligned = aligner.align(&frame).unwrap();

        let direct = BrightBlobDetector::bounds(&frame).unwrap();
        let direct = clamp_box(&direct, frame.width(), frame.height());
        let rect = aligned.detection.rect().unwrap();

        let tolerance = 1i64;
        assert!((rect.x as i64 - direct.x as i64).abs() <= tolerance);
        assert!((rect.y as i64 - direct.y as i64).abs() <= tolerance);
        assert!((rect.width as i64 - direct.width as i64).abs() <= tolerance);
        assert!((rect.height as i64 - direct.height as i64).abs() <= tolerance);
    }
}
