//! Person localization: first "person" among the object detector's results.

use crate::alignment::LocalizeError;
use crate::frame::Frame;
use crate::geometry::clamp_box;
use crate::models::ObjectDetector;
use crate::types::Detection;

/// Category label that marks a person.
pub const PERSON_LABEL: &str = "person";
pub const DEFAULT_PERSON_SCORE: f32 = 0.25;
pub const DEFAULT_PERSON_MAX_RESULTS: usize = 5;

/// A person crop taken from the captured frame.
#[derive(Debug, Clone)]
pub struct PersonImage {
    pub image: Frame,
    pub detection: Detection,
}

pub struct PersonLocator {
    detector: Box<dyn ObjectDetector>,
    min_score: f32,
    max_results: usize,
}

impl PersonLocator {
    pub fn new(detector: Box<dyn ObjectDetector>) -> Self {
        Self {
            detector,
            min_score: DEFAULT_PERSON_SCORE,
            max_results: DEFAULT_PERSON_MAX_RESULTS,
        }
    }

    pub fn with_limits(mut self, min_score: f32, max_results: usize) -> Self {
        self.min_score = min_score;
        self.max_results = max_results;
        self
    }

    /// Crop the first person in detector order.
    ///
    /// Scan order is the detector's, not confidence order: a later person
    /// with a higher score never displaces an earlier one.
    pub fn locate(&mut self, frame: &Frame) -> Result<PersonImage, LocalizeError> {
        let detections = self.detector.detect(frame)?;

        let person = detections
            .into_iter()
            .filter(|d| d.bbox.confidence >= self.min_score)
            .take(self.max_results)
            .find(|d| d.label == PERSON_LABEL)
            .ok_or(LocalizeError::NoPerson)?;

        let rect = clamp_box(&person.bbox, frame.width(), frame.height());
        let detection = Detection::person(rect, person.bbox.confidence);
        let image = detection
            .rect()
            .and_then(|r| frame.crop(&r))
            .ok_or(LocalizeError::EmptyCrop)?;

        tracing::debug!(
            confidence = person.bbox.confidence,
            width = image.width(),
            height = image.height(),
            "person located"
        );

        Ok(PersonImage { image, detection })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blank_frame, FixedObjects};
    use crate::types::{BoundingBox, Rect};

    fn locate(objects: FixedObjects) -> Result<PersonImage, LocalizeError> {
        PersonLocator::new(Box::new(objects)).locate(&blank_frame(100, 80))
    }

    #[test]
    fn test_first_person_in_detector_order_wins() {
        let objects = FixedObjects::new(vec![
            ("dog", BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0.95)),
            ("person", BoundingBox::new(10.0, 10.0, 20.0, 30.0, 0.40)),
            ("person", BoundingBox::new(50.0, 10.0, 20.0, 30.0, 0.90)),
        ]);
        let person = locate(objects).unwrap();
        assert_eq!(person.detection.rect(), Some(Rect { x: 10, y: 10, width: 20, height: 30 }));
        assert_eq!(person.image.width(), 20);
        assert_eq!(person.image.height(), 30);
    }

    #[test]
    fn test_no_person_label() {
        let objects = FixedObjects::new(vec![("car", BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0.9))]);
        assert!(matches!(locate(objects), Err(LocalizeError::NoPerson)));
    }

    #[test]
    fn test_person_below_score_floor_is_ignored() {
        let objects = FixedObjects::new(vec![("person", BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0.2))]);
        assert!(matches!(locate(objects), Err(LocalizeError::NoPerson)));
    }

    #[test]
    fn test_person_beyond_result_cap_is_ignored() {
        let mut objects: Vec<(&str, BoundingBox)> = (0..5)
            .map(|i| ("chair", BoundingBox::new(i as f32, 0.0, 5.0, 5.0, 0.9)))
            .collect();
        objects.push(("person", BoundingBox::new(10.0, 10.0, 20.0, 20.0, 0.9)));
        assert!(matches!(locate(FixedObjects::new(objects)), Err(LocalizeError::NoPerson)));
    }

    #[test]
    fn test_person_box_is_clamped() {
        let objects = FixedObjects::new(vec![("person", BoundingBox::new(-20.0, 50.0, 40.0, 60.0, 0.8))]);
        let person = locate(objects).unwrap();
        assert_eq!(person.detection.rect(), Some(Rect { x: 0, y: 50, width: 20, height: 30 }));
    }

    #[test]
    fn test_person_outside_frame_is_empty_crop() {
        let objects = FixedObjects::new(vec![("person", BoundingBox::new(200.0, 200.0, 40.0, 60.0, 0.8))]);
        assert!(matches!(locate(objects), Err(LocalizeError::EmptyCrop)));
    }
}
