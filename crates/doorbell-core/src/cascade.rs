//! The per-frame decision cascade.
//!
//! Resolves at most one alert per frame, in strict priority order:
//! known face, then occupation, then an unidentified visitor. Collaborator
//! failures turn into the next fallback, except a model worker that has
//! exited, which is returned to the caller.

use crate::alert::{AlertEvent, CycleOutcome};
use crate::alignment::{AlignedFaceImage, FaceAligner, LocalizeError};
use crate::frame::Frame;
use crate::models::{IdentityMatcher, ModelError, OccupationClassifier};
use crate::person::{PersonImage, PersonLocator};
use crate::types::{IdentificationResult, OccupationResult};
use std::time::Duration;

/// Thresholds and delays for one cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadePolicy {
    /// A gallery match is accepted only below this distance.
    pub match_distance: f32,
    /// An occupation is accepted only above this probability.
    pub occupation_confidence: f32,
    pub known_cooldown: Duration,
    pub visitor_cooldown: Duration,
    /// Wait after a cycle that localized nothing.
    pub idle_delay: Duration,
}

impl Default for CascadePolicy {
    fn default() -> Self {
        Self {
            match_distance: 0.4,
            occupation_confidence: 0.7,
            known_cooldown: Duration::from_secs(10),
            visitor_cooldown: Duration::from_secs(5),
            idle_delay: Duration::from_secs(5),
        }
    }
}

pub struct Cascade {
    aligner: FaceAligner,
    locator: PersonLocator,
    matcher: Box<dyn IdentityMatcher>,
    classifier: Box<dyn OccupationClassifier>,
    policy: CascadePolicy,
}

impl Cascade {
    pub fn new(
        aligner: FaceAligner,
        locator: PersonLocator,
        matcher: Box<dyn IdentityMatcher>,
        classifier: Box<dyn OccupationClassifier>,
        policy: CascadePolicy,
    ) -> Self {
        Self {
            aligner,
            locator,
            matcher,
            classifier,
            policy,
        }
    }

    /// Run one pass over `frame`.
    ///
    /// Collaborator failures fall through to the next fallback; only a model
    /// that can never answer again is returned as an error.
    pub fn evaluate(&mut self, frame: &Frame) -> Result<CycleOutcome, ModelError> {
        let face = settle(frame, "face", self.aligner.align(frame))?;

        if let Some(face) = &face {
            if let IdentificationResult::Known { name } = self.identify(face)? {
                return Ok(CycleOutcome::alert(AlertEvent::known(&name, self.policy.known_cooldown)));
            }
        }

        let person = settle(frame, "person", self.locator.locate(frame))?;

        if let Some(person) = &person {
            if let OccupationResult::Role { label, .. } = self.classify(person)? {
                return Ok(CycleOutcome::alert(AlertEvent::occupation(&label, self.policy.visitor_cooldown)));
            }
        }

        if face.is_some() || person.is_some() {
            return Ok(CycleOutcome::alert(AlertEvent::unidentified(self.policy.visitor_cooldown)));
        }

        Ok(CycleOutcome::idle(self.policy.idle_delay))
    }

    fn identify(&mut self, face: &AlignedFaceImage) -> Result<IdentificationResult, ModelError> {
        match self.matcher.match_face(face) {
            Ok(candidate) => {
                if let Some(c) = &candidate {
                    tracing::debug!(name = %c.name, distance = c.distance, "nearest gallery entry");
                }
                Ok(IdentificationResult::from_candidate(candidate, self.policy.match_distance))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "identity matcher unavailable; treating face as unknown");
                Ok(IdentificationResult::Unknown)
            }
        }
    }

    fn classify(&mut self, person: &PersonImage) -> Result<OccupationResult, ModelError> {
        match self.classifier.classify(person) {
            Ok(scores) => Ok(scores.resolve(self.policy.occupation_confidence)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "occupation classifier unavailable; treating person as unknown");
                Ok(OccupationResult::Unknown)
            }
        }
    }
}

/// Reduce a localization result to an optional crop.
fn settle<T>(frame: &Frame, stage: &'static str, result: Result<T, LocalizeError>) -> Result<Option<T>, ModelError> {
    match result {
        Ok(found) => Ok(Some(found)),
        Err(LocalizeError::Model(e)) if e.is_fatal() => Err(e),
        Err(LocalizeError::Model(e)) => {
            tracing::warn!(frame = frame.id(), stage, error = %e, "localization model failed; continuing without it");
            Ok(None)
        }
        Err(e) => {
            tracing::debug!(
                frame = frame.id(),
                stage,
                reason = %e,
                alignment_failure = e.is_alignment_failure(),
                "nothing localized"
            );
            Ok(None)
        }
    }
}
