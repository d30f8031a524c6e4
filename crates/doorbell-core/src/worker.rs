//! Deadline-bounded model calls.
//!
//! A `ModelWorker` moves a model onto its own OS thread and forwards calls
//! over a rendezvous channel, so at most one call is in flight per model.
//! A call that misses its deadline is reported as [`ModelError::Timeout`];
//! the model finishes the stale call in the background and the next call
//! times out too until it does.

use crate::alignment::AlignedFaceImage;
use crate::frame::Frame;
use crate::models::{FaceDetector, IdentityMatcher, LandmarkModel, ModelError, ObjectDetector, OccupationClassifier};
use crate::person::PersonImage;
use crate::types::{BoundingBox, Candidate, ClassScores, ObjectDetection, Point};
use crossbeam_channel::{RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Job<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Default deadline for a single model call.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_millis(2000);

/// Clone-safe handle to a model running on a dedicated thread.
pub struct ModelWorker<T> {
    tx: Sender<Job<T>>,
    name: Arc<str>,
    timeout: Duration,
}

impl<T> Clone for ModelWorker<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: Arc::clone(&self.name),
            timeout: self.timeout,
        }
    }
}

impl<T: Send + 'static> ModelWorker<T> {
    /// Spawn the worker thread. The thread exits once every handle is dropped.
    pub fn spawn(name: &str, mut model: T, timeout: Duration) -> Result<Self, ModelError> {
        let (tx, rx) = crossbeam_channel::bounded::<Job<T>>(0);
        let thread_name = format!("model-{name}");

        std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                tracing::debug!(thread = %thread_name, "model worker started");
                for job in rx.iter() {
                    job(&mut model);
                }
                tracing::debug!(thread = %thread_name, "model worker exiting");
            })
            .map_err(|e| ModelError::InferenceFailed(format!("failed to spawn {name} worker: {e}")))?;

        Ok(Self {
            tx,
            name: name.into(),
            timeout,
        })
    }

    /// Run `f` on the worker thread, waiting at most the configured timeout
    /// for both hand-off and completion.
    pub fn call<R, F>(&self, f: F) -> Result<R, ModelError>
    where
        R: Send + 'static,
        F: FnOnce(&mut T) -> R + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let job: Job<T> = Box::new(move |model| {
            let _ = reply_tx.send(f(model));
        });

        self.tx.send_deadline(job, deadline).map_err(|e| match e {
            SendTimeoutError::Timeout(_) => self.timed_out(),
            SendTimeoutError::Disconnected(_) => ModelError::WorkerGone(self.name.to_string()),
        })?;

        reply_rx.recv_deadline(deadline).map_err(|e| match e {
            RecvTimeoutError::Timeout => self.timed_out(),
            RecvTimeoutError::Disconnected => ModelError::WorkerGone(self.name.to_string()),
        })
    }

    fn timed_out(&self) -> ModelError {
        tracing::warn!(model = %self.name, timeout = ?self.timeout, "model call timed out");
        ModelError::Timeout {
            model: self.name.to_string(),
            timeout: self.timeout,
        }
    }
}

/// A [`ModelWorker`] for a landmark model.
///
/// The eye indices are read once at spawn, so asking for them needs no
/// round trip to the worker thread.
pub struct LandmarkWorker<T> {
    worker: ModelWorker<T>,
    eye_indices: (usize, usize),
}

impl<T> Clone for LandmarkWorker<T> {
    fn clone(&self) -> Self {
        Self {
            worker: self.worker.clone(),
            eye_indices: self.eye_indices,
        }
    }
}

impl<T: LandmarkModel + 'static> LandmarkWorker<T> {
    pub fn spawn(name: &str, model: T, timeout: Duration) -> Result<Self, ModelError> {
        let eye_indices = model.eye_indices();
        Ok(Self {
            worker: ModelWorker::spawn(name, model, timeout)?,
            eye_indices,
        })
    }
}

impl<T: FaceDetector + 'static> FaceDetector for ModelWorker<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        let frame = frame.clone();
        self.call(move |model| model.detect(&frame))?
    }
}

impl<T: LandmarkModel + 'static> LandmarkModel for LandmarkWorker<T> {
    fn landmarks(&mut self, frame: &Frame) -> Result<Vec<Point>, ModelError> {
        let frame = frame.clone();
        self.worker.call(move |model| model.landmarks(&frame))?
    }

    fn eye_indices(&self) -> (usize, usize) {
        self.eye_indices
    }
}

/// Landmark models that also detect faces (SCRFD) share one thread for both.
impl<T: LandmarkModel + FaceDetector + 'static> FaceDetector for LandmarkWorker<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ModelError> {
        FaceDetector::detect(&mut self.worker, frame)
    }
}

impl<T: ObjectDetector + 'static> ObjectDetector for ModelWorker<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<ObjectDetection>, ModelError> {
        let frame = frame.clone();
        self.call(move |model| model.detect(&frame))?
    }
}

impl<T: IdentityMatcher + 'static> IdentityMatcher for ModelWorker<T> {
    fn match_face(&mut self, face: &AlignedFaceImage) -> Result<Option<Candidate>, ModelError> {
        let face = face.clone();
        self.call(move |model| model.match_face(&face))?
    }
}

impl<T: OccupationClassifier + 'static> OccupationClassifier for ModelWorker<T> {
    fn classify(&mut self, person: &PersonImage) -> Result<ClassScores, ModelError> {
        let person = person.clone();
        self.call(move |model| model.classify(&person))?
    }
}
