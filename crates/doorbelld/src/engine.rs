use doorbell_core::{CaptureError, Cascade, CycleOutcome, FrameSource, ModelError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("model unavailable: {0}")]
    Model(#[source] ModelError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from the run loop to the engine thread.
enum EngineRequest {
    Cycle {
        reply: oneshot::Sender<Result<CycleOutcome, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Capture one frame and run it through the cascade.
    pub async fn cycle(&self) -> Result<CycleOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Cycle { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the frame source and the cascade, so blocking capture
/// and inference never run on the async runtime.
pub fn spawn_engine(mut source: Box<dyn FrameSource>, mut cascade: Cascade) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(1);

    std::thread::Builder::new()
        .name("doorbell-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Cycle { reply } => {
                        let result = run_cycle(source.as_mut(), &mut cascade);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn run_cycle(source: &mut dyn FrameSource, cascade: &mut Cascade) -> Result<CycleOutcome, EngineError> {
    let frame = source.next_frame()?;
    let outcome = cascade.evaluate(&frame).map_err(|e| {
        tracing::error!(frame = frame.id(), error = %e, "model worker lost");
        EngineError::Model(e)
    })?;
    tracing::debug!(
        frame = frame.id(),
        alert = outcome.alert.as_ref().map(|a| a.category.as_str()),
        delay = ?outcome.delay,
        latency = ?frame.timestamp().elapsed(),
        "cycle evaluated"
    );
    Ok(outcome)
}
