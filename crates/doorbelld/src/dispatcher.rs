//! The alert run loop: capture, evaluate, publish, cool down.

use crate::channel::{AlertChannel, ChannelError};
use crate::engine::{EngineError, EngineHandle};
use doorbell_core::{AlertCategory, AlertEvent};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Engine(EngineError),
}

/// Running totals, logged when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub cycles: u64,
    pub known: u64,
    pub occupation: u64,
    pub unidentified: u64,
    pub idle: u64,
    pub capture_failures: u64,
}

impl DispatchStats {
    fn record(&mut self, alert: &AlertEvent) {
        match alert.category {
            AlertCategory::Known => self.known += 1,
            AlertCategory::Occupation => self.occupation += 1,
            AlertCategory::Unidentified => self.unidentified += 1,
        }
    }

    pub fn alerts(&self) -> u64 {
        self.known + self.occupation + self.unidentified
    }
}

pub struct Dispatcher<C> {
    engine: EngineHandle,
    channel: C,
    capture_retry: Duration,
    stats: DispatchStats,
}

impl<C: AlertChannel> Dispatcher<C> {
    pub fn new(engine: EngineHandle, channel: C, capture_retry: Duration) -> Self {
        Self {
            engine,
            channel,
            capture_retry,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Run one cycle and return how long to wait before the next.
    ///
    /// Capture failures only delay the next cycle; a channel failure or a
    /// lost model worker ends the loop.
    pub async fn step(&mut self) -> Result<Duration, DispatchError> {
        let outcome = match self.engine.cycle().await {
            Ok(outcome) => outcome,
            Err(EngineError::Capture(e)) => {
                self.stats.capture_failures += 1;
                tracing::warn!(error = %e, retry = ?self.capture_retry, "capture failed; retrying");
                return Ok(self.capture_retry);
            }
            Err(e) => return Err(DispatchError::Engine(e)),
        };

        self.stats.cycles += 1;
        match &outcome.alert {
            Some(alert) => {
                tracing::info!(
                    category = alert.category.as_str(),
                    cooldown = ?alert.cooldown,
                    "{}",
                    alert.message
                );
                self.channel.publish(alert).await?;
                self.stats.record(alert);
            }
            None => self.stats.idle += 1,
        }
        Ok(outcome.delay)
    }

    /// Loop until `shutdown` flips to true (or its sender goes away).
    ///
    /// Shutdown is observed between cycles and during the wait after one;
    /// a cycle in progress always completes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>, once: bool) -> Result<DispatchStats, DispatchError> {
        tracing::info!(once, "dispatcher started");
        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            let delay = match self.step().await {
                Ok(delay) => delay,
                Err(e) => break Err(e),
            };
            if once {
                break Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
            }
        };

        let s = &self.stats;
        tracing::info!(
            cycles = s.cycles,
            known = s.known,
            occupation = s.occupation,
            unidentified = s.unidentified,
            idle = s.idle,
            capture_failures = s.capture_failures,
            "dispatcher stopped"
        );
        result.map(|()| self.stats)
    }
}
