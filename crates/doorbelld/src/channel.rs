//! Alert delivery to the notification front end.

use chrono::{DateTime, Utc};
use doorbell_core::{AlertCategory, AlertEvent};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("alert channel disconnected: {0}")]
    Disconnected(#[source] std::io::Error),
    #[error("failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sink for alert events. A failed publish is fatal to the run loop.
pub trait AlertChannel {
    fn publish(&mut self, event: &AlertEvent) -> impl Future<Output = Result<(), ChannelError>> + Send;
}

/// Wire form of one alert: a single JSON object per line.
#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    event: &'static str,
    category: AlertCategory,
    message: &'a str,
    cooldown_secs: u64,
    timestamp: DateTime<Utc>,
}

impl<'a> AlertPayload<'a> {
    fn new(alert: &'a AlertEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            event: "alert",
            category: alert.category,
            message: &alert.message,
            cooldown_secs: alert.cooldown.as_secs(),
            timestamp,
        }
    }

    fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Longest a single alert write may block before the peer counts as gone.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent TCP connection, opened once at startup. Fire-and-forget:
/// nothing is read back.
pub struct TcpAlertChannel {
    stream: TcpStream,
    addr: String,
    write_timeout: Duration,
}

impl TcpAlertChannel {
    pub async fn connect(addr: &str) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr).await.map_err(|source| ChannelError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        stream.set_nodelay(true).map_err(|source| ChannelError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        tracing::info!(addr, "alert channel connected");
        Ok(Self {
            stream,
            addr: addr.to_string(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

impl AlertChannel for TcpAlertChannel {
    async fn publish(&mut self, event: &AlertEvent) -> Result<(), ChannelError> {
        let line = AlertPayload::new(event, Utc::now()).to_line()?;
        let bytes = line.len();
        let timeout = self.write_timeout;
        let stream = &mut self.stream;

        // A peer that stops reading would otherwise block the loop forever.
        let sent = tokio::time::timeout(timeout, async move {
            stream.write_all(&line).await?;
            stream.flush().await
        })
        .await;
        match sent {
            Ok(result) => result.map_err(ChannelError::Disconnected)?,
            Err(_) => {
                return Err(ChannelError::Disconnected(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("alert write stalled for {timeout:?}"),
                )));
            }
        }
        tracing::debug!(addr = %self.addr, bytes, "alert sent");
        Ok(())
    }
}

/// Dry-run channel: alerts are only logged.
#[derive(Debug, Default)]
pub struct LogAlertChannel;

impl AlertChannel for LogAlertChannel {
    async fn publish(&mut self, event: &AlertEvent) -> Result<(), ChannelError> {
        tracing::info!(
            category = event.category.as_str(),
            cooldown_secs = event.cooldown.as_secs(),
            "[dry run] {}",
            event.message
        );
        Ok(())
    }
}

/// The channel selected by configuration.
pub enum Channel {
    Tcp(TcpAlertChannel),
    Log(LogAlertChannel),
}

impl AlertChannel for Channel {
    async fn publish(&mut self, event: &AlertEvent) -> Result<(), ChannelError> {
        match self {
            Channel::Tcp(c) => c.publish(event).await,
            Channel::Log(c) => c.publish(event).await,
        }
    }
}
