use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// A gallery identity matched.
    Known,
    /// An unrecognized visitor with a recognized occupation.
    Occupation,
    /// A face or person was seen but nothing more is known.
    Unidentified,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Known => "known",
            AlertCategory::Occupation => "occupation",
            AlertCategory::Unidentified => "unidentified",
        }
    }
}

/// The single externally observable output of a cascade cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub category: AlertCategory,
    pub message: String,
    /// Minimum wait before the next cycle starts.
    pub cooldown: Duration,
}

impl AlertEvent {
    pub fn known(name: &str, cooldown: Duration) -> Self {
        Self {
            category: AlertCategory::Known,
            message: format!("{name} is at the door!"),
            cooldown,
        }
    }

    pub fn occupation(label: &str, cooldown: Duration) -> Self {
        Self {
            category: AlertCategory::Occupation,
            message: format!("Unknown visitor! Identified as a {label}."),
            cooldown,
        }
    }

    pub fn unidentified(cooldown: Duration) -> Self {
        Self {
            category: AlertCategory::Unidentified,
            message: "Unknown visitor!".to_string(),
            cooldown,
        }
    }
}

/// What one cycle produced and how long to wait before the next.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub alert: Option<AlertEvent>,
    pub delay: Duration,
}

impl CycleOutcome {
    pub fn alert(event: AlertEvent) -> Self {
        Self {
            delay: event.cooldown,
            alert: Some(event),
        }
    }

    /// Nothing localized: no alert, just the retry delay.
    pub fn idle(delay: Duration) -> Self {
        Self { alert: None, delay }
    }
}
