//! Input event types accepted at the capture boundary.
//!
//! The engine does not capture anything itself. Key events come from an
//! external input hook and activity metrics from an external sampler; both
//! arrive here as plain timestamped values.

use crate::core::windowing::Timestamped;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Whether a key went down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventKind {
    Press,
    Release,
}

/// Modifier keys tracked while other keys are held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Meta,
}

impl Modifier {
    /// Map a key id onto a modifier, if it is one.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "shift" => Some(Modifier::Shift),
            "alt" | "option" => Some(Modifier::Alt),
            "meta" | "cmd" | "command" | "super" => Some(Modifier::Meta),
            _ => None,
        }
    }
}

/// One press or release of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Key identifier as reported by the capture source
    pub key: String,
    pub kind: KeyEventKind,
    pub timestamp: DateTime<Utc>,
    /// Modifiers held when the event occurred
    #[serde(default)]
    pub modifiers: BTreeSet<Modifier>,
}

impl KeyEvent {
    pub fn press(key: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            kind: KeyEventKind::Press,
            timestamp,
            modifiers: BTreeSet::new(),
        }
    }

    pub fn release(key: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            kind: KeyEventKind::Release,
            timestamp,
            modifiers: BTreeSet::new(),
        }
    }
}

/// One periodic sample of overall activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetric {
    /// Characters per minute
    pub typing_speed: f64,
    /// Seconds spent in the current context
    pub focus_duration: f64,
    /// Tool switches in the trailing minute
    pub tool_switches: u32,
    pub timestamp: DateTime<Utc>,
}

impl ActivityMetric {
    pub fn new(
        typing_speed: f64,
        focus_duration: f64,
        tool_switches: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            typing_speed,
            focus_duration,
            tool_switches,
            timestamp,
        }
    }
}

impl Timestamped for ActivityMetric {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Unified input for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    Key(KeyEvent),
    Activity(ActivityMetric),
}

impl SensorEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SensorEvent::Key(e) => e.timestamp,
            SensorEvent::Activity(m) => m.timestamp,
        }
    }
}

impl From<KeyEvent> for SensorEvent {
    fn from(event: KeyEvent) -> Self {
        SensorEvent::Key(event)
    }
}

impl From<ActivityMetric> for SensorEvent {
    fn from(metric: ActivityMetric) -> Self {
        SensorEvent::Activity(metric)
    }
}
