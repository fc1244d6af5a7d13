//! Capture boundary for the pattern engine.
//!
//! This module defines the events external capture sources emit and the
//! bounded channel they push them through.

pub mod channel;
pub mod types;

// Re-export commonly used types
pub use channel::{EventChannel, EventSender};
pub use types::{ActivityMetric, KeyEvent, KeyEventKind, Modifier, SensorEvent};
