//! Core pattern pipeline.
//!
//! This module contains:
//! - Timestamped window storage shared by every stage
//! - Keystroke assembly and burst segmentation
//! - Pattern recognition over typing and activity samples
//! - Validation of patterns and context changes against history

pub mod features;
pub mod recognizer;
pub mod segmenter;
pub mod types;
pub mod validator;
pub mod windowing;

pub use recognizer::{PatternRecognizer, Recognition};
pub use segmenter::{BurstSegmenter, KeystrokeAssembler, SegmentOutcome};
pub use types::{
    ActivityPattern, Anomaly, Context, ContextChange, KeyStroke, MetricMap, PatternType,
    PauseInterval, TypingBurst, TypingPattern, ValidationResult,
};
pub use validator::PatternValidator;
pub use windowing::{Timestamped, WindowStore};
