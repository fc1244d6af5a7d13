//! Synheart Pattern Engine - behavioral pattern recognition over input telemetry.
//!
//! This library turns raw keystroke timing and periodic activity samples into
//! typing bursts, activity patterns and context changes, and validates each
//! result against the session's own history.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Synheart Pattern Engine                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐            │
//! │  │  Collector  │──▶│  Segmenter  │──▶│ Recognizer  │            │
//! │  │  (channel)  │   │  (bursts)   │   │ (patterns)  │            │
//! │  └─────────────┘   └─────────────┘   └─────────────┘            │
//! │         │                                   │                    │
//! │         ▼                                   ▼                    │
//! │  ┌─────────────┐                    ┌─────────────┐             │
//! │  │ Processing  │                    │  Validator  │             │
//! │  │    Stats    │                    │  (history)  │             │
//! │  └─────────────┘                    └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every stage keeps its state in a [`core::WindowStore`] and is driven by a
//! single writer, usually an [`engine::EngineWorker`] thread.
//!
//! # Example
//!
//! ```no_run
//! use synheart_pattern_engine::{collector::{EventChannel, KeyEvent}, Config, Engine, EngineWorker};
//! use chrono::Utc;
//!
//! let config = Config::default();
//! let engine = Engine::new(&config).expect("valid config");
//! let (sender, receiver) = EventChannel::new(config.engine.queue_capacity).into_parts();
//! let worker = EngineWorker::spawn(engine, receiver).expect("worker thread");
//!
//! sender.try_send(KeyEvent::press("a", Utc::now())).ok();
//! drop(sender);
//!
//! for output in worker.outputs().iter() {
//!     println!("{output:?}");
//! }
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod stats;

// Re-export key types at crate root for convenience
pub use collector::{ActivityMetric, EventChannel, EventSender, KeyEvent, SensorEvent};
pub use config::{Config, TimeSource};
pub use core::{
    ActivityPattern, BurstSegmenter, ContextChange, PatternRecognizer, PatternValidator,
    TypingBurst, ValidationResult,
};
pub use engine::{Engine, EngineEvent, EngineOutput, EngineWorker};
pub use error::{ChannelError, ConfigError};
pub use stats::{ProcessingLog, ProcessingStats, SharedProcessingLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
