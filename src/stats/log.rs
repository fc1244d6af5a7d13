//! Processing counters for the pattern engine.
//!
//! Counters are atomics so a status reader on another thread can take a
//! snapshot while the worker keeps recording.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What a counter increment refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    KeyEvent,
    Keystroke,
    BurstClosed,
    BurstDropped,
    TypingSample,
    ActivitySample,
    PatternEmitted,
    ContextChangeEmitted,
    ValidationAccepted,
    ValidationRejected,
    MalformedDropped,
}

/// Session-wide processing counters.
#[derive(Debug)]
pub struct ProcessingLog {
    key_events: AtomicU64,
    keystrokes: AtomicU64,
    bursts_closed: AtomicU64,
    bursts_dropped: AtomicU64,
    typing_samples: AtomicU64,
    activity_samples: AtomicU64,
    patterns_emitted: AtomicU64,
    context_changes_emitted: AtomicU64,
    validations_accepted: AtomicU64,
    validations_rejected: AtomicU64,
    malformed_dropped: AtomicU64,
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl ProcessingLog {
    pub fn new() -> Self {
        Self {
            key_events: AtomicU64::new(0),
            keystrokes: AtomicU64::new(0),
            bursts_closed: AtomicU64::new(0),
            bursts_dropped: AtomicU64::new(0),
            typing_samples: AtomicU64::new(0),
            activity_samples: AtomicU64::new(0),
            patterns_emitted: AtomicU64::new(0),
            context_changes_emitted: AtomicU64::new(0),
            validations_accepted: AtomicU64::new(0),
            validations_rejected: AtomicU64::new(0),
            malformed_dropped: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that continues from, and saves back to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous processing stats");
        }

        log
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::KeyEvent => &self.key_events,
            Counter::Keystroke => &self.keystrokes,
            Counter::BurstClosed => &self.bursts_closed,
            Counter::BurstDropped => &self.bursts_dropped,
            Counter::TypingSample => &self.typing_samples,
            Counter::ActivitySample => &self.activity_samples,
            Counter::PatternEmitted => &self.patterns_emitted,
            Counter::ContextChangeEmitted => &self.context_changes_emitted,
            Counter::ValidationAccepted => &self.validations_accepted,
            Counter::ValidationRejected => &self.validations_rejected,
            Counter::MalformedDropped => &self.malformed_dropped,
        }
    }

    pub fn record(&self, counter: Counter) {
        self.record_many(counter, 1);
    }

    pub fn record_many(&self, counter: Counter, count: u64) {
        self.counter(counter).fetch_add(count, Ordering::Relaxed);
    }

    /// Record the outcome of one validation call.
    pub fn record_validation(&self, is_valid: bool) {
        if is_valid {
            self.record(Counter::ValidationAccepted);
        } else {
            self.record(Counter::ValidationRejected);
        }
    }

    pub fn stats(&self) -> ProcessingStats {
        ProcessingStats {
            key_events: self.key_events.load(Ordering::Relaxed),
            keystrokes: self.keystrokes.load(Ordering::Relaxed),
            bursts_closed: self.bursts_closed.load(Ordering::Relaxed),
            bursts_dropped: self.bursts_dropped.load(Ordering::Relaxed),
            typing_samples: self.typing_samples.load(Ordering::Relaxed),
            activity_samples: self.activity_samples.load(Ordering::Relaxed),
            patterns_emitted: self.patterns_emitted.load(Ordering::Relaxed),
            context_changes_emitted: self.context_changes_emitted.load(Ordering::Relaxed),
            validations_accepted: self.validations_accepted.load(Ordering::Relaxed),
            validations_rejected: self.validations_rejected.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary for the status command.
    pub fn summary(&self) -> String {
        self.stats().summary()
    }

    /// Save counters to the persistence path, if one is set.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let persisted = PersistedStats {
                stats: self.stats(),
                last_updated: Utc::now(),
            };
            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let persisted: PersistedStats =
            serde_json::from_str(&content).map_err(std::io::Error::other)?;
        let s = persisted.stats;

        for (counter, value) in [
            (Counter::KeyEvent, s.key_events),
            (Counter::Keystroke, s.keystrokes),
            (Counter::BurstClosed, s.bursts_closed),
            (Counter::BurstDropped, s.bursts_dropped),
            (Counter::TypingSample, s.typing_samples),
            (Counter::ActivitySample, s.activity_samples),
            (Counter::PatternEmitted, s.patterns_emitted),
            (Counter::ContextChangeEmitted, s.context_changes_emitted),
            (Counter::ValidationAccepted, s.validations_accepted),
            (Counter::ValidationRejected, s.validations_rejected),
            (Counter::MalformedDropped, s.malformed_dropped),
        ] {
            self.counter(counter).store(value, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.key_events,
            &self.keystrokes,
            &self.bursts_closed,
            &self.bursts_dropped,
            &self.typing_samples,
            &self.activity_samples,
            &self.patterns_emitted,
            &self.context_changes_emitted,
            &self.validations_accepted,
            &self.validations_rejected,
            &self.malformed_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for ProcessingLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of processing statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub key_events: u64,
    pub keystrokes: u64,
    pub bursts_closed: u64,
    pub bursts_dropped: u64,
    pub typing_samples: u64,
    pub activity_samples: u64,
    pub patterns_emitted: u64,
    pub context_changes_emitted: u64,
    pub validations_accepted: u64,
    pub validations_rejected: u64,
    pub malformed_dropped: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl ProcessingStats {
    pub fn summary(&self) -> String {
        format!(
            "Session Statistics:\n\
             - Key events processed: {}\n\
             - Keystrokes assembled: {}\n\
             - Bursts closed: {} ({} discarded)\n\
             - Typing samples: {}\n\
             - Activity samples: {}\n\
             - Patterns emitted: {}\n\
             - Context changes emitted: {}\n\
             - Validations accepted/rejected: {}/{}\n\
             - Malformed events dropped: {}\n\
             - Session duration: {} seconds",
            self.key_events,
            self.keystrokes,
            self.bursts_closed,
            self.bursts_dropped,
            self.typing_samples,
            self.activity_samples,
            self.patterns_emitted,
            self.context_changes_emitted,
            self.validations_accepted,
            self.validations_rejected,
            self.malformed_dropped,
            self.session_duration_secs
        )
    }
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(flatten)]
    stats: ProcessingStats,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared processing log.
pub type SharedProcessingLog = Arc<ProcessingLog>;

pub fn create_shared_log() -> SharedProcessingLog {
    Arc::new(ProcessingLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedProcessingLog {
    Arc::new(ProcessingLog::with_persistence(path))
}

/// Read persisted stats without attaching a live log.
pub fn read_persisted(path: &std::path::Path) -> Result<ProcessingStats, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let persisted: PersistedStats =
        serde_json::from_str(&content).map_err(std::io::Error::other)?;
    Ok(persisted.stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_log_counting() {
        let log = ProcessingLog::new();

        log.record(Counter::KeyEvent);
        log.record(Counter::KeyEvent);
        log.record(Counter::BurstClosed);
        log.record_validation(true);
        log.record_validation(false);
        log.record_validation(false);

        let stats = log.stats();
        assert_eq!(stats.key_events, 2);
        assert_eq!(stats.bursts_closed, 1);
        assert_eq!(stats.validations_accepted, 1);
        assert_eq!(stats.validations_rejected, 2);
    }

    #[test]
    fn test_processing_log_reset() {
        let log = ProcessingLog::new();

        log.record_many(Counter::Keystroke, 100);
        log.record_many(Counter::MalformedDropped, 5);
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.keystrokes, 0);
        assert_eq!(stats.malformed_dropped, 0);
    }

    #[test]
    fn test_summary_format() {
        let log = ProcessingLog::new();
        let summary = log.summary();

        assert!(summary.contains("Key events processed"));
        assert!(summary.contains("Patterns emitted"));
        assert!(summary.contains("Malformed events dropped"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats").join("processing.json");

        let log = ProcessingLog::with_persistence(path.clone());
        log.record_many(Counter::PatternEmitted, 7);
        log.record(Counter::ContextChangeEmitted);
        log.save().unwrap();

        let restored = ProcessingLog::with_persistence(path.clone());
        let stats = restored.stats();
        assert_eq!(stats.patterns_emitted, 7);
        assert_eq!(stats.context_changes_emitted, 1);

        let read = read_persisted(&path).unwrap();
        assert_eq!(read.patterns_emitted, 7);
    }

    #[test]
    fn test_save_without_path_is_noop() {
        let log = ProcessingLog::new();
        log.record(Counter::KeyEvent);
        assert!(log.save().is_ok());
    }
}
