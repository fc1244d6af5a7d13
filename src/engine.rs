//! Single-writer pipeline driver.
//!
//! [`Engine`] owns one instance of every component and routes each
//! [`SensorEvent`] through them in order. [`EngineWorker`] runs an engine on
//! a dedicated thread fed by the bounded capture channel, so all window
//! mutation happens on that thread.
//!
//! ```text
//! KeyEvent ──▶ KeystrokeAssembler ──▶ BurstSegmenter ──▶ typing sample ─┐
//!                                                                        ▼
//! ActivityMetric ─────────────────────────────────────▶ PatternRecognizer
//!                                                                        │
//!                                     PatternValidator ◀─────────────────┘
//! ```

use crate::collector::types::SensorEvent;
use crate::config::{secs_to_duration, Config, EngineConfig, TimeSource};
use crate::core::recognizer::{PatternRecognizer, Recognition};
use crate::core::segmenter::{BurstSegmenter, KeystrokeAssembler, SegmentOutcome};
use crate::core::types::{ActivityPattern, ContextChange, KeyStroke, TypingBurst, ValidationResult};
use crate::core::validator::PatternValidator;
use crate::error::ConfigError;
use crate::stats::{create_shared_log, Counter, SharedProcessingLog};
use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use uuid::Uuid;

/// Something the engine produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A closed typing burst
    Burst(TypingBurst),
    /// A recognized activity pattern and its validation outcome
    Pattern {
        pattern: ActivityPattern,
        validation: ValidationResult,
    },
    /// A detected context change and its validation outcome
    ContextChange {
        change: ContextChange,
        validation: ValidationResult,
    },
}

/// One engine result tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub session_id: Uuid,
    pub emitted_at: DateTime<Utc>,
    pub event: EngineEvent,
}

/// A monitoring session: one segmenter, recognizer and validator.
///
/// Sessions never share state. Run several engines for several sessions.
#[derive(Debug)]
pub struct Engine {
    session_id: Uuid,
    config: EngineConfig,
    typing_lookback: Duration,
    assembler: KeystrokeAssembler,
    segmenter: BurstSegmenter,
    recognizer: PatternRecognizer,
    validator: PatternValidator,
    stats: SharedProcessingLog,
    /// Latest event timestamp seen, used by the event time source
    latest_event: Option<DateTime<Utc>>,
}

impl Engine {
    /// Build an engine from a full configuration.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            session_id: Uuid::new_v4(),
            config: config.engine.clone(),
            typing_lookback: secs_to_duration(config.engine.typing_summary_window_secs),
            assembler: KeystrokeAssembler::new(),
            segmenter: BurstSegmenter::new(&config.segmenter)?,
            recognizer: PatternRecognizer::new(config.recognizer.clone())?,
            validator: PatternValidator::new(config.validator.clone())?,
            stats: create_shared_log(),
            latest_event: None,
        })
    }

    /// Record counters into a shared (possibly persisted) log instead of a private one.
    pub fn with_stats(mut self, stats: SharedProcessingLog) -> Self {
        self.stats = stats;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &SharedProcessingLog {
        &self.stats
    }

    pub fn segmenter(&self) -> &BurstSegmenter {
        &self.segmenter
    }

    pub fn recognizer(&self) -> &PatternRecognizer {
        &self.recognizer
    }

    pub fn validator(&self) -> &PatternValidator {
        &self.validator
    }

    /// Current time according to the configured time source.
    ///
    /// With the event time source and no events yet, this is `None`.
    pub fn current_time(&self) -> Option<DateTime<Utc>> {
        match self.config.time_source {
            TimeSource::Wall => Some(Utc::now()),
            TimeSource::Event => self.latest_event,
        }
    }

    /// Process one event, taking "now" from the configured time source.
    pub fn handle(&mut self, event: SensorEvent) -> Vec<EngineOutput> {
        let at = event.timestamp();
        self.latest_event = Some(self.latest_event.map_or(at, |latest| latest.max(at)));
        let now = self.current_time().unwrap_or(at);
        self.handle_at(event, now)
    }

    /// Process one event with an explicit "now".
    pub fn handle_at(&mut self, event: SensorEvent, now: DateTime<Utc>) -> Vec<EngineOutput> {
        let mut out = Vec::new();

        match event {
            SensorEvent::Key(key_event) => {
                self.stats.record(Counter::KeyEvent);
                let dropped_before = self.assembler.dropped_count();
                match self.assembler.process(&key_event) {
                    Some(keystroke) => {
                        self.stats.record(Counter::Keystroke);
                        self.segment(keystroke, now, &mut out);
                    }
                    None => {
                        let dropped = self.assembler.dropped_count() - dropped_before;
                        if dropped > 0 {
                            self.stats.record_many(Counter::MalformedDropped, dropped);
                        }
                    }
                }
            }
            SensorEvent::Activity(metric) => {
                self.stats.record(Counter::ActivitySample);
                let recognition = self.recognizer.ingest_activity_sample_at(metric, now);
                self.emit_recognition(recognition, now, &mut out);
            }
        }

        out
    }

    /// Periodic maintenance using the configured time source.
    pub fn tick(&mut self) -> Vec<EngineOutput> {
        match self.current_time() {
            Some(now) => self.tick_at(now),
            None => Vec::new(),
        }
    }

    /// Close an idle burst and evict everything that left its window.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Vec<EngineOutput> {
        let mut out = Vec::new();

        let discarded_before = self.segmenter.discarded_runs();
        if let Some(burst) = self.segmenter.check_idle_at(now) {
            self.on_burst(burst, now, &mut out);
        }
        self.record_discarded(discarded_before);

        self.segmenter.evict_at(now);
        self.recognizer.evict_at(now);
        self.validator.evict_at(now);

        out
    }

    /// Close the open burst unconditionally, for shutdown.
    pub fn flush(&mut self) -> Vec<EngineOutput> {
        let mut out = Vec::new();
        let now = self.current_time().unwrap_or_else(Utc::now);

        let discarded_before = self.segmenter.discarded_runs();
        if let Some(burst) = self.segmenter.flush() {
            self.on_burst(burst, now, &mut out);
        }
        self.record_discarded(discarded_before);

        out
    }

    fn segment(&mut self, keystroke: KeyStroke, now: DateTime<Utc>, out: &mut Vec<EngineOutput>) {
        let discarded_before = self.segmenter.discarded_runs();
        match self.segmenter.process_keystroke(keystroke) {
            SegmentOutcome::Extended => {}
            SegmentOutcome::Dropped => self.stats.record(Counter::MalformedDropped),
            SegmentOutcome::Closed(Some(burst)) => self.on_burst(burst, now, out),
            SegmentOutcome::Closed(None) => {}
        }
        self.record_discarded(discarded_before);
    }

    fn record_discarded(&self, before: u64) {
        let discarded = self.segmenter.discarded_runs() - before;
        if discarded > 0 {
            self.stats.record_many(Counter::BurstDropped, discarded);
        }
    }

    fn on_burst(&mut self, burst: TypingBurst, now: DateTime<Utc>, out: &mut Vec<EngineOutput>) {
        self.stats.record(Counter::BurstClosed);
        tracing::debug!(
            keystrokes = burst.keystroke_count(),
            cpm = burst.chars_per_minute,
            "burst closed"
        );
        out.push(self.output(now, EngineEvent::Burst(burst)));

        let Some(sample) = self.segmenter.summarize_at(self.typing_lookback, now) else {
            return;
        };
        self.stats.record(Counter::TypingSample);

        if let Some(pattern) = self.recognizer.ingest_typing_sample_at(sample, now) {
            self.emit_pattern(pattern, now, out);
        }
    }

    fn emit_recognition(
        &mut self,
        recognition: Recognition,
        now: DateTime<Utc>,
        out: &mut Vec<EngineOutput>,
    ) {
        for change in recognition.context_changes {
            let validation = self.validator.validate_context_change_at(&change, now);
            self.stats.record(Counter::ContextChangeEmitted);
            self.stats.record_validation(validation.is_valid);
            out.push(self.output(now, EngineEvent::ContextChange { change, validation }));
        }

        for pattern in recognition.patterns {
            self.emit_pattern(pattern, now, out);
        }
    }

    fn emit_pattern(
        &mut self,
        pattern: ActivityPattern,
        now: DateTime<Utc>,
        out: &mut Vec<EngineOutput>,
    ) {
        let validation = self.validator.validate_activity_pattern_at(&pattern, now);
        self.stats.record(Counter::PatternEmitted);
        self.stats.record_validation(validation.is_valid);
        if !validation.is_valid {
            tracing::debug!(
                pattern_type = %pattern.pattern_type,
                anomalies = ?validation.anomalies,
                "pattern rejected"
            );
        }
        out.push(self.output(now, EngineEvent::Pattern { pattern, validation }));
    }

    fn output(&self, emitted_at: DateTime<Utc>, event: EngineEvent) -> EngineOutput {
        EngineOutput {
            session_id: self.session_id,
            emitted_at,
            event,
        }
    }
}

/// Runs an [`Engine`] on its own thread.
///
/// The worker stops when every producer handle has been dropped or when
/// [`EngineWorker::shutdown`] is called. Either way the open burst is
/// flushed before the thread exits.
pub struct EngineWorker {
    handle: Option<JoinHandle<Engine>>,
    running: Arc<AtomicBool>,
    outputs: Receiver<EngineOutput>,
}

impl EngineWorker {
    /// Start the worker thread.
    pub fn spawn(engine: Engine, events: Receiver<SensorEvent>) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let (output_tx, outputs) = unbounded();

        let handle = thread::Builder::new()
            .name("pattern-engine".to_string())
            .spawn({
                let running = running.clone();
                move || run_worker(engine, events, output_tx, running)
            })?;

        Ok(Self {
            handle: Some(handle),
            running,
            outputs,
        })
    }

    /// Results produced so far. Disconnects once the worker thread exits.
    pub fn outputs(&self) -> &Receiver<EngineOutput> {
        &self.outputs
    }

    /// Flag that stops the worker loop when cleared, e.g. from a signal handler.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the loop, wait for the thread and return the engine with any
    /// results not yet received.
    pub fn shutdown(mut self) -> thread::Result<(Engine, Vec<EngineOutput>)> {
        self.running.store(false, Ordering::SeqCst);
        self.finish()
    }

    /// Wait for the worker to stop on its own (all producers dropped).
    pub fn join(mut self) -> thread::Result<(Engine, Vec<EngineOutput>)> {
        self.finish()
    }

    fn finish(&mut self) -> thread::Result<(Engine, Vec<EngineOutput>)> {
        let engine = match self.handle.take() {
            Some(handle) => handle.join()?,
            None => {
                return Err(Box::new("engine worker already joined") as Box<dyn Any + Send>)
            }
        };
        let remaining = self.outputs.try_iter().collect();
        Ok((engine, remaining))
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.running.store(false, Ordering::SeqCst);
            if handle.join().is_err() {
                tracing::error!("pattern engine worker panicked");
            }
        }
    }
}

fn run_worker(
    mut engine: Engine,
    events: Receiver<SensorEvent>,
    outputs: Sender<EngineOutput>,
    running: Arc<AtomicBool>,
) -> Engine {
    let tick_interval = engine.config().tick_interval;
    let mut last_tick = Instant::now();

    tracing::info!(session_id = %engine.session_id(), "pattern engine worker started");

    let send_all = |results: Vec<EngineOutput>| {
        for output in results {
            // Nobody listening is not an error for the pipeline
            let _ = outputs.send(output);
        }
    };

    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(tick_interval) {
            Ok(event) => send_all(engine.handle(event)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("all producers disconnected");
                break;
            }
        }

        if last_tick.elapsed() >= tick_interval {
            send_all(engine.tick());
            last_tick = Instant::now();
        }
    }

    // Events already queued when stop was requested are still processed
    for event in events.try_iter() {
        send_all(engine.handle(event));
    }
    send_all(engine.flush());

    tracing::info!(
        session_id = %engine.session_id(),
        summary = %engine.stats().summary(),
        "pattern engine worker stopped"
    );

    engine
}
