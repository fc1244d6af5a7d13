//! Keystroke assembly and burst segmentation.
//!
//! Raw press/release events are paired into [`KeyStroke`]s by key id, and
//! keystrokes are grouped into [`TypingBurst`]s separated by pauses.

use crate::collector::types::{KeyEvent, KeyEventKind, Modifier};
use crate::config::{secs_to_duration, SegmenterConfig};
use crate::core::features::{analyze_burst, summarize_typing};
use crate::core::types::{elapsed_secs, KeyStroke, PauseInterval, TypingBurst, TypingPattern};
use crate::core::windowing::WindowStore;
use crate::error::ConfigError;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};

/// Pairs press and release events into keystrokes.
#[derive(Debug, Default)]
pub struct KeystrokeAssembler {
    /// Press time of every key currently held
    pending: HashMap<String, DateTime<Utc>>,
    held_modifiers: BTreeSet<Modifier>,
    dropped: u64,
}

impl KeystrokeAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one key event. Returns a keystroke when a release completes a hold.
    ///
    /// Unmatched releases and releases stamped before their press are dropped.
    pub fn process(&mut self, event: &KeyEvent) -> Option<KeyStroke> {
        let modifier = Modifier::from_key(&event.key);

        match event.kind {
            KeyEventKind::Press => {
                if let Some(m) = modifier {
                    self.held_modifiers.insert(m);
                }
                // Auto-repeat refreshes the press time
                self.pending.insert(event.key.clone(), event.timestamp);
                None
            }
            KeyEventKind::Release => {
                if let Some(m) = modifier {
                    self.held_modifiers.remove(&m);
                }

                let Some(pressed_at) = self.pending.remove(&event.key) else {
                    self.dropped += 1;
                    tracing::debug!(key = %event.key, "ignoring release without matching press");
                    return None;
                };

                if event.timestamp < pressed_at {
                    self.dropped += 1;
                    tracing::debug!(key = %event.key, "ignoring release stamped before its press");
                    return None;
                }

                Some(KeyStroke {
                    key: event.key.clone(),
                    timestamp: pressed_at,
                    duration: elapsed_secs(event.timestamp - pressed_at),
                })
            }
        }
    }

    /// Modifiers currently held down.
    pub fn active_modifiers(&self) -> &BTreeSet<Modifier> {
        &self.held_modifiers
    }

    /// Number of keys pressed but not yet released.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Events dropped as malformed so far.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

/// Outcome of feeding one keystroke to the segmenter.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOutcome {
    /// Keystroke joined the open burst (or started one)
    Extended,
    /// A pause closed the previous run; the burst is present when it was valid
    Closed(Option<TypingBurst>),
    /// Keystroke predates the open burst and was discarded
    Dropped,
}

/// Groups keystrokes into bursts separated by pauses.
#[derive(Debug)]
pub struct BurstSegmenter {
    pause_threshold: Duration,
    current_burst: Vec<KeyStroke>,
    last_keystroke_at: Option<DateTime<Utc>>,
    bursts: WindowStore<TypingBurst>,
    pauses: WindowStore<PauseInterval>,
    discarded_runs: u64,
}

impl BurstSegmenter {
    /// Create a segmenter from a validated config section.
    pub fn new(config: &SegmenterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let history = secs_to_duration(config.history_window_secs);

        Ok(Self {
            pause_threshold: secs_to_duration(config.pause_threshold_secs),
            current_burst: Vec::new(),
            last_keystroke_at: None,
            bursts: WindowStore::new(history),
            pauses: WindowStore::new(history),
            discarded_runs: 0,
        })
    }

    /// Create a segmenter with a 2 second pause threshold and 5 minute history.
    pub fn with_defaults() -> Self {
        let config = SegmenterConfig::default();
        let history = secs_to_duration(config.history_window_secs);
        Self {
            pause_threshold: secs_to_duration(config.pause_threshold_secs),
            current_burst: Vec::new(),
            last_keystroke_at: None,
            bursts: WindowStore::new(history),
            pauses: WindowStore::new(history),
            discarded_runs: 0,
        }
    }

    /// Feed one keystroke.
    pub fn process_keystroke(&mut self, keystroke: KeyStroke) -> SegmentOutcome {
        let at = keystroke.timestamp;

        if let Some(last) = self.last_keystroke_at {
            if at < last {
                return self.insert_late(keystroke);
            }

            if at - last >= self.pause_threshold {
                let closed = self.close_current();
                self.pauses.append(PauseInterval {
                    start: last,
                    end: at,
                });
                self.current_burst.push(keystroke);
                self.last_keystroke_at = Some(at);
                return SegmentOutcome::Closed(closed);
            }
        }

        self.current_burst.push(keystroke);
        self.last_keystroke_at = Some(at);
        SegmentOutcome::Extended
    }

    /// Close the open burst if no keystroke arrived for a full pause threshold.
    pub fn check_idle_at(&mut self, now: DateTime<Utc>) -> Option<TypingBurst> {
        let last = self.last_keystroke_at?;
        if self.current_burst.is_empty() || now - last < self.pause_threshold {
            return None;
        }
        self.close_current()
    }

    /// Close the open burst unconditionally.
    pub fn flush(&mut self) -> Option<TypingBurst> {
        self.close_current()
    }

    /// Drop closed bursts and pauses that left the history window.
    pub fn evict_at(&mut self, now: DateTime<Utc>) {
        self.bursts.evict_expired(now);
        self.pauses.evict_expired(now);
    }

    /// Bursts that ended within `lookback` of `now`.
    pub fn recent_bursts(&self, lookback: Duration, now: DateTime<Utc>) -> Vec<TypingBurst> {
        self.bursts.recent(lookback, now).cloned().collect()
    }

    /// Pauses that ended within `lookback` of `now`.
    pub fn recent_pauses(&self, lookback: Duration, now: DateTime<Utc>) -> Vec<PauseInterval> {
        self.pauses.recent(lookback, now).copied().collect()
    }

    /// Typing sample over bursts and pauses that ended within `lookback`.
    pub fn summarize_at(&self, lookback: Duration, now: DateTime<Utc>) -> Option<TypingPattern> {
        summarize_typing(
            self.bursts.recent(lookback, now),
            self.pauses.recent(lookback, now),
            now,
        )
    }

    pub fn pause_threshold(&self) -> Duration {
        self.pause_threshold
    }

    /// Keystrokes in the open burst.
    pub fn open_keystrokes(&self) -> usize {
        self.current_burst.len()
    }

    /// Runs that were closed but did not qualify as bursts.
    pub fn discarded_runs(&self) -> u64 {
        self.discarded_runs
    }

    fn close_current(&mut self) -> Option<TypingBurst> {
        if self.current_burst.is_empty() {
            return None;
        }

        let run = std::mem::take(&mut self.current_burst);
        let run_len = run.len();
        match analyze_burst(run) {
            Some(burst) => {
                self.bursts.append(burst.clone());
                Some(burst)
            }
            None => {
                self.discarded_runs += 1;
                tracing::debug!(keystrokes = run_len, "discarding run that does not form a burst");
                None
            }
        }
    }

    /// Place a keystroke that arrived out of order (overlapping key holds).
    fn insert_late(&mut self, keystroke: KeyStroke) -> SegmentOutcome {
        let opened_at = self.current_burst.first().map(|k| k.timestamp);
        match opened_at {
            Some(first) if keystroke.timestamp >= first => {
                let index = self
                    .current_burst
                    .partition_point(|k| k.timestamp <= keystroke.timestamp);
                self.current_burst.insert(index, keystroke);
                SegmentOutcome::Extended
            }
            _ => {
                tracing::debug!("dropping keystroke older than the open burst");
                SegmentOutcome::Dropped
            }
        }
    }
}

impl Default for BurstSegmenter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(key: &str, at: DateTime<Utc>) -> KeyStroke {
        KeyStroke {
            key: key.to_string(),
            timestamp: at,
            duration: 0.05,
        }
    }

    fn closed_bursts(segmenter: &mut BurstSegmenter, offsets_ms: &[i64]) -> Vec<TypingBurst> {
        let base = Utc::now();
        let mut closed = Vec::new();
        for &offset in offsets_ms {
            if let SegmentOutcome::Closed(Some(burst)) =
                segmenter.process_keystroke(stroke("a", base + Duration::milliseconds(offset)))
            {
                closed.push(burst);
            }
        }
        closed.extend(segmenter.flush());
        closed
    }

    #[test]
    fn test_assembler_pairs_press_and_release() {
        let base = Utc::now();
        let mut assembler = KeystrokeAssembler::new();

        assert!(assembler.process(&KeyEvent::press("a", base)).is_none());
        let stroke = assembler
            .process(&KeyEvent::release("a", base + Duration::milliseconds(80)))
            .unwrap();

        assert_eq!(stroke.key, "a");
        assert_eq!(stroke.timestamp, base);
        assert!((stroke.duration - 0.08).abs() < 1e-9);
        assert_eq!(assembler.pending_count(), 0);
    }

    #[test]
    fn test_assembler_ignores_unmatched_release() {
        let base = Utc::now();
        let mut assembler = KeystrokeAssembler::new();

        assert!(assembler.process(&KeyEvent::release("x", base)).is_none());

        assembler.process(&KeyEvent::press("y", base));
        assert!(assembler
            .process(&KeyEvent::release("y", base - Duration::milliseconds(5)))
            .is_none());

        assert_eq!(assembler.dropped_count(), 2);
    }

    #[test]
    fn test_assembler_tracks_modifiers() {
        let base = Utc::now();
        let mut assembler = KeystrokeAssembler::new();

        assembler.process(&KeyEvent::press("shift", base));
        assembler.process(&KeyEvent::press("a", base + Duration::milliseconds(10)));
        assert!(assembler.active_modifiers().contains(&Modifier::Shift));

        assembler.process(&KeyEvent::release("shift", base + Duration::milliseconds(50)));
        assert!(assembler.active_modifiers().is_empty());
        assert_eq!(assembler.pending_count(), 1);
    }

    #[test]
    fn test_pause_splits_bursts() {
        let mut segmenter = BurstSegmenter::with_defaults();
        let bursts = closed_bursts(&mut segmenter, &[0, 200, 400, 3000, 3200]);

        assert_eq!(bursts.len(), 2);
        assert_eq!(bursts[0].keystroke_count(), 3);
        assert_eq!(bursts[1].keystroke_count(), 2);

        let now = bursts[1].end_time;
        let pauses = segmenter.recent_pauses(Duration::seconds(60), now);
        assert_eq!(pauses.len(), 1);
        assert!((pauses[0].duration_secs() - 2.6).abs() < 1e-9);
    }

    #[test]
    fn test_gap_exactly_at_threshold_is_a_pause() {
        let mut segmenter = BurstSegmenter::with_defaults();
        let bursts = closed_bursts(&mut segmenter, &[0, 100, 2100, 2200]);
        assert_eq!(bursts.len(), 2);
    }

    #[test]
    fn test_lone_keystrokes_never_form_bursts() {
        let mut segmenter = BurstSegmenter::with_defaults();
        let bursts = closed_bursts(&mut segmenter, &[0, 5000, 10000]);

        assert!(bursts.is_empty());
        assert_eq!(segmenter.discarded_runs(), 3);
    }

    #[test]
    fn test_empty_input_produces_nothing() {
        let mut segmenter = BurstSegmenter::with_defaults();
        assert!(segmenter.flush().is_none());
        assert!(segmenter.check_idle_at(Utc::now()).is_none());
        assert!(segmenter
            .summarize_at(Duration::seconds(300), Utc::now())
            .is_none());
    }

    #[test]
    fn test_zero_duration_burst_is_discarded() {
        let mut segmenter = BurstSegmenter::with_defaults();
        let bursts = closed_bursts(&mut segmenter, &[0, 0, 0]);
        assert!(bursts.is_empty());
    }

    #[test]
    fn test_idle_check_closes_burst() {
        let base = Utc::now();
        let mut segmenter = BurstSegmenter::with_defaults();
        segmenter.process_keystroke(stroke("a", base));
        segmenter.process_keystroke(stroke("b", base + Duration::milliseconds(300)));

        assert!(segmenter
            .check_idle_at(base + Duration::milliseconds(1000))
            .is_none());
        let burst = segmenter
            .check_idle_at(base + Duration::milliseconds(2500))
            .unwrap();
        assert_eq!(burst.keystroke_count(), 2);
        assert_eq!(segmenter.open_keystrokes(), 0);

        // The pause is still recorded when typing resumes
        segmenter.process_keystroke(stroke("c", base + Duration::seconds(5)));
        let pauses = segmenter.recent_pauses(Duration::seconds(60), base + Duration::seconds(5));
        assert_eq!(pauses.len(), 1);
        assert_eq!(pauses[0].start, base + Duration::milliseconds(300));
    }

    #[test]
    fn test_overlapping_keystroke_is_ordered_into_burst() {
        let base = Utc::now();
        let mut segmenter = BurstSegmenter::with_defaults();
        segmenter.process_keystroke(stroke("a", base));
        segmenter.process_keystroke(stroke("c", base + Duration::milliseconds(200)));
        assert_eq!(
            segmenter.process_keystroke(stroke("b", base + Duration::milliseconds(100))),
            SegmentOutcome::Extended
        );
        assert_eq!(
            segmenter.process_keystroke(stroke("z", base - Duration::seconds(1))),
            SegmentOutcome::Dropped
        );

        let burst = segmenter.flush().unwrap();
        let keys: Vec<_> = burst.keystrokes.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_summary_uses_recent_bursts_only() {
        let base = Utc::now();
        let mut segmenter = BurstSegmenter::with_defaults();
        for offset in [0, 500, 1000, 10_000, 10_250, 10_500, 10_750, 11_000] {
            segmenter.process_keystroke(stroke("k", base + Duration::milliseconds(offset)));
        }
        segmenter.flush();

        let now = base + Duration::seconds(12);
        let all = segmenter.summarize_at(Duration::seconds(300), now).unwrap();
        assert!((all.avg_speed - 240.0).abs() < 1e-9);
        assert!((all.pause_duration - 9.0).abs() < 1e-9);

        let latest = segmenter.summarize_at(Duration::seconds(5), now).unwrap();
        assert!((latest.avg_speed - 300.0).abs() < 1e-9);
        assert_eq!(latest.pause_duration, 9.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SegmenterConfig {
            pause_threshold_secs: -2.0,
            ..Default::default()
        };
        assert!(BurstSegmenter::new(&config).is_err());
    }
}
