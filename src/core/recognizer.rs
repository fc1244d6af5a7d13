//! Pattern recognition over typing samples and activity metrics.
//!
//! Typing is a continuous signal, so the recognizer keeps one rolling
//! `typing` pattern and replaces it on every sample. Tool switches and focus
//! breaks are discrete, so each transition appends its own event.

use crate::collector::types::ActivityMetric;
use crate::config::{secs_to_duration, RecognizerConfig};
use crate::core::features::{mean, sample_variance};
use crate::core::types::{
    ActivityPattern, Context, ContextChange, MetricMap, PatternType, TypingPattern,
};
use crate::core::windowing::WindowStore;
use crate::error::ConfigError;
use chrono::{DateTime, Duration, Utc};

/// Everything one activity sample produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub patterns: Vec<ActivityPattern>,
    pub context_changes: Vec<ContextChange>,
}

impl Recognition {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.context_changes.is_empty()
    }
}

/// Aggregates samples per window and emits patterns and context changes.
#[derive(Debug)]
pub struct PatternRecognizer {
    config: RecognizerConfig,
    typing_samples: WindowStore<TypingPattern>,
    activity_samples: WindowStore<ActivityMetric>,
    patterns: WindowStore<ActivityPattern>,
    context_changes: WindowStore<ContextChange>,
}

impl PatternRecognizer {
    /// Create a recognizer from a validated config section.
    pub fn new(config: RecognizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create a recognizer with 5 minute windows.
    pub fn with_defaults() -> Self {
        Self::build(RecognizerConfig::default())
    }

    fn build(config: RecognizerConfig) -> Self {
        Self {
            typing_samples: WindowStore::new(secs_to_duration(config.typing_window_secs)),
            activity_samples: WindowStore::new(secs_to_duration(config.activity_window_secs)),
            patterns: WindowStore::new(secs_to_duration(config.pattern_window_secs)),
            context_changes: WindowStore::new(secs_to_duration(config.pattern_window_secs)),
            config,
        }
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// Add a typing sample using the system clock.
    pub fn ingest_typing_sample(&mut self, sample: TypingPattern) -> Option<ActivityPattern> {
        self.ingest_typing_sample_at(sample, Utc::now())
    }

    /// Add a typing sample and recompute the single live `typing` pattern.
    ///
    /// Returns the new typing pattern, or `None` when no sample is left in
    /// the window.
    pub fn ingest_typing_sample_at(
        &mut self,
        sample: TypingPattern,
        now: DateTime<Utc>,
    ) -> Option<ActivityPattern> {
        self.typing_samples.append(sample);
        self.evict_at(now);

        let pattern = self.summarize_typing()?;
        self.patterns.upsert_by(pattern.clone(), |p| p.pattern_type);
        Some(pattern)
    }

    /// Add an activity metric using the system clock.
    pub fn ingest_activity_sample(&mut self, metric: ActivityMetric) -> Recognition {
        self.ingest_activity_sample_at(metric, Utc::now())
    }

    /// Add an activity metric and detect transitions against the previous sample.
    pub fn ingest_activity_sample_at(
        &mut self,
        metric: ActivityMetric,
        now: DateTime<Utc>,
    ) -> Recognition {
        let previous = self.activity_samples.last().cloned();
        self.activity_samples.append(metric.clone());
        self.evict_at(now);

        // No cutoff means the window covers all representable time
        let cutoff = self.activity_samples.cutoff(now);
        let expired = |at: DateTime<Utc>| cutoff.is_some_and(|cutoff| at <= cutoff);
        if expired(metric.timestamp) {
            return Recognition::default();
        }
        let Some(previous) = previous.filter(|p| !expired(p.timestamp)) else {
            return Recognition::default();
        };
        if metric.timestamp < previous.timestamp {
            tracing::debug!("activity sample out of order, skipping transition check");
            return Recognition::default();
        }

        let mut recognition = Recognition::default();

        if metric.focus_duration < previous.focus_duration {
            let change = ContextChange::new(
                metric.timestamp,
                Context::Focused,
                Context::Switching,
                metric.focus_duration,
                metric.tool_switches as f64 / self.config.context_switch_saturation,
            );
            self.context_changes.append(change.clone());
            recognition.context_changes.push(change);
        }

        if metric.tool_switches > previous.tool_switches {
            let mut metrics = MetricMap::new();
            metrics.insert("switch_count".to_string(), metric.tool_switches as f64);
            metrics.insert("typing_speed".to_string(), metric.typing_speed);

            let pattern = ActivityPattern::new(
                PatternType::Tool,
                previous.timestamp,
                metric.timestamp,
                metric.tool_switches as f64 / self.config.tool_switch_saturation,
                self.config.tool_pattern_confidence,
                metrics,
            );
            self.patterns.append(pattern.clone());
            recognition.patterns.push(pattern);
        }

        recognition
    }

    /// Patterns that ended within `lookback` of now.
    pub fn recent_patterns(&self, lookback: Duration) -> Vec<ActivityPattern> {
        self.recent_patterns_at(lookback, Utc::now())
    }

    pub fn recent_patterns_at(
        &self,
        lookback: Duration,
        now: DateTime<Utc>,
    ) -> Vec<ActivityPattern> {
        self.patterns.recent(lookback, now).cloned().collect()
    }

    /// Context changes within `lookback` of now.
    pub fn recent_context_changes(&self, lookback: Duration) -> Vec<ContextChange> {
        self.recent_context_changes_at(lookback, Utc::now())
    }

    pub fn recent_context_changes_at(
        &self,
        lookback: Duration,
        now: DateTime<Utc>,
    ) -> Vec<ContextChange> {
        self.context_changes.recent(lookback, now).cloned().collect()
    }

    /// The live typing pattern, if any.
    pub fn current_typing_pattern(&self) -> Option<&ActivityPattern> {
        self.patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::Typing)
    }

    /// Evict everything that fell out of its window.
    pub fn evict_at(&mut self, now: DateTime<Utc>) {
        self.typing_samples.evict_expired(now);
        self.activity_samples.evict_expired(now);
        self.patterns.evict_expired(now);
        self.context_changes.evict_expired(now);
    }

    pub fn typing_sample_count(&self) -> usize {
        self.typing_samples.len()
    }

    pub fn activity_sample_count(&self) -> usize {
        self.activity_samples.len()
    }

    fn summarize_typing(&self) -> Option<ActivityPattern> {
        let speeds: Vec<f64> = self.typing_samples.iter().map(|s| s.avg_speed).collect();
        let avg_speed = mean(&speeds)?;
        let max_speed = speeds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let intensity = if max_speed > 0.0 {
            avg_speed / max_speed
        } else {
            0.0
        };

        let consistency = if speeds.len() > 1 {
            1.0 / (1.0 + sample_variance(&speeds))
        } else {
            self.config.default_typing_confidence
        };

        let start = self.typing_samples.iter().map(|s| s.timestamp).min()?;
        let end = self.typing_samples.iter().map(|s| s.timestamp).max()?;

        let mut metrics = MetricMap::new();
        metrics.insert("avg_speed".to_string(), avg_speed);
        metrics.insert("consistency".to_string(), consistency);
        metrics.insert("burst_count".to_string(), speeds.len() as f64);

        Some(ActivityPattern::new(
            PatternType::Typing,
            start,
            end,
            intensity,
            consistency,
            metrics,
        ))
    }
}

impl Default for PatternRecognizer {
    fn default() -> Self {
        Self::with_defaults()
    }
}
