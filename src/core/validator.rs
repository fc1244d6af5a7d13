//! Validation of detected patterns and context changes.
//!
//! Each call records its input in a rolling history, applies the basic
//! duration and confidence gates, and then compares the candidate against
//! similar historical patterns. Rejection is a normal result, never an error.

use crate::config::{secs_to_duration, ValidatorConfig};
use crate::core::features::{mean, sample_variance};
use crate::core::types::{
    clamp01, ActivityPattern, Anomaly, ContextChange, MetricMap, ValidationResult,
};
use crate::core::windowing::WindowStore;
use crate::error::ConfigError;
use chrono::{DateTime, Utc};

/// Validates patterns against internal consistency and rolling history.
#[derive(Debug)]
pub struct PatternValidator {
    config: ValidatorConfig,
    pattern_history: WindowStore<ActivityPattern>,
    context_history: WindowStore<ContextChange>,
}

impl PatternValidator {
    /// Create a validator from a validated config section.
    pub fn new(config: ValidatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create a validator with the default thresholds.
    pub fn with_defaults() -> Self {
        Self::build(ValidatorConfig::default())
    }

    fn build(config: ValidatorConfig) -> Self {
        let history = secs_to_duration(config.history_window_secs);
        Self {
            pattern_history: WindowStore::new(history),
            context_history: WindowStore::new(history),
            config,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate an activity pattern using the system clock.
    pub fn validate_activity_pattern(&mut self, pattern: &ActivityPattern) -> ValidationResult {
        self.validate_activity_pattern_at(pattern, Utc::now())
    }

    /// Validate an activity pattern.
    pub fn validate_activity_pattern_at(
        &mut self,
        pattern: &ActivityPattern,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        self.pattern_history.append(pattern.clone());
        self.evict_at(now);

        let duration = pattern.duration_secs();
        if duration < self.config.min_duration_secs {
            return ValidationResult::rejected(
                0.0,
                "duration",
                duration,
                Anomaly::PatternDurationTooShort,
            );
        }

        if pattern.confidence < self.config.min_confidence {
            return ValidationResult::rejected(
                pattern.confidence,
                "confidence",
                pattern.confidence,
                Anomaly::PatternConfidenceTooLow,
            );
        }

        let similar = self.find_similar_patterns(pattern);
        if similar.is_empty() {
            self.validate_new_pattern(pattern)
        } else {
            self.validate_against_history(pattern, &similar)
        }
    }

    /// Validate a context change using the system clock.
    pub fn validate_context_change(&mut self, change: &ContextChange) -> ValidationResult {
        self.validate_context_change_at(change, Utc::now())
    }

    /// Validate a context change, including the switching-rate limit.
    pub fn validate_context_change_at(
        &mut self,
        change: &ContextChange,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        self.context_history.append(change.clone());
        self.evict_at(now);

        if change.confidence < self.config.min_confidence {
            return ValidationResult::rejected(
                change.confidence,
                "confidence",
                change.confidence,
                Anomaly::ContextChangeConfidenceTooLow,
            );
        }

        if change.change_duration < self.config.min_duration_secs {
            return ValidationResult::rejected(
                0.0,
                "duration",
                change.change_duration,
                Anomaly::ContextChangeDurationTooShort,
            );
        }

        let rate_window = secs_to_duration(self.config.context_rate_window_secs);
        let recent_changes = self.context_history.recent(rate_window, now).count();
        if recent_changes > self.config.max_context_changes {
            tracing::warn!(
                recent_changes,
                limit = self.config.max_context_changes,
                "context switching rate above limit"
            );
            return ValidationResult::rejected(
                0.0,
                "change_frequency",
                recent_changes as f64,
                Anomaly::TooManyContextChanges,
            );
        }

        let mut metrics = MetricMap::new();
        metrics.insert("duration".to_string(), change.change_duration);
        metrics.insert("change_frequency".to_string(), recent_changes as f64);

        ValidationResult {
            is_valid: true,
            confidence: change.confidence,
            metrics,
            anomalies: Vec::new(),
        }
    }

    /// Historical patterns of the same type whose intensity lies within the similarity band.
    ///
    /// Entries equal to the candidate itself are excluded.
    pub fn find_similar_patterns(&self, pattern: &ActivityPattern) -> Vec<&ActivityPattern> {
        self.pattern_history
            .iter()
            .filter(|p| {
                p.pattern_type == pattern.pattern_type
                    && (p.intensity - pattern.intensity).abs() < self.config.similarity_band
                    && *p != pattern
            })
            .collect()
    }

    /// Drop history entries older than the history window.
    pub fn evict_at(&mut self, now: DateTime<Utc>) {
        self.pattern_history.evict_expired(now);
        self.context_history.evict_expired(now);
    }

    pub fn pattern_history_len(&self) -> usize {
        self.pattern_history.len()
    }

    pub fn context_history_len(&self) -> usize {
        self.context_history.len()
    }

    /// Judge a pattern with no comparable history by its own metrics.
    fn validate_new_pattern(&self, pattern: &ActivityPattern) -> ValidationResult {
        let mut anomalies = Vec::new();

        if let Some(&consistency) = pattern.metrics.get("consistency") {
            if consistency < self.config.min_consistency {
                anomalies.push(Anomaly::LowInternalConsistency);
            }
        }

        if let Some(&burst_count) = pattern.metrics.get("burst_count") {
            if burst_count < self.config.min_burst_count {
                anomalies.push(Anomaly::InsufficientDataPoints);
            }
        }

        let penalty = anomalies.len() as f64 * self.config.anomaly_penalty;
        let confidence = clamp01(pattern.confidence - penalty);

        ValidationResult {
            is_valid: confidence >= self.config.min_confidence,
            confidence,
            metrics: pattern.metrics.clone(),
            anomalies,
        }
    }

    /// Compare every metric of the candidate with the similar patterns.
    ///
    /// A metric is unusual when `|current - mean| / variance` exceeds
    /// `max_variance`. Zero variance never flags.
    fn validate_against_history(
        &self,
        pattern: &ActivityPattern,
        similar: &[&ActivityPattern],
    ) -> ValidationResult {
        let mut anomalies = Vec::new();
        let mut metrics = pattern.metrics.clone();

        for (name, &current) in &pattern.metrics {
            let historical: Vec<f64> = similar
                .iter()
                .filter_map(|p| p.metrics.get(name).copied())
                .collect();
            let Some(avg) = mean(&historical) else {
                continue;
            };
            let var = sample_variance(&historical);

            if var > 0.0 && (current - avg).abs() / var > self.config.max_variance {
                anomalies.push(Anomaly::UnusualMetric(name.clone()));
            }

            metrics.insert(format!("avg_{name}"), avg);
            metrics.insert(format!("var_{name}"), var);
        }

        let boost = similar.len() as f64 * self.config.history_boost;
        let penalty = anomalies.len() as f64 * self.config.anomaly_penalty;
        let confidence = clamp01(pattern.confidence + boost - penalty);

        if !anomalies.is_empty() {
            tracing::warn!(
                pattern_type = %pattern.pattern_type,
                anomalies = anomalies.len(),
                "pattern deviates from history"
            );
        }

        ValidationResult {
            is_valid: confidence >= self.config.min_confidence && anomalies.is_empty(),
            confidence,
            metrics,
            anomalies,
        }
    }
}

impl Default for PatternValidator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Context, PatternType};
    use chrono::Duration;

    fn default_metrics(avg_speed: f64) -> MetricMap {
        MetricMap::from([
            ("consistency".to_string(), 0.8),
            ("burst_count".to_string(), 3.0),
            ("avg_speed".to_string(), avg_speed),
        ])
    }

    fn pattern(
        pattern_type: PatternType,
        start: DateTime<Utc>,
        duration_secs: i64,
        intensity: f64,
        metrics: MetricMap,
    ) -> ActivityPattern {
        ActivityPattern::new(
            pattern_type,
            start,
            start + Duration::seconds(duration_secs),
            intensity,
            0.7,
            metrics,
        )
    }

    fn change(at: DateTime<Utc>, duration: f64, confidence: f64) -> ContextChange {
        ContextChange::new(at, Context::Focused, Context::Switching, duration, confidence)
    }

    #[test]
    fn test_new_pattern_validated_on_internal_metrics() {
        let now = Utc::now();
        let mut validator = PatternValidator::with_defaults();

        let result = validator.validate_activity_pattern_at(
            &pattern(
                PatternType::Typing,
                now - Duration::seconds(10),
                5,
                0.8,
                default_metrics(60.0),
            ),
            now,
        );

        assert!(result.is_valid);
        assert!((result.confidence - 0.7).abs() < 1e-9);
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn test_short_pattern_rejected() {
        let now = Utc::now();
        let mut validator = PatternValidator::with_defaults();
        let short = ActivityPattern::new(
            PatternType::Typing,
            now,
            now + Duration::milliseconds(500),
            0.8,
            0.9,
            default_metrics(60.0),
        );

        let result = validator.validate_activity_pattern_at(&short, now);

        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.anomalies, vec![Anomaly::PatternDurationTooShort]);
        assert_eq!(result.anomalies[0].to_string(), "Pattern duration too short");
        assert_eq!(result.metrics["duration"], 0.5);
    }

    #[test]
    fn test_low_confidence_pattern_rejected() {
        let now = Utc::now();
        let mut validator = PatternValidator::with_defaults();
        let weak = ActivityPattern::new(
            PatternType::Tool,
            now - Duration::seconds(5),
            now,
            0.4,
            0.3,
            MetricMap::new(),
        );

        let result = validator.validate_activity_pattern_at(&weak, now);

        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.3);
        assert!(result.has_anomaly(&Anomaly::PatternConfidenceTooLow));
    }

    #[test]
    fn test_internal_anomalies_penalize_confidence() {
        let now = Utc::now();
        let mut validator = PatternValidator::with_defaults();
        let metrics = MetricMap::from([
            ("consistency".to_string(), 0.2),
            ("burst_count".to_string(), 1.0),
        ]);

        let result = validator.validate_activity_pattern_at(
            &pattern(PatternType::Typing, now - Duration::seconds(5), 5, 0.8, metrics),
            now,
        );

        assert!(!result.is_valid);
        assert!((result.confidence - 0.3).abs() < 1e-9);
        assert_eq!(
            result.anomalies,
            vec![
                Anomaly::LowInternalConsistency,
                Anomaly::InsufficientDataPoints
            ]
        );
    }

    #[test]
    fn test_history_boost_and_unusual_metrics() {
        let now = Utc::now();
        let mut validator = PatternValidator::with_defaults();

        for i in 0..3 {
            validator.validate_activity_pattern_at(
                &pattern(
                    PatternType::Typing,
                    now - Duration::minutes(i + 1),
                    5,
                    0.8,
                    default_metrics(60.0 + i as f64),
                ),
                now,
            );
        }

        let mut similar_metrics = default_metrics(62.0);
        similar_metrics.insert("consistency".to_string(), 0.75);
        let result = validator.validate_activity_pattern_at(
            &pattern(PatternType::Typing, now, 5, 0.8, similar_metrics),
            now,
        );

        assert!(result.is_valid);
        assert!(result.confidence > 0.7);
        assert!(result.anomalies.is_empty());
        assert!((result.metrics["avg_avg_speed"] - 61.0).abs() < 1e-9);
        assert!((result.metrics["var_avg_speed"] - 1.0).abs() < 1e-9);

        let anomalous = MetricMap::from([
            ("consistency".to_string(), 0.2),
            ("burst_count".to_string(), 3.0),
            ("avg_speed".to_string(), 120.0),
        ]);
        let result = validator.validate_activity_pattern_at(
            &pattern(PatternType::Typing, now, 5, 0.8, anomalous),
            now,
        );

        assert!(!result.is_valid);
        assert!(result.has_anomaly(&Anomaly::UnusualMetric("consistency".to_string())));
    }

    #[test]
    fn test_history_confidence_is_clamped() {
        let now = Utc::now();
        let mut validator = PatternValidator::with_defaults();

        for i in 0..8 {
            validator.validate_activity_pattern_at(
                &pattern(
                    PatternType::Tool,
                    now - Duration::seconds(60 * (i + 1)),
                    5,
                    0.5,
                    MetricMap::from([("switch_count".to_string(), 4.0)]),
                ),
                now,
            );
        }

        let result = validator.validate_activity_pattern_at(
            &pattern(
                PatternType::Tool,
                now,
                5,
                0.5,
                MetricMap::from([("switch_count".to_string(), 4.0)]),
            ),
            now,
        );

        assert!(result.is_valid);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.metrics["var_switch_count"], 0.0);
    }

    #[test]
    fn test_similar_pattern_lookup() {
        let now = Utc::now();
        let mut validator = PatternValidator::with_defaults();
        let base = pattern(PatternType::Typing, now, 5, 0.8, default_metrics(60.0));

        let history = [
            pattern(
                PatternType::Typing,
                now - Duration::minutes(1),
                5,
                0.75,
                default_metrics(60.0),
            ),
            pattern(
                PatternType::Tool,
                now - Duration::minutes(2),
                5,
                0.8,
                default_metrics(60.0),
            ),
            pattern(
                PatternType::Typing,
                now - Duration::minutes(3),
                5,
                0.3,
                default_metrics(60.0),
            ),
        ];
        for p in &history {
            validator.validate_activity_pattern_at(p, now);
        }

        let similar = validator.find_similar_patterns(&base);
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].pattern_type, PatternType::Typing);
        assert!((similar[0].intensity - base.intensity).abs() < 0.2);
    }

    #[test]
    fn test_valid_context_change() {
        let now = Utc::now();
        let mut validator = PatternValidator::with_defaults();

        let result = validator.validate_context_change_at(&change(now, 2.0, 0.8), now);

        assert!(result.is_valid);
        assert_eq!(result.confidence, 0.8);
        assert!(result.anomalies.is_empty());
        assert_eq!(result.metrics["change_frequency"], 1.0);
    }

    #[test]
    fn test_context_change_gates() {
        let now = Utc::now();
        let mut validator = PatternValidator::with_defaults();

        let weak = validator.validate_context_change_at(&change(now, 2.0, 0.2), now);
        assert_eq!(weak.anomalies, vec![Anomaly::ContextChangeConfidenceTooLow]);
        assert_eq!(weak.confidence, 0.2);

        let brief = validator.validate_context_change_at(&change(now, 0.5, 0.8), now);
        assert_eq!(brief.anomalies, vec![Anomaly::ContextChangeDurationTooShort]);
        assert_eq!(brief.confidence, 0.0);
    }

    #[test]
    fn test_too_many_context_changes() {
        let now = Utc::now();
        let mut validator = PatternValidator::with_defaults();

        let results: Vec<_> = (0..6)
            .map(|i| {
                validator.validate_context_change_at(
                    &change(now - Duration::seconds(50 - i * 10), 2.0, 0.7),
                    now,
                )
            })
            .collect();

        assert!(results[..5].iter().all(|r| r.is_valid));
        let last = &results[5];
        assert!(!last.is_valid);
        assert_eq!(last.confidence, 0.0);
        assert_eq!(last.anomalies, vec![Anomaly::TooManyContextChanges]);
        assert_eq!(last.anomalies[0].to_string(), "Too many context changes");
    }

    #[test]
    fn test_history_cleanup() {
        let now = Utc::now();
        let old = now - Duration::minutes(40);
        let mut validator = PatternValidator::with_defaults();

        validator.validate_activity_pattern_at(
            &pattern(PatternType::Typing, old, 5, 0.8, default_metrics(60.0)),
            now,
        );
        validator.validate_activity_pattern_at(
            &pattern(PatternType::Typing, now, 5, 0.8, default_metrics(60.0)),
            now,
        );
        validator.validate_context_change_at(&change(old, 2.0, 0.7), now);
        validator.validate_context_change_at(&change(now, 2.0, 0.7), now);

        assert_eq!(validator.pattern_history_len(), 1);
        assert_eq!(validator.context_history_len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ValidatorConfig {
            max_variance: -1.0,
            ..Default::default()
        };
        assert!(PatternValidator::new(config).is_err());
    }
}
