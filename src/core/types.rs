//! Entities produced and consumed by the analysis pipeline.

use crate::core::windowing::Timestamped;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named numeric metrics attached to patterns and verdicts.
pub type MetricMap = BTreeMap<String, f64>;

/// Fractional seconds in `duration`, at microsecond precision.
pub fn elapsed_secs(duration: Duration) -> f64 {
    match duration.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => duration.num_milliseconds() as f64 / 1000.0,
    }
}

/// Clamp to [0, 1], mapping NaN to 0.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// A completed key hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStroke {
    pub key: String,
    /// When the key went down
    pub timestamp: DateTime<Utc>,
    /// Hold duration in seconds
    pub duration: f64,
}

impl Timestamped for KeyStroke {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A maximal run of keystrokes with no internal gap at or above the pause threshold.
///
/// Only built by the segmenter, which guarantees at least two keystrokes
/// and a positive elapsed time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingBurst {
    pub keystrokes: Vec<KeyStroke>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub chars_per_minute: f64,
    /// Mean hold duration in seconds
    pub average_keystroke_duration: f64,
}

impl TypingBurst {
    pub fn duration_secs(&self) -> f64 {
        elapsed_secs(self.end_time - self.start_time)
    }

    pub fn keystroke_count(&self) -> usize {
        self.keystrokes.len()
    }
}

impl Timestamped for TypingBurst {
    fn timestamp(&self) -> DateTime<Utc> {
        self.end_time
    }
}

/// The gap that terminated a burst, kept as one paired record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PauseInterval {
    pub fn duration_secs(&self) -> f64 {
        elapsed_secs(self.end - self.start)
    }
}

impl Timestamped for PauseInterval {
    fn timestamp(&self) -> DateTime<Utc> {
        self.end
    }
}

/// A summarized sample of recent typing behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingPattern {
    /// Characters per minute
    pub avg_speed: f64,
    /// Seconds
    pub burst_duration: f64,
    /// Seconds
    pub pause_duration: f64,
    pub timestamp: DateTime<Utc>,
}

impl TypingPattern {
    pub fn new(avg_speed: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            avg_speed,
            burst_duration: 0.0,
            pause_duration: 0.0,
            timestamp,
        }
    }
}

impl Timestamped for TypingPattern {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Kind of a detected activity pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Typing,
    Tool,
    Focus,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternType::Typing => write!(f, "typing"),
            PatternType::Tool => write!(f, "tool"),
            PatternType::Focus => write!(f, "focus"),
        }
    }
}

/// A detected higher-level activity pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPattern {
    pub pattern_type: PatternType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// 0.0 to 1.0
    pub intensity: f64,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub metrics: MetricMap,
}

impl ActivityPattern {
    /// Build a pattern, clamping scores to [0, 1] and ordering the time span.
    pub fn new(
        pattern_type: PatternType,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        intensity: f64,
        confidence: f64,
        metrics: MetricMap,
    ) -> Self {
        Self {
            pattern_type,
            start_time: start_time.min(end_time),
            end_time: start_time.max(end_time),
            intensity: clamp01(intensity),
            confidence: clamp01(confidence),
            metrics,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        elapsed_secs(self.end_time - self.start_time)
    }
}

impl Timestamped for ActivityPattern {
    fn timestamp(&self) -> DateTime<Utc> {
        self.end_time
    }
}

/// Behavioral context labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Context {
    Focused,
    Switching,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::Focused => write!(f, "focused"),
            Context::Switching => write!(f, "switching"),
        }
    }
}

/// A detected switch between behavioral contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChange {
    pub timestamp: DateTime<Utc>,
    pub from_context: Context,
    pub to_context: Context,
    /// Seconds
    pub change_duration: f64,
    /// 0.0 to 1.0
    pub confidence: f64,
}

impl ContextChange {
    pub fn new(
        timestamp: DateTime<Utc>,
        from_context: Context,
        to_context: Context,
        change_duration: f64,
        confidence: f64,
    ) -> Self {
        Self {
            timestamp,
            from_context,
            to_context,
            change_duration,
            confidence: clamp01(confidence),
        }
    }
}

impl Timestamped for ContextChange {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A named deviation that lowers or zeroes validation confidence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Anomaly {
    PatternDurationTooShort,
    PatternConfidenceTooLow,
    LowInternalConsistency,
    InsufficientDataPoints,
    UnusualMetric(String),
    ContextChangeConfidenceTooLow,
    ContextChangeDurationTooShort,
    TooManyContextChanges,
    Other(String),
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::PatternDurationTooShort => write!(f, "Pattern duration too short"),
            Anomaly::PatternConfidenceTooLow => write!(f, "Pattern confidence too low"),
            Anomaly::LowInternalConsistency => write!(f, "Low internal consistency"),
            Anomaly::InsufficientDataPoints => write!(f, "Insufficient data points"),
            Anomaly::UnusualMetric(metric) => write!(f, "Unusual {metric} value"),
            Anomaly::ContextChangeConfidenceTooLow => {
                write!(f, "Context change confidence too low")
            }
            Anomaly::ContextChangeDurationTooShort => {
                write!(f, "Context change duration too short")
            }
            Anomaly::TooManyContextChanges => write!(f, "Too many context changes"),
            Anomaly::Other(label) => write!(f, "{label}"),
        }
    }
}

impl From<Anomaly> for String {
    fn from(anomaly: Anomaly) -> Self {
        anomaly.to_string()
    }
}

impl From<String> for Anomaly {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Pattern duration too short" => Anomaly::PatternDurationTooShort,
            "Pattern confidence too low" => Anomaly::PatternConfidenceTooLow,
            "Low internal consistency" => Anomaly::LowInternalConsistency,
            "Insufficient data points" => Anomaly::InsufficientDataPoints,
            "Context change confidence too low" => Anomaly::ContextChangeConfidenceTooLow,
            "Context change duration too short" => Anomaly::ContextChangeDurationTooShort,
            "Too many context changes" => Anomaly::TooManyContextChanges,
            _ => match label
                .strip_prefix("Unusual ")
                .and_then(|rest| rest.strip_suffix(" value"))
            {
                Some(metric) => Anomaly::UnusualMetric(metric.to_string()),
                None => Anomaly::Other(label),
            },
        }
    }
}

/// Verdict on a pattern or context change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub metrics: MetricMap,
    pub anomalies: Vec<Anomaly>,
}

impl ValidationResult {
    /// A negative verdict carrying a single anomaly and one metric.
    pub fn rejected(confidence: f64, metric: &str, value: f64, anomaly: Anomaly) -> Self {
        let mut metrics = MetricMap::new();
        metrics.insert(metric.to_string(), value);
        Self {
            is_valid: false,
            confidence: clamp01(confidence),
            metrics,
            anomalies: vec![anomaly],
        }
    }

    pub fn has_anomaly(&self, anomaly: &Anomaly) -> bool {
        self.anomalies.contains(anomaly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_elapsed_secs_precision() {
        assert_eq!(elapsed_secs(Duration::microseconds(900)), 0.0009);
        assert_eq!(elapsed_secs(Duration::milliseconds(1500)), 1.5);
        assert!(elapsed_secs(Duration::MAX) > 0.0);
    }

    #[test]
    fn test_activity_pattern_invariants() {
        let now = Utc::now();
        let pattern = ActivityPattern::new(
            PatternType::Tool,
            now,
            now - Duration::seconds(5),
            1.7,
            -0.2,
            MetricMap::new(),
        );

        assert!(pattern.start_time <= pattern.end_time);
        assert_eq!(pattern.intensity, 1.0);
        assert_eq!(pattern.confidence, 0.0);
        assert_eq!(pattern.duration_secs(), 5.0);
    }

    #[test]
    fn test_clamp01_nan() {
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(0.25), 0.25);
    }

    #[test]
    fn test_anomaly_labels_roundtrip() {
        let unusual = Anomaly::UnusualMetric("avg_speed".to_string());
        assert_eq!(unusual.to_string(), "Unusual avg_speed value");
        assert_eq!(Anomaly::from(unusual.to_string()), unusual);
        assert_eq!(
            Anomaly::from("Too many context changes".to_string()),
            Anomaly::TooManyContextChanges
        );

        let json = serde_json::to_string(&vec![Anomaly::PatternDurationTooShort]).unwrap();
        assert_eq!(json, r#"["Pattern duration too short"]"#);
    }

    #[test]
    fn test_pattern_type_serialization() {
        assert_eq!(
            serde_json::to_string(&PatternType::Typing).unwrap(),
            r#""typing""#
        );
        assert_eq!(Context::Switching.to_string(), "switching");
    }
}
