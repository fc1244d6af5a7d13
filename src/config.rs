//! Configuration for the pattern engine.
//!
//! Every component takes its own section at construction time. Sections are
//! validated eagerly and are immutable once a component has been built.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the engine and CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segmenter: SegmenterConfig,
    pub recognizer: RecognizerConfig,
    pub validator: ValidatorConfig,
    pub engine: EngineConfig,

    /// Directory for persisted processing statistics
    pub data_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults when absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-pattern-engine")
            .join("config.json")
    }

    /// Directory used for persisted statistics.
    pub fn data_dir(&self) -> PathBuf {
        self.data_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("synheart-pattern-engine")
        })
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.segmenter.validate()?;
        self.recognizer.validate()?;
        self.validator.validate()?;
        self.engine.validate()
    }
}

/// Burst segmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Inter-key gap (seconds) that terminates a burst
    pub pause_threshold_secs: f64,
    /// How long closed bursts and pauses are retained (seconds)
    pub history_window_secs: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            pause_threshold_secs: 2.0,
            history_window_secs: 300.0,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_window("segmenter.pause_threshold_secs", self.pause_threshold_secs)?;
        require_window("segmenter.history_window_secs", self.history_window_secs)
    }
}

/// Pattern recognition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub typing_window_secs: f64,
    pub activity_window_secs: f64,
    /// Retention for emitted patterns and context changes
    pub pattern_window_secs: f64,
    /// Confidence given to a typing pattern built from a single sample
    pub default_typing_confidence: f64,
    /// Fixed confidence of a detected tool pattern
    pub tool_pattern_confidence: f64,
    /// Tool switch count at which context change confidence saturates
    pub context_switch_saturation: f64,
    /// Tool switch count at which tool pattern intensity saturates
    pub tool_switch_saturation: f64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            typing_window_secs: 300.0,
            activity_window_secs: 300.0,
            pattern_window_secs: 300.0,
            default_typing_confidence: 0.5,
            tool_pattern_confidence: 0.8,
            context_switch_saturation: 5.0,
            tool_switch_saturation: 10.0,
        }
    }
}

impl RecognizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_window("recognizer.typing_window_secs", self.typing_window_secs)?;
        require_window("recognizer.activity_window_secs", self.activity_window_secs)?;
        require_window("recognizer.pattern_window_secs", self.pattern_window_secs)?;
        require_unit(
            "recognizer.default_typing_confidence",
            self.default_typing_confidence,
        )?;
        require_unit(
            "recognizer.tool_pattern_confidence",
            self.tool_pattern_confidence,
        )?;
        require_positive(
            "recognizer.context_switch_saturation",
            self.context_switch_saturation,
        )?;
        require_positive(
            "recognizer.tool_switch_saturation",
            self.tool_switch_saturation,
        )
    }
}

/// Pattern validation thresholds.
///
/// These are the tunable decision boundaries of the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub min_confidence: f64,
    pub min_duration_secs: f64,
    /// Limit on `|current - mean| / variance` before a metric is flagged
    pub max_variance: f64,
    pub history_window_secs: f64,
    /// Maximum intensity difference for two patterns to count as similar
    pub similarity_band: f64,
    /// Confidence added per similar historical pattern
    pub history_boost: f64,
    /// Confidence removed per detected anomaly
    pub anomaly_penalty: f64,
    /// Context changes tolerated inside the rate window
    pub max_context_changes: usize,
    pub context_rate_window_secs: f64,
    /// Below this `consistency` a new pattern is flagged
    pub min_consistency: f64,
    /// Below this `burst_count` a new pattern is flagged
    pub min_burst_count: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_duration_secs: 1.0,
            max_variance: 100.0,
            history_window_secs: 1800.0,
            similarity_band: 0.2,
            history_boost: 0.1,
            anomaly_penalty: 0.2,
            max_context_changes: 5,
            context_rate_window_secs: 60.0,
            min_consistency: 0.3,
            min_burst_count: 2.0,
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_unit("validator.min_confidence", self.min_confidence)?;
        require_non_negative("validator.min_duration_secs", self.min_duration_secs)?;
        require_positive("validator.max_variance", self.max_variance)?;
        require_window("validator.history_window_secs", self.history_window_secs)?;
        require_unit("validator.similarity_band", self.similarity_band)?;
        require_non_negative("validator.history_boost", self.history_boost)?;
        require_non_negative("validator.anomaly_penalty", self.anomaly_penalty)?;
        require_window(
            "validator.context_rate_window_secs",
            self.context_rate_window_secs,
        )?;
        require_unit("validator.min_consistency", self.min_consistency)?;
        require_non_negative("validator.min_burst_count", self.min_burst_count)
    }
}

/// Where the engine takes "now" from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSource {
    /// System clock
    #[default]
    Wall,
    /// Latest event timestamp seen, for replaying recorded sessions
    Event,
}

/// Worker and pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the bounded capture queue
    pub queue_capacity: usize,
    /// How often the worker runs eviction and idle flush when no input arrives
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,
    pub time_source: TimeSource,
    /// Lookback used when deriving a typing sample from recent bursts
    pub typing_summary_window_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            tick_interval: Duration::from_millis(1000),
            time_source: TimeSource::Wall,
            typing_summary_window_secs: 300.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "engine.queue_capacity",
                "must be greater than zero",
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::invalid(
                "engine.tick_interval",
                "must be greater than zero",
            ));
        }
        require_window(
            "engine.typing_summary_window_secs",
            self.typing_summary_window_secs,
        )
    }
}

/// Convert fractional seconds into a chrono duration (millisecond precision).
pub fn secs_to_duration(secs: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
}

/// Longest accepted window or threshold, in seconds (ten years).
pub const MAX_WINDOW_SECS: f64 = 315_360_000.0;

fn require_window(field: &'static str, value: f64) -> Result<(), ConfigError> {
    require_positive(field, value)?;
    if value <= MAX_WINDOW_SECS {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be at most {MAX_WINDOW_SECS} seconds, got {value}"),
        ))
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be a finite value greater than zero, got {value}"),
        ))
    }
}

fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be a finite non-negative value, got {value}"),
        ))
    }
}

fn require_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be within [0, 1], got {value}"),
        ))
    }
}

/// Serde support for Duration as milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
