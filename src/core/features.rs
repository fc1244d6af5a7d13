//! Feature computation over keystrokes and closed bursts.
//!
//! All values are derived from timing only. Degenerate inputs (too few
//! samples, zero elapsed time) yield `None` rather than an error.

use crate::core::types::{elapsed_secs, KeyStroke, PauseInterval, TypingBurst, TypingPattern};
use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;

/// Fewest keystrokes that can form a burst.
pub const MIN_BURST_KEYSTROKES: usize = 2;

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().mean())
    }
}

/// Sample variance (n - 1 denominator), 0 when fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().variance()
}

/// Summarize a closed run of keystrokes into a burst.
///
/// Returns `None` when the run has fewer than two keystrokes or spans no time.
pub fn analyze_burst(keystrokes: Vec<KeyStroke>) -> Option<TypingBurst> {
    if keystrokes.len() < MIN_BURST_KEYSTROKES {
        return None;
    }

    let start_time = keystrokes.first()?.timestamp;
    let end_time = keystrokes.last()?.timestamp;
    let duration_secs = elapsed_secs(end_time - start_time);
    if duration_secs <= 0.0 {
        return None;
    }

    let chars_per_minute = (keystrokes.len() as f64 / duration_secs) * 60.0;
    let holds: Vec<f64> = keystrokes.iter().map(|k| k.duration).collect();
    let average_keystroke_duration = mean(&holds)?;

    Some(TypingBurst {
        keystrokes,
        start_time,
        end_time,
        chars_per_minute,
        average_keystroke_duration,
    })
}

/// Derive a typing sample from recent bursts and the pauses between them.
///
/// Returns `None` when there are no bursts.
pub fn summarize_typing<'a>(
    bursts: impl IntoIterator<Item = &'a TypingBurst>,
    pauses: impl IntoIterator<Item = &'a PauseInterval>,
    timestamp: DateTime<Utc>,
) -> Option<TypingPattern> {
    let (speeds, durations): (Vec<f64>, Vec<f64>) = bursts
        .into_iter()
        .map(|b| (b.chars_per_minute, b.duration_secs()))
        .unzip();

    let avg_speed = mean(&speeds)?;
    let burst_duration = mean(&durations).unwrap_or(0.0);

    let pause_secs: Vec<f64> = pauses.into_iter().map(|p| p.duration_secs()).collect();
    let pause_duration = mean(&pause_secs).unwrap_or(0.0);

    Some(TypingPattern {
        avg_speed,
        burst_duration,
        pause_duration,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn keystrokes(base: DateTime<Utc>, count: usize, interval_ms: i64) -> Vec<KeyStroke> {
        (0..count)
            .map(|i| KeyStroke {
                key: ((b'a' + (i % 26) as u8) as char).to_string(),
                timestamp: base + Duration::milliseconds(i as i64 * interval_ms),
                duration: 0.05,
            })
            .collect()
    }

    #[test]
    fn test_analyze_burst_speed() {
        let base = Utc::now();
        let burst = analyze_burst(keystrokes(base, 5, 100)).unwrap();

        // 5 keystrokes over 0.4s
        assert!((burst.chars_per_minute - 750.0).abs() < 1e-9);
        assert!((burst.average_keystroke_duration - 0.05).abs() < 1e-9);
        assert_eq!(burst.start_time, base);
        assert_eq!(burst.end_time, base + Duration::milliseconds(400));
    }

    #[test]
    fn test_analyze_burst_rejects_degenerate_runs() {
        let base = Utc::now();
        assert!(analyze_burst(Vec::new()).is_none());
        assert!(analyze_burst(keystrokes(base, 1, 100)).is_none());
        assert!(analyze_burst(keystrokes(base, 3, 0)).is_none());
    }

    #[test]
    fn test_analyze_burst_keeps_sub_millisecond_spans() {
        let base = Utc::now();
        let run = vec![
            KeyStroke {
                key: "a".to_string(),
                timestamp: base,
                duration: 0.0004,
            },
            KeyStroke {
                key: "b".to_string(),
                timestamp: base + Duration::microseconds(900),
                duration: 0.0004,
            },
        ];

        let burst = analyze_burst(run).unwrap();
        assert!((burst.duration_secs() - 0.0009).abs() < 1e-12);
        assert!((burst.chars_per_minute - 2.0 / 0.0009 * 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_sample_variance() {
        assert_eq!(sample_variance(&[60.0]), 0.0);
        assert!((sample_variance(&[60.0, 65.0, 55.0]) - 25.0).abs() < 1e-9);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_summarize_typing() {
        let base = Utc::now();
        let first = analyze_burst(keystrokes(base, 3, 500)).unwrap();
        let second = analyze_burst(keystrokes(base + Duration::seconds(4), 5, 250)).unwrap();
        let pause = PauseInterval {
            start: base + Duration::seconds(1),
            end: base + Duration::seconds(4),
        };

        let summary = summarize_typing([&first, &second], [&pause], base).unwrap();

        assert!((summary.avg_speed - (180.0 + 300.0) / 2.0).abs() < 1e-9);
        assert!((summary.burst_duration - 1.0).abs() < 1e-9);
        assert!((summary.pause_duration - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_typing_without_bursts() {
        let none: [&TypingBurst; 0] = [];
        let no_pauses: [&PauseInterval; 0] = [];
        assert!(summarize_typing(none, no_pauses, Utc::now()).is_none());
    }
}
