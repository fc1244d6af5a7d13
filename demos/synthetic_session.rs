//! Demonstration of the Synheart Pattern Engine on a synthetic session.
//!
//! This example shows how to:
//! 1. Start an engine worker behind the capture channel
//! 2. Push key events and activity samples from two producer threads
//! 3. Receive bursts, patterns and context changes with their validation
//!
//! Run with: cargo run --example synthetic_session

use chrono::{Duration, Utc};
use std::thread;

use synheart_pattern_engine::{
    collector::{ActivityMetric, EventChannel, KeyEvent},
    config::{Config, TimeSource},
    engine::{Engine, EngineEvent, EngineWorker},
};

fn main() {
    println!("Synheart Pattern Engine - Synthetic Session");
    println!("===========================================");
    println!();

    let mut config = Config::default();
    config.engine.time_source = TimeSource::Event;

    let engine = match Engine::new(&config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return;
        }
    };
    println!("Session ID: {}", engine.session_id());
    println!();

    let (sender, receiver) = EventChannel::new(config.engine.queue_capacity).into_parts();
    let worker = match EngineWorker::spawn(engine, receiver) {
        Ok(worker) => worker,
        Err(e) => {
            eprintln!("Error starting worker: {e}");
            return;
        }
    };

    let start = Utc::now();

    // Three sentences typed at different speeds, separated by pauses
    let keys = sender.clone();
    let typist = thread::spawn(move || {
        let sentences = [("the quick brown fox", 110), ("jumps over", 180), ("the lazy dog", 140)];
        let mut at = start;
        for (text, gap_ms) in sentences {
            for c in text.chars().filter(|c| !c.is_whitespace()) {
                let key = c.to_string();
                let _ = keys.send(KeyEvent::press(key.clone(), at));
                let _ = keys.send(KeyEvent::release(key, at + Duration::milliseconds(80)));
                at += Duration::milliseconds(gap_ms);
            }
            at += Duration::seconds(4);
        }
    });

    // One activity sample per 5 seconds; focus breaks down halfway through
    let metrics = sender;
    let sampler = thread::spawn(move || {
        let samples = [(60.0, 300.0, 1), (55.0, 305.0, 1), (30.0, 40.0, 3), (45.0, 20.0, 6)];
        for (i, (speed, focus, switches)) in samples.into_iter().enumerate() {
            let at = start + Duration::seconds(5 * i as i64);
            let _ = metrics.send(ActivityMetric::new(speed, focus, switches, at));
        }
    });

    let _ = typist.join();
    let _ = sampler.join();

    for output in worker.outputs().iter() {
        let offset = (output.emitted_at - start).num_milliseconds() as f64 / 1000.0;
        match output.event {
            EngineEvent::Burst(burst) => println!(
                "[+{offset:>6.2}s] burst: {} keys, {:.0} cpm",
                burst.keystroke_count(),
                burst.chars_per_minute
            ),
            EngineEvent::Pattern {
                pattern,
                validation,
            } => println!(
                "[+{offset:>6.2}s] {} pattern: intensity {:.2}, confidence {:.2} -> {}",
                pattern.pattern_type,
                pattern.intensity,
                validation.confidence,
                verdict(validation.is_valid, &validation.anomalies)
            ),
            EngineEvent::ContextChange { change, validation } => println!(
                "[+{offset:>6.2}s] context {} -> {} after {:.0}s -> {}",
                change.from_context,
                change.to_context,
                change.change_duration,
                verdict(validation.is_valid, &validation.anomalies)
            ),
        }
    }

    match worker.join() {
        Ok((engine, _)) => {
            println!();
            println!("{}", engine.stats().summary());
        }
        Err(_) => eprintln!("Engine worker panicked"),
    }
}

fn verdict(is_valid: bool, anomalies: &[synheart_pattern_engine::core::Anomaly]) -> String {
    if is_valid {
        "valid".to_string()
    } else {
        let labels: Vec<String> = anomalies.iter().map(ToString::to_string).collect();
        format!("rejected ({})", labels.join(", "))
    }
}
