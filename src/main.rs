//! Synheart Pattern Engine CLI
//!
//! Replays recorded sensor events through the pattern pipeline.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use synheart_pattern_engine::{
    collector::{EventChannel, EventSender, SensorEvent},
    config::{Config, TimeSource},
    engine::{Engine, EngineWorker},
    stats::{create_shared_log_with_persistence, read_persisted, Counter, SharedProcessingLog},
    VERSION,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const STATS_FILE: &str = "processing.json";

#[derive(Parser)]
#[command(name = "synheart-patterns")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Behavioral pattern recognition over keystroke and activity telemetry", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay JSONL sensor events and write JSONL results
    Replay {
        /// Input file, or `-` for stdin
        #[arg(long, short, default_value = "-")]
        input: String,

        /// Output file (defaults to stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Use the system clock instead of recorded event timestamps
        #[arg(long)]
        wall_clock: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },

    /// Show cumulative processing statistics
    Status,
}

fn main() -> Result<()> {
    // stdout carries results, so logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path:?}"))?;

    match cli.command {
        Commands::Replay {
            input,
            output,
            wall_clock,
        } => cmd_replay(config, &input, output.as_deref(), wall_clock),
        Commands::Config { save } => cmd_config(&config, &config_path, save),
        Commands::Status => cmd_status(&config),
    }
}

fn cmd_replay(
    mut config: Config,
    input: &str,
    output: Option<&Path>,
    wall_clock: bool,
) -> Result<()> {
    if !wall_clock {
        config.engine.time_source = TimeSource::Event;
    }

    let reader: Box<dyn BufRead + Send> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(input).with_context(|| format!("failed to open {input}"))?;
        Box::new(BufReader::new(file))
    };

    let mut writer: Box<dyn Write> = match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("failed to create {path:?}"))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let stats = create_shared_log_with_persistence(config.data_dir().join(STATS_FILE));
    let engine = Engine::new(&config)?.with_stats(stats.clone());
    tracing::info!(session_id = %engine.session_id(), "replaying sensor events");

    let (sender, receiver) = EventChannel::new(config.engine.queue_capacity).into_parts();
    let worker = EngineWorker::spawn(engine, receiver).context("failed to start engine worker")?;
    ctrlc_handler(worker.running_flag())?;

    let feeder = {
        let stats = stats.clone();
        thread::Builder::new()
            .name("event-reader".to_string())
            .spawn(move || feed_events(reader, sender, &stats))
            .context("failed to start input reader")?
    };

    let mut written = 0usize;
    for result in worker.outputs().iter() {
        write_output(&mut writer, &result)?;
        written += 1;
    }

    let (_engine, remaining) = worker
        .join()
        .map_err(|_| anyhow!("engine worker panicked"))?;
    for result in &remaining {
        write_output(&mut writer, result)?;
        written += 1;
    }
    writer.flush()?;

    match feeder.join() {
        Ok(fed) => tracing::info!(events = fed, results = written, "replay finished"),
        Err(_) => tracing::error!("input reader panicked"),
    }

    if let Err(e) = stats.save() {
        tracing::warn!(error = %e, "could not save processing stats");
    }

    eprintln!();
    eprintln!("{}", stats.summary());
    Ok(())
}

/// Push every parseable line into the capture channel. Returns the number sent.
fn feed_events(reader: impl BufRead, sender: EventSender, stats: &SharedProcessingLog) -> usize {
    let mut sent = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "failed to read input");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<SensorEvent>(&line) {
            Ok(event) => {
                if sender.send(event).is_err() {
                    // Worker stopped (e.g. Ctrl+C)
                    break;
                }
                sent += 1;
            }
            Err(e) => {
                stats.record(Counter::MalformedDropped);
                tracing::warn!(line = index + 1, error = %e, "skipping malformed input line");
            }
        }
    }

    sent
}

fn write_output(writer: &mut dyn Write, output: &impl serde::Serialize) -> Result<()> {
    serde_json::to_writer(&mut *writer, output)?;
    writeln!(writer)?;
    Ok(())
}

fn cmd_config(config: &Config, path: &Path, save: bool) -> Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {path:?}");
    println!("Data directory: {:?}", config.data_dir());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        config
            .save_to(path)
            .with_context(|| format!("failed to save configuration to {path:?}"))?;
        println!();
        println!("Saved configuration to {path:?}");
    }
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Synheart Pattern Engine Status");
    println!("==============================");
    println!();
    println!("Configuration:");
    println!("  Pause threshold: {}s", config.segmenter.pause_threshold_secs);
    println!("  Validator history: {}s", config.validator.history_window_secs);
    println!("  Min confidence: {}", config.validator.min_confidence);
    println!();

    let stats_path = config.data_dir().join(STATS_FILE);
    if stats_path.exists() {
        let stats = read_persisted(&stats_path)
            .with_context(|| format!("failed to read {stats_path:?}"))?;
        println!("Cumulative {}", stats.summary());
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")
}
