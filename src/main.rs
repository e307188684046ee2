use background_location_transmitter::{
    LocationSample, PluginOptions, ReplaySource, TrackingManager, TransmissionConfig,
};
use clap::Parser;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "blt-replay")]
#[command(about = "Replay recorded location samples through the transmission pipeline")]
struct Cli {
    /// JSON array of samples (latitude, longitude, speed, accuracy, timestamp)
    #[arg(long)]
    samples: PathBuf,

    /// JSON file with startTracking arguments (url, headers, body, method, interval, debug)
    #[arg(long)]
    config: PathBuf,

    /// Delay between replayed samples
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Stamp samples with the current time instead of their recorded time
    #[arg(long)]
    restamp: bool,

    /// Directory for the persisted service state
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Print every listener event to stdout
    #[arg(long)]
    print_events: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let samples = match read_samples(&cli.samples) {
        Ok(samples) => samples,
        Err(e) => {
            eprintln!("Error reading samples: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match TransmissionConfig::from_file(&cli.config) {
        Ok(config) => println!(
            "Target: {} {} (min interval {}ms)",
            config.method, config.endpoint_template, config.min_interval_ms
        ),
        Err(e) => {
            eprintln!("Invalid config: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let args = match read_json(&cli.config) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error reading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let options = match cli.data_dir {
        Some(dir) => PluginOptions::with_data_dir(dir),
        None => PluginOptions::default(),
    };

    let total = samples.len();
    let source = Arc::new(
        ReplaySource::new(samples, Duration::from_millis(cli.interval_ms)).with_restamp(cli.restamp),
    );

    let manager = match TrackingManager::new(Arc::clone(&source), options) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("Failed to initialize tracking: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.print_events {
        let mut events = manager.attach_listener();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                println!("{}", Value::Object(event));
            }
        });
    }

    if let Err(e) = manager.start_tracking(&args) {
        eprintln!("startTracking failed [{}]: {}", e.code(), e);
        manager.shutdown().await;
        return ExitCode::FAILURE;
    }

    println!("Replaying {} sample(s) every {}ms", total, cli.interval_ms);

    source.wait_finished().await;
    manager.wait_for_transmissions().await;
    manager.stop_tracking();
    manager.shutdown().await;

    let stats = manager.worker_stats();
    println!(
        "Replay complete: {} transmitted, {} failed, {} skipped, {} listener event(s) dropped",
        stats.completed,
        stats.failed,
        stats.skipped,
        manager.dropped_events()
    );
    if let Some(error) = stats.last_error {
        println!("Last error: {}", error);
    }

    ExitCode::SUCCESS
}

fn read_json(path: &Path) -> Result<Value, String> {
    let json_str = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&json_str).map_err(|e| format!("{}: {}", path.display(), e))
}

fn read_samples(path: &Path) -> Result<Vec<LocationSample>, String> {
    let raw = read_json(path)?;
    serde_json::from_value(raw).map_err(|e| format!("{}: {}", path.display(), e))
}
