//! Still Capture CLI
//!
//! Drives the capture pipeline against the simulated sensor: opens a
//! surface, takes a number of pictures and tears everything down.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use still_capture::{
    capture::{CapturePipeline, FileConfig, TriggerOutcome},
    handoff::{DirectoryHandoff, LogNotifier},
    hardware::{InjectedFaults, PreviewTarget, SimulatedSensor, SimulatedSensorConfig},
    metrics::CaptureMetrics,
    negotiation::{AspectTolerance, DisplayExtent},
};
use tracing::{info, warn};

/// How long to wait for one capture session to finish.
const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Named aspect tolerance sets.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectPreset {
    Default,
    Strict,
    Permissive,
}

impl From<AspectPreset> for AspectTolerance {
    fn from(preset: AspectPreset) -> Self {
        match preset {
            AspectPreset::Default => AspectTolerance::default(),
            AspectPreset::Strict => AspectTolerance::strict(),
            AspectPreset::Permissive => AspectTolerance::permissive(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "still-capture", version, about = "Take still pictures with a simulated sensor")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Surface width in pixels.
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Surface height in pixels.
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Number of pictures to take.
    #[arg(short, long, default_value_t = 1)]
    shots: u32,

    /// Pause between pictures in milliseconds.
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// Output directory (overrides the config file).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Aspect tolerance preset (overrides the config file).
    #[arg(long, value_enum)]
    aspect: Option<AspectPreset>,

    /// Simulate a camera that cannot be opened.
    #[arg(long)]
    fail_open: bool,

    /// Simulate a preview output that cannot be bound.
    #[arg(long)]
    fail_bind: bool,

    /// Simulate a lens that never reports focus.
    #[arg(long)]
    focus_fails: bool,

    /// Print Prometheus metrics on exit.
    #[arg(long)]
    metrics: bool,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Still Capture v{}", still_capture::VERSION);

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(output) = &args.output {
        config.output.directory = output.clone();
    }
    if let Some(preset) = args.aspect {
        config.negotiation = preset.into();
    }

    let Some(extent) = DisplayExtent::new(args.width, args.height) else {
        eprintln!("Surface size must be non-zero, got {}x{}", args.width, args.height);
        std::process::exit(2);
    };

    let metrics = match CaptureMetrics::new() {
        Ok(metrics) => metrics,
        Err(e) => {
            eprintln!("Failed to create metrics registry: {}", e);
            std::process::exit(1);
        }
    };

    let sensor = SimulatedSensor::new(SimulatedSensorConfig {
        focus_succeeds: !args.focus_fails,
        faults: InjectedFaults {
            open: args.fail_open,
            bind: args.fail_bind,
            ..Default::default()
        },
        ..Default::default()
    });
    let pipeline = CapturePipeline::new(
        sensor,
        DirectoryHandoff::new(&config.output.directory, config.output.file_prefix.clone()),
        LogNotifier,
        &config,
        metrics,
    );

    let dispatcher = match pipeline.spawn_dispatcher() {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            eprintln!("Failed to start dispatcher: {}", e);
            std::process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }
    }

    pipeline.surface_created(PreviewTarget::new(1));
    pipeline.surface_changed(extent);

    let mut taken = 0;
    let mut failed = 0;
    for shot in 1..=args.shots {
        if !running.load(Ordering::SeqCst) || pipeline.is_finished() {
            break;
        }

        match pipeline.trigger_focus() {
            TriggerOutcome::Started => {}
            outcome => {
                warn!(shot, ?outcome, "Capture not started");
                continue;
            }
        }

        let handed_off = pipeline.metrics().handoff_count();
        let deadline = Instant::now() + SESSION_TIMEOUT;
        while pipeline.is_busy() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if pipeline.is_busy() {
            warn!(shot, "Capture timed out");
        } else if pipeline.metrics().handoff_count() > handed_off {
            taken += 1;
        } else {
            failed += 1;
        }

        if shot < args.shots {
            std::thread::sleep(Duration::from_millis(args.interval_ms));
        }
    }

    pipeline.surface_destroyed();
    dispatcher.stop();

    info!(
        "Done: {} of {} pictures taken, {} sessions failed, {} notices shown",
        taken,
        args.shots,
        failed,
        pipeline.metrics().notice_count()
    );

    if args.metrics {
        match pipeline.metrics().encode() {
            Ok(text) => println!("{}", text),
            Err(e) => warn!("Failed to encode metrics: {}", e),
        }
    }

    if pipeline.is_finished() {
        std::process::exit(1);
    }
}
