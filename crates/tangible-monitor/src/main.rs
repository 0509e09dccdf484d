//! Tangible Monitor
//!
//! Connects a tangible engine to the recognition service (or the offline
//! simulator) and logs every event it publishes.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tangible_core::{EngineEvent, Pattern};
use tangible_logging::{ConsoleFormat, LogConfig, TangibleSubscriberBuilder};
use tangible_sync::{EngineConfig, EventRecorder, ProviderMode, TangibleEngine};

#[derive(Parser)]
#[command(
    name = "tangible-monitor",
    about = "Log tangible engine events from the recognition service or the simulator",
    version
)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON lines instead of pretty console output
    #[arg(long, global = true)]
    json: bool,

    /// Engine ticks per second
    #[arg(long, global = true, default_value = "60")]
    rate: u32,

    /// Seconds between connection heartbeats
    #[arg(long, global = true, default_value = "5")]
    heartbeat_secs: u64,

    /// Stop after this many ticks
    #[arg(long, global = true)]
    ticks: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the recognition service
    Connect {
        /// Service host
        #[arg(long)]
        host: Option<String>,

        /// Service port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the offline simulator with a few wandering tangibles
    Simulate {
        /// Engine profile (JSON) providing the pattern set
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Number of simulated tangibles
        #[arg(short = 'n', long, default_value = "3")]
        count: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut simulated = 0;
    match &cli.command {
        Commands::Connect { host, port } => {
            config.mode = ProviderMode::Service;
            if let Some(host) = host {
                config.host = host.clone();
            }
            if let Some(port) = port {
                config.port = *port;
            }
        }
        Commands::Simulate { profile, count } => {
            config.mode = ProviderMode::Simulator;
            if let Some(profile) = profile {
                config.profile_path = Some(profile.clone());
            }
            simulated = *count;
        }
    }

    let level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let console = if cli.json {
        ConsoleFormat::Json
    } else {
        ConsoleFormat::Pretty
    };
    let _guard = TangibleSubscriberBuilder::new()
        .with_config(LogConfig::at_level(level))
        .with_console(console)
        .init()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    info!(mode = %config.mode, destination = %config.destination(), "Starting monitor");
    let engine = TangibleEngine::from_config(&config, runtime.handle().clone())?;
    let recorder = EventRecorder::new();
    engine.subscribe(&recorder);
    engine.init();

    let mut wander = Wander::default();
    if simulated > 0 {
        wander.place(&engine, simulated);
    }

    let frame = Duration::from_secs(1) / cli.rate.max(1);
    let heartbeat = Duration::from_secs(cli.heartbeat_secs.max(1));
    let mut last_heartbeat = Instant::now();
    let mut tick: u64 = 0;

    while !stop.load(Ordering::SeqCst) && cli.ticks.is_none_or(|limit| tick < limit) {
        if last_heartbeat.elapsed() >= heartbeat {
            engine.heartbeat();
            last_heartbeat = Instant::now();
        }

        wander.step(&engine, tick);
        engine.update_pointers(Vec::new());
        engine.tick();

        for event in recorder.take() {
            log_event(&event);
        }

        tick += 1;
        std::thread::sleep(frame);
    }

    info!(ticks = tick, "Stopping monitor");
    engine.deinit();
    for event in recorder.take() {
        log_event(&event);
    }
    Ok(())
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::PatternsChanged(patterns) => {
            info!(count = patterns.len(), names = %pattern_names(patterns), "{}", event.kind());
        }
        EngineEvent::TangibleAdded(t) | EngineEvent::TangibleRemoved(t) => {
            info!(
                tangible_id = t.id(),
                pattern_id = t.pattern_id(),
                pattern = t.pattern_name().as_deref().unwrap_or("?"),
                "{}",
                event.kind()
            );
        }
        EngineEvent::TangibleUpdated(t) => {
            let p = t.position();
            tracing::debug!(
                tangible_id = t.id(),
                x = p.x,
                y = p.y,
                r = t.rotation(),
                "{}",
                event.kind()
            );
        }
        EngineEvent::FailedToConnect => warn!("{}", event.kind()),
        EngineEvent::Connected | EngineEvent::Disconnected => info!("{}", event.kind()),
    }
}

fn pattern_names(patterns: &[Pattern]) -> String {
    patterns
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Moves simulated tangibles around a circle
#[derive(Default)]
struct Wander {
    ids: Vec<i32>,
}

impl Wander {
    const CENTER: (f32, f32) = (960.0, 540.0);
    const RADIUS: f32 = 300.0;

    fn place(&mut self, engine: &TangibleEngine, count: usize) {
        let Some(simulator) = engine.simulator() else {
            return;
        };
        let pattern_id = simulator
            .profile()
            .patterns
            .first()
            .map(|p| p.pattern_id)
            .unwrap_or(0);

        for i in 0..count {
            let (x, y) = Self::position(i, count, 0);
            self.ids.push(simulator.spawn(pattern_id, x, y, 0.0));
        }
        info!(count, pattern_id, "Placed simulated tangibles");
    }

    fn step(&self, engine: &TangibleEngine, tick: u64) {
        let Some(simulator) = engine.simulator() else {
            return;
        };
        for (i, id) in self.ids.iter().enumerate() {
            let (x, y) = Self::position(i, self.ids.len(), tick);
            simulator.move_to(*id, x, y);
            simulator.rotate_to(*id, (tick % 360) as f32);
        }
    }

    fn position(index: usize, count: usize, tick: u64) -> (f32, f32) {
        let angle = std::f32::consts::TAU * index as f32 / count.max(1) as f32 + tick as f32 * 0.01;
        (
            Self::CENTER.0 + Self::RADIUS * angle.cos(),
            Self::CENTER.1 + Self::RADIUS * angle.sin(),
        )
    }
}
