//! # AWG Sequencer Binary
//!
//! Opens a card session, optionally replays a saved sequence, starts it and
//! holds until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Replay a saved session on the simulated card and start it
//! awg_sequencer --config awg.toml --sequence session.json --start -s
//!
//! # Keep the sequence running until Ctrl-C
//! awg_sequencer --config awg.toml --sequence session.json --start --hold
//!
//! # Open, apply awg.toml and write the resulting session
//! awg_sequencer --config awg.toml --save session.json -v
//! ```

#![deny(warnings)]

use awg_common::card::consts::AWG_SERVICE_NAME;
use awg_common::config::ConfigError;
use awg_hal::DriverRegistry;
use awg_sequencer::{SequenceController, SequenceState, SequencerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Interval between status polls while holding.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// AWG Sequencer - segment/step sequence replay for AOD tweezer arrays
#[derive(Parser, Debug)]
#[command(name = "awg_sequencer")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Program and run AWG sequence replay for multi-tone AOD drive")]
#[command(long_about = None)]
struct Args {
    /// Path to the sequencer configuration (awg.toml)
    #[arg(short, long, default_value = "awg.toml")]
    config: PathBuf,

    /// Session file to replay after opening the card
    #[arg(long, value_name = "FILE")]
    sequence: Option<PathBuf>,

    /// Write the session to this file before starting
    #[arg(long, value_name = "FILE")]
    save: Option<PathBuf>,

    /// Start replay
    #[arg(long)]
    start: bool,

    /// Keep replaying until Ctrl-C (with --start)
    #[arg(long, requires = "start")]
    hold: bool,

    /// Start timeout in milliseconds (default from the config)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u32>,

    /// Force the simulation driver
    #[arg(short = 's', long)]
    simulate: bool,

    /// Driver to open (default from the config)
    #[arg(short, long)]
    driver: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    if let Err(e) = run(&args) {
        error!("AWG sequencer failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    info!("AWG sequencer v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match SequencerConfig::load_validated(&args.config) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound(path)) => {
            warn!("{} not found, using defaults", path.display());
            SequencerConfig::with_service_name(AWG_SERVICE_NAME)
        }
        Err(e) => return Err(e.into()),
    };
    info!("Instance {}", config.shared.service_name);

    let driver_name = if args.simulate {
        info!("Simulation mode enabled");
        "simulation"
    } else {
        args.driver.as_deref().unwrap_or(&config.card.driver)
    };
    let registry = DriverRegistry::with_builtin_drivers();
    let driver = registry.create_driver(driver_name)?;
    let mut controller = SequenceController::open(driver, &config)?;

    if let Some(path) = &args.sequence {
        let report = controller.load(path)?;
        if !report.warnings.is_empty() {
            warn!(
                "{} parameter(s) were clamped while loading {}",
                report.warnings.len(),
                path.display()
            );
        }
    }

    if let Some(path) = &args.save {
        controller.save(path)?;
    }

    if args.start {
        let timeout_ms = args.timeout_ms.unwrap_or(config.card.timeout_ms);
        let state = controller.start(timeout_ms)?;
        info!("Sequence {:?}", state);

        if args.hold && state != SequenceState::Faulted {
            hold(&mut controller)?;
        }
        controller.stop()?;
    }

    controller.restart()?;
    info!("AWG sequencer shutdown complete");
    Ok(())
}

/// Poll until the sequence ends or Ctrl-C arrives.
fn hold<D: awg_common::card::driver::CardDriver>(
    controller: &mut SequenceController<D>,
) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    info!("Holding sequence, Ctrl-C to stop");
    while running.load(Ordering::SeqCst) {
        match controller.poll()? {
            SequenceState::Armed | SequenceState::Running => thread::sleep(POLL_INTERVAL),
            state => {
                info!("Sequence ended in {:?}", state);
                break;
            }
        }
    }
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}
