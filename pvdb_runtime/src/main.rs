//! # PVDB Runtime Binary
//!
//! Loads a record database from TOML, binds device support, and runs
//! the periodic scanner and callback queue until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Run a database
//! pvdb --config config/records.toml
//!
//! # Force simulation mode on every record
//! pvdb --config config/records.toml --simulate
//!
//! # Verbose logging, JSON output
//! pvdb --config config/records.toml -v --json
//! ```

#![deny(warnings)]

use clap::Parser;
use pvdb_common::config::{DatabaseConfig, ScanMode, SimMode};
use pvdb_engine::Database;
use pvdb_engine::device::{DeviceRegistry, SoftChannel};
use pvdb_engine::sched::{CallbackScheduler, EventSink, TracingEventSink};
use pvdb_scan::{CallbackQueue, PeriodicScanner};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// PVDB - record processing and alarm/monitor runtime
#[derive(Parser, Debug)]
#[command(name = "pvdb")]
#[command(version)]
#[command(about = "Process-variable database runtime")]
#[command(long_about = None)]
struct Args {
    /// Path to the record database file (records.toml)
    #[arg(short, long, default_value = "/etc/pvdb/records.toml")]
    config: PathBuf,

    /// Force simulation mode on every record
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("runtime startup failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    setup_tracing(&args);

    info!("PVDB runtime v{} starting...", env!("CARGO_PKG_VERSION"));

    info!("Loading database from {:?}", args.config);
    let mut config = DatabaseConfig::load(&args.config)?;
    config.validate()?;

    if args.simulate {
        info!("Simulation mode forced on all records");
        for rc in &mut config.records {
            if rc.simm == SimMode::No {
                rc.simm = SimMode::Yes;
            }
        }
    }

    let mut registry = DeviceRegistry::new();
    registry.register(Arc::new(SoftChannel));
    info!("Device support registered: {:?}", registry.list());

    let database = Database::build(&config, &registry)?;
    let periodic_count = config
        .records
        .iter()
        .filter(|rc| rc.scan == ScanMode::Periodic)
        .count();
    info!(
        "Database built: {} records, {} periodic, {} scan groups",
        database.len(),
        periodic_count,
        database.periodic_groups().len()
    );

    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let queue = Arc::new(CallbackQueue::start(Arc::clone(&events)));
    let scheduler: Arc<dyn CallbackScheduler> = queue.clone();
    let mut scanner = PeriodicScanner::start(database.periodic_groups(), scheduler, events);

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        handler_flag.store(false, Ordering::SeqCst);
    })?;

    info!("Scanning; press ctrl-c to stop");
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    let final_stats = scanner.stats();
    scanner.stop();
    queue.shutdown();

    for (period, stats) in final_stats {
        info!(
            period_ms = period.as_millis() as u64,
            cycles = stats.cycle_count,
            avg_ns = stats.avg_cycle_ns(),
            max_ns = stats.max_cycle_ns,
            overruns = stats.overruns,
            "scan thread summary"
        );
    }

    info!("PVDB runtime shutdown complete");
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
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
