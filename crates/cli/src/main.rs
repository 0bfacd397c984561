//! metronome — adaptive concurrency runtime.
//!
//! Wires the three components together: the adaptive worker pool for
//! one-off work, the unified scheduler for everything periodic, and the
//! network quality monitor feeding adaptive timeout/retry policy.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use metronome_net::{recommended_retries, recommended_timeout, AdaptivePolicy, NetworkQualityMonitor};
use metronome_pool::AdaptiveWorkerPool;
use metronome_scheduler::{TaskKind, UnifiedScheduler};

use crate::config::MetronomeConfig;

/// Adaptive worker pool, shared periodic scheduler, and network-aware
/// timeout/retry policy.
#[derive(Parser, Debug)]
#[command(name = "metronome", version, about)]
struct Cli {
    /// Path to metronome.toml (defaults apply when the file is missing).
    #[arg(long, env = "METRONOME_CONFIG", default_value = "config/metronome.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full stack for a bounded interval, driving sample load.
    Run {
        /// Seconds to keep the stack alive.
        #[arg(long, default_value_t = 30)]
        duration_secs: u64,
    },
    /// One-shot network quality check against a target.
    Probe {
        /// Target host; falls back to the configured default.
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        samples: Option<usize>,
        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print pool and scheduler status snapshots.
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = MetronomeConfig::load(&cli.config).context("failed to load configuration")?;

    match cli.command {
        Command::Run { duration_secs } => run(config, duration_secs),
        Command::Probe {
            host,
            port,
            samples,
            json,
        } => probe(config, host, port, samples, json),
        Command::Status => status(config),
    }
}

fn run(config: MetronomeConfig, duration_secs: u64) -> Result<()> {
    let pool = Arc::new(AdaptiveWorkerPool::new(config.pool)?);
    let scheduler = UnifiedScheduler::new(config.scheduler)?;
    let policy = Arc::new(AdaptivePolicy::new(NetworkQualityMonitor::new(config.net)?));

    // Periodic work goes through the shared scheduler: quality refresh
    // feeding the policy cache, and a status heartbeat.
    let refresh_policy = Arc::clone(&policy);
    scheduler
        .schedule(
            TaskKind::Monitor,
            move || refresh_policy.refresh(),
            Duration::ZERO,
            Duration::from_secs(30),
        )
        .context("failed to register quality refresh task")?;

    let heartbeat_pool = Arc::clone(&pool);
    scheduler
        .schedule(
            TaskKind::Monitor,
            move || info!("{}", heartbeat_pool.status()),
            Duration::from_secs(5),
            Duration::from_secs(10),
        )
        .context("failed to register heartbeat task")?;

    // Sample load: one-off jobs that consult the cached policy the way
    // a real caller would before doing network work.
    for n in 0..16u64 {
        let job_policy = Arc::clone(&policy);
        pool.execute(move || {
            let budget_ms = job_policy.timeout_for(1_000);
            std::thread::sleep(Duration::from_millis(25 + n % 7));
            debug!(job = n, budget_ms, "sample job finished");
        });
    }

    std::thread::sleep(Duration::from_secs(duration_secs));

    println!("{}", pool.status());
    println!("{}", scheduler.status());

    scheduler.shutdown();
    pool.shutdown();
    Ok(())
}

fn probe(
    config: MetronomeConfig,
    host: Option<String>,
    port: Option<u16>,
    samples: Option<usize>,
    json: bool,
) -> Result<()> {
    let net = config.net.clone();
    let monitor = NetworkQualityMonitor::new(config.net)?;

    let host = host.unwrap_or(net.host);
    let report = monitor.check_quality(
        &host,
        port.unwrap_or(net.port),
        samples.unwrap_or(net.samples),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
        println!(
            "recommended timeout (base 1000 ms): {} ms",
            recommended_timeout(report.tier, 1_000)
        );
        println!(
            "recommended retries (base 3): {}",
            recommended_retries(report.tier, 3)
        );
    }
    Ok(())
}

fn status(config: MetronomeConfig) -> Result<()> {
    let pool = AdaptiveWorkerPool::new(config.pool)?;
    let scheduler = UnifiedScheduler::new(config.scheduler)?;

    println!("{}", pool.status());
    println!("{}", scheduler.status());

    scheduler.shutdown();
    pool.shutdown();
    Ok(())
}
