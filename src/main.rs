//! `poolvisor` binary: keeps N copies of a worker program running.
//!
//! ```text
//! poolvisor --workers 4 -- ./worker --port-base 9000
//! ```
//! `SIGINT`/`SIGTERM`/`SIGQUIT` shut the pool down gracefully, `SIGHUP`
//! starts a rolling restart.
//!
//! Workers are driven through pipes and `SIGKILL`, so the binary only runs on
//! unix; elsewhere `main` reports the platform as unsupported.

#![cfg_attr(not(unix), allow(dead_code, unused_imports))]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use poolvisor::{Config, SupervisorBuilder};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Upper bound, in seconds, for every timeout flag (one year).
const MAX_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

/// Single-node worker process pool supervisor.
#[derive(Parser, Debug)]
#[command(name = "poolvisor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of young workers to keep alive (default: available parallelism).
    #[arg(short, long, env = "POOLVISOR_WORKERS")]
    workers: Option<usize>,

    /// Workers run under a debugger: no heartbeat acks, no death timers.
    #[arg(long, env = "POOLVISOR_DEBUG")]
    debug: bool,

    /// Resident memory (MiB) above which worker logs are dropped; 0 disables.
    #[arg(long, env = "POOLVISOR_MEMORY_LIMIT_MIB", default_value_t = 128)]
    memory_limit_mib: u64,

    /// Seconds a new worker has to report in.
    #[arg(
        long,
        env = "POOLVISOR_STARTUP_GRACE",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS)
    )]
    startup_grace: u64,

    /// Seconds between heartbeats before a worker is presumed dead.
    #[arg(
        long,
        env = "POOLVISOR_HEARTBEAT_TIMEOUT",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS)
    )]
    heartbeat_timeout: u64,

    /// Seconds an `alive` or `stopped` report keeps a worker from being presumed dead.
    #[arg(
        long,
        env = "POOLVISOR_COOLDOWN_TIMEOUT",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS)
    )]
    cooldown_timeout: u64,

    /// Worker program.
    #[arg(env = "POOLVISOR_PROGRAM")]
    program: PathBuf,

    /// Arguments passed to every worker.
    #[arg(last = true)]
    args: Vec<String>,
}

impl Cli {
    fn config(&self) -> Config {
        let mut cfg = Config::default();
        if let Some(workers) = self.workers {
            cfg.workers = workers;
        }
        cfg.debug = self.debug;
        cfg.memory_pressure_limit = self.memory_limit_mib.saturating_mul(1024 * 1024);
        cfg.startup_grace = Duration::from_secs(self.startup_grace);
        cfg.heartbeat_timeout = Duration::from_secs(self.heartbeat_timeout);
        cfg.cooldown_timeout = Duration::from_secs(self.cooldown_timeout);
        cfg
    }
}


fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("poolvisor=info,worker=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(not(unix))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("poolvisor drives workers through unix pipes and signals; this platform is not supported")
}

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = cli.config();
    tracing::info!(
        workers = cfg.workers,
        program = %cli.program.display(),
        debug = cfg.debug,
        "starting worker pool"
    );

    let transport = poolvisor::ProcessTransport::new(&cli.program).with_args(&cli.args);
    let sup = SupervisorBuilder::new(cfg, transport).build();

    let handle = sup.handle();
    tokio::spawn(async move {
        if let Err(e) = poolvisor::forward_signals(handle).await {
            tracing::error!(error = %e, "cannot listen for signals");
        }
    });

    match sup.run().await {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => {
            tracing::error!(error = %e, label = e.as_label(), "supervisor invariant violated; aborting");
            std::process::abort();
        }
        Err(e) => Err(e).context("worker pool failed"),
    }
}
