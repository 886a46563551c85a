//! # LogWriter: renders supervisor events through `tracing`.
//!
//! Installed by default; this is how operational events (spawns, deaths,
//! rolling restart and shutdown progress) reach the process log.
//!
//! ## Example output
//! ```text
//! INFO  worker=1 pid=4242 spawned young worker
//! INFO  worker=3 pid=4244 state=unknown worker is not responding
//! INFO  worker=3 pid=4244 state=unknown worker is dead
//! INFO  young=2 more young workers required; spawning
//! INFO  workers=3 starting rolling restart of workers
//! INFO  n=2 workers still alive
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.map(|w| w.get());
        match e.kind {
            EventKind::WorkerSpawned => {
                tracing::info!(worker, pid = e.pid, "spawned young worker");
            }
            EventKind::SpawnFailed => {
                tracing::error!(error = e.detail.as_deref(), "failed to spawn worker");
            }
            EventKind::WorkerStateChanged => {
                tracing::debug!(worker, state = ?e.state, "worker state changed");
            }
            EventKind::WorkerUnresponsive => {
                tracing::info!(worker, pid = e.pid, state = ?e.state, "worker is not responding");
            }
            EventKind::WorkerDead => {
                tracing::info!(worker, pid = e.pid, state = ?e.state, "worker is dead");
            }
            EventKind::WorkerExited => {
                let code = e.exit.and_then(|x| x.code);
                let signal = e.exit.and_then(|x| x.signal);
                tracing::info!(worker, code, signal, "worker has exited");
            }
            EventKind::UnrecognizedMessage => {
                tracing::warn!(
                    worker,
                    message = e.detail.as_deref(),
                    "received unknown message from worker"
                );
            }
            EventKind::LogsSuppressed => {
                tracing::warn!(worker, "logging is disabled due to high memory pressure");
            }
            EventKind::OldWorkerKilled => {
                tracing::info!(worker, "killed old worker");
            }
            EventKind::YoungGenerationDead => {
                tracing::info!(wanted = e.count, "young generation is dead; resurrecting");
            }
            EventKind::OldGenerationAlive => {
                tracing::info!(old = e.count, "old generation is alive; killing");
            }
            EventKind::MoreWorkersRequired => {
                tracing::info!(young = e.count, "more young workers required; spawning");
            }
            EventKind::RollingRestartStarted => {
                tracing::info!(workers = e.count, "starting rolling restart of workers");
            }
            EventKind::ShutdownStarted => {
                tracing::info!(processes = e.count, "starting graceful shutdown");
            }
            EventKind::ShutdownProgress => {
                tracing::info!(n = e.count, "workers still alive");
            }
            EventKind::AllWorkersGone => {
                tracing::info!("all workers gone");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
