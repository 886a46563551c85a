//! # Operational events emitted by the pool supervisor.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Worker events**: one worker's lifecycle (spawned, state change, unresponsive, dead, exited)
//! - **Pool events**: rebalancing decisions (resurrection, spawning more, killing old)
//! - **Operator events**: rolling restart and shutdown progress
//!
//! The [`Event`] struct carries additional metadata such as timestamps, worker id,
//! pid, state, generation, counts and a free-form detail.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use poolvisor::{Event, EventKind, WorkerId, WorkerState};
//!
//! let ev = Event::new(EventKind::WorkerStateChanged)
//!     .with_worker(WorkerId::new(3))
//!     .with_state(WorkerState::Alive);
//!
//! assert_eq!(ev.kind, EventKind::WorkerStateChanged);
//! assert_eq!(ev.worker, Some(WorkerId::new(3)));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::core::{Generation, WorkerState};
use crate::transport::{ExitInfo, WorkerId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Worker events ===
    /// A young worker was spawned.
    ///
    /// Sets: `worker`, `pid`
    WorkerSpawned,

    /// The transport could not start a worker.
    ///
    /// Sets: `detail`
    SpawnFailed,

    /// A worker reported a lifecycle transition.
    ///
    /// Sets: `worker`, `state`
    WorkerStateChanged,

    /// A worker's death timer fired.
    ///
    /// Sets: `worker`, `pid`, `state`
    WorkerUnresponsive,

    /// A worker was certified dead and force-terminated.
    ///
    /// Sets: `worker`, `pid`, `state`
    WorkerDead,

    /// The transport reported a worker exit.
    ///
    /// Sets: `worker`, `exit`
    WorkerExited,

    /// A worker sent something the supervisor cannot interpret.
    ///
    /// Sets: `worker`, `detail`
    UnrecognizedMessage,

    /// Worker logs are being dropped under memory pressure (rate limited).
    ///
    /// Sets: `worker`
    LogsSuppressed,

    // === Pool events ===
    /// An old-generation worker was asked to terminate.
    ///
    /// Sets: `worker`, `generation`
    OldWorkerKilled,

    /// No young worker is left; resurrecting one.
    ///
    /// Sets: `count` (target)
    YoungGenerationDead,

    /// Old workers are still alive while young ones exist; killing them.
    ///
    /// Sets: `count` (old workers)
    OldGenerationAlive,

    /// Fewer young workers than the target; spawning one.
    ///
    /// Sets: `count` (young workers)
    MoreWorkersRequired,

    // === Operator events ===
    /// Rolling restart started; every tracked worker became old.
    ///
    /// Sets: `count` (workers marked old)
    RollingRestartStarted,

    /// Graceful shutdown started.
    ///
    /// Sets: `count` (processes asked to terminate)
    ShutdownStarted,

    /// Shutdown poll found workers still running.
    ///
    /// Sets: `count`
    ShutdownProgress,

    /// Every worker is gone; the supervisor is finished.
    AllWorkersGone,
}

/// Supervisor event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Worker concerned, if any.
    pub worker: Option<WorkerId>,
    /// OS process id of the worker, when known.
    pub pid: Option<u32>,
    /// Worker state at the time of the event.
    pub state: Option<WorkerState>,
    /// Worker generation at the time of the event.
    pub generation: Option<Generation>,
    /// Event-specific count (workers, processes).
    pub count: Option<usize>,
    /// How the worker exited.
    pub exit: Option<ExitInfo>,
    /// Human-readable detail (errors, message tags).
    pub detail: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            pid: None,
            state: None,
            generation: None,
            count: None,
            exit: None,
            detail: None,
        }
    }

    #[inline]
    pub fn with_worker(mut self, id: WorkerId) -> Self {
        self.worker = Some(id);
        self
    }

    #[inline]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    #[inline]
    pub fn with_state(mut self, state: WorkerState) -> Self {
        self.state = Some(state);
        self
    }

    #[inline]
    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = Some(generation);
        self
    }

    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    #[inline]
    pub fn with_exit(mut self, exit: ExitInfo) -> Self {
        self.exit = Some(exit);
        self
    }

    /// Attaches a human-readable detail.
    #[inline]
    pub fn with_detail(mut self, detail: impl Into<Arc<str>>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
