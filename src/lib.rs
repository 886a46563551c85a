//! # poolvisor
//!
//! **Poolvisor** keeps a pool of long-lived worker processes alive on one host.
//!
//! Workers report liveness over newline-delimited JSON; the supervisor tracks
//! every worker with a death timer, replaces workers that die or stop
//! responding, performs rolling restarts by generation, and shuts the pool
//! down gracefully.
//!
//! ## Architecture
//! ```text
//!  ┌──────────┐ ┌──────────┐ ┌──────────┐
//!  │ worker 1 │ │ worker 2 │ │ worker N │   OS processes
//!  └────┬─────┘ └────┬─────┘ └────┬─────┘
//!       │ stdout: alive / heartbeat / log / profile / stopping / stopped
//!       ▼            ▼            ▼
//! ┌──────────────────────────────────────────┐
//! │ Transport (ProcessTransport)             │
//! │  - spawn, send, disconnect, kill         │
//! │  - Inbound::Message / Inbound::Exited    │
//! └────────────────────┬─────────────────────┘
//!                      ▼ Inbox
//! ┌──────────────────────────────────────────┐
//! │ Supervisor (single control task)         │
//! │  - WorkerHandle per worker (death timer) │
//! │  - respawn / rolling restart / shutdown  │
//! │  - LogSink, Profiler, PressureValve      │
//! └────────────────────┬─────────────────────┘
//!                      ▼ Bus (broadcast)
//!               SubscriberSet ──► LogWriter, custom subscribers
//! ```
//!
//! ## Lifecycle
//! ```text
//! run() ─► kickstart (target young workers)
//! loop {
//!   ├─ worker message ─► handle state machine, timers, sinks
//!   ├─ worker exit    ─► drop handle, schedule respawn
//!   ├─ death timer    ─► certify death (SIGKILL), schedule respawn
//!   ├─ respawn pass   ─► spawn one / kill old / reschedule
//!   ├─ restart        ─► mark every worker old, schedule respawn
//!   └─ shutdown       ─► target 0, gracefullyDie to all, poll until none left
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                         | Key types / traits                          |
//! |-------------------|-----------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Pool size, generations, respawn, shutdown.          | [`Supervisor`], [`SupervisorHandle`]        |
//! | **Liveness**      | Per-worker state machine and death timer.           | [`WorkerHandle`], [`WorkerState`]           |
//! | **Transport**     | Worker creation and control channel.                | [`Transport`], [`ProcessTransport`]         |
//! | **Sinks**         | Worker logs and metrics, memory backpressure.       | [`LogSink`], [`Profiler`], [`PressureValve`]|
//! | **Subscriber API**| Hook into supervisor events.                        | [`Subscribe`], [`LogWriter`]                |
//! | **Errors**        | Typed errors for supervision and transport.         | [`SupervisorError`], [`TransportError`]     |
//! | **Configuration** | Every timeout and threshold in one place.           | [`Config`]                                  |
//!
//! ## Example
//! ```rust,no_run
//! use poolvisor::{Config, ProcessTransport, SupervisorBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config {
//!         workers: 4,
//!         ..Config::default()
//!     };
//!     let transport = ProcessTransport::new("./worker");
//!     let sup = SupervisorBuilder::new(cfg, transport).build();
//!
//!     tokio::spawn(poolvisor::forward_signals(sup.handle()));
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod message;
mod sinks;
mod subscribers;
mod transport;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{
    forward_signals, Generation, Step, Supervisor, SupervisorBuilder, SupervisorHandle,
    WorkerHandle, WorkerSnapshot, WorkerState,
};
pub use error::{SupervisorError, TransportError};
pub use events::{Bus, Event, EventKind};
pub use message::{ControlMessage, LogLevel, WorkerMessage};
pub use sinks::{
    Admission, LogSink, MemoryProbe, PressureValve, ProcStatus, Profiler, TracingLogSink,
    TracingProfiler,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use transport::{ExitInfo, Inbound, Inbox, Transport, WorkerId, WorkerProcess};

#[cfg(unix)]
pub use transport::{ChildProcess, ProcessTransport, MAX_LINE_BYTES, WORKER_ID_ENV};
