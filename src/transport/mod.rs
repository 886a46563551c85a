//! Process transport: how workers are created, addressed, and observed.
//!
//! The supervisor never touches OS processes directly. It talks to a [`Transport`]
//! that creates [`WorkerProcess`]es and feeds everything the workers say (and their
//! exit) back into the supervisor's [`Inbox`] as [`Inbound`] items.
//!
//! ```text
//! Supervisor ── spawn() ──► Transport ──► WorkerProcess ── send/kill/disconnect
//!      ▲                         │
//!      └──── Inbox ◄── Inbound::Message / Inbound::Exited (per worker, FIFO)
//! ```
//!
//! ## Contents
//! - [`WorkerId`] identifier assigned by the transport at spawn time
//! - [`Inbound`], [`Inbox`] everything that reaches the control task
//! - [`Transport`], [`WorkerProcess`] the seam implemented by
//!   [`ProcessTransport`] (real child processes)

#[cfg(unix)]
mod process;

#[cfg(unix)]
pub use process::{ChildProcess, ProcessTransport, MAX_LINE_BYTES, WORKER_ID_ENV};

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::message::{ControlMessage, WorkerMessage};

/// Opaque worker identifier, unique among live workers of one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Wraps a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
}

impl From<std::process::ExitStatus> for ExitInfo {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Item processed by the supervisor's control task.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A decoded message from a worker.
    Message { id: WorkerId, message: WorkerMessage },
    /// A worker process exited.
    Exited { id: WorkerId, exit: ExitInfo },
    /// Operator asked for a rolling restart.
    Restart,
    /// Operator asked for a graceful shutdown.
    Shutdown,
}

/// Sending half of the supervisor's inbox.
///
/// Cheap to clone; delivery never blocks. Items sent after the supervisor is gone
/// are dropped.
#[derive(Debug, Clone)]
pub struct Inbox {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl Inbox {
    /// Creates an inbox and its receiving half.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues an item for the control task.
    pub fn deliver(&self, item: Inbound) {
        let _ = self.tx.send(item);
    }
}

/// A live worker process as seen by its handle.
pub trait WorkerProcess: Send + 'static {
    /// Identifier assigned at spawn time.
    fn id(&self) -> WorkerId;

    /// OS process id, when known.
    fn pid(&self) -> Option<u32>;

    /// Sends a control message (non-blocking).
    fn send(&mut self, message: ControlMessage) -> Result<(), TransportError>;

    /// Closes the control channel; the worker sees end-of-input.
    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Sends SIGKILL to the process.
    fn kill(&mut self) -> Result<(), TransportError>;
}

/// Creates worker processes and wires them to the supervisor's inbox.
///
/// Every process created by `spawn` must eventually produce exactly one
/// [`Inbound::Exited`] for its id, after all of its [`Inbound::Message`]s.
pub trait Transport: Send + 'static {
    /// Process type handed to worker handles.
    type Process: WorkerProcess;

    /// Starts a new worker process.
    fn spawn(&mut self, inbox: &Inbox) -> Result<Self::Process, TransportError>;

    /// Sends a control message to every process that is still running,
    /// whether or not the supervisor tracks it. Returns the number reached.
    fn broadcast(&mut self, message: ControlMessage) -> usize;

    /// Number of processes that have not exited yet.
    fn live_count(&self) -> usize;
}
