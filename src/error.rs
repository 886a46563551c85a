//! Error types used by the poolvisor runtime and its process transport.
//!
//! This module defines two main error enums:
//!
//! - [`SupervisorError`] — errors raised by the pool supervisor itself.
//! - [`TransportError`] — errors raised while talking to worker processes.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//! Termination paths discard `TransportError`s on purpose: a dying peer must never
//! block or fail the supervisor.

use thiserror::Error;

use crate::transport::WorkerId;

/// # Errors produced by the pool supervisor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// A worker process could not be created.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] TransportError),

    /// The transport reported an exit for a worker the supervisor never tracked.
    ///
    /// Bookkeeping and the transport are out of sync; the state cannot be trusted.
    #[error("exit notification for untracked worker {id}")]
    UntrackedWorker {
        /// Identifier carried by the exit notification.
        id: WorkerId,
    },
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::{SupervisorError, WorkerId};
    ///
    /// let err = SupervisorError::UntrackedWorker { id: WorkerId::new(7) };
    /// assert_eq!(err.as_label(), "supervisor_untracked_worker");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::Spawn(_) => "supervisor_spawn_failed",
            SupervisorError::UntrackedWorker { .. } => "supervisor_untracked_worker",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SupervisorError::Spawn(e) => format!("spawn failed: {}", e.as_message()),
            SupervisorError::UntrackedWorker { id } => {
                format!("received exit of worker {id} which is not tracked")
            }
        }
    }

    /// Indicates whether the error is a broken internal invariant.
    ///
    /// Fatal errors must end the process: continuing would act on inconsistent state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SupervisorError::UntrackedWorker { .. })
    }
}

/// # Errors produced by the process transport.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// The OS refused to start the worker program.
    #[error("cannot start `{program}`: {source}")]
    Spawn {
        /// Program that was being started.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The control channel to the worker is already closed.
    #[error("control channel of worker {id} is closed")]
    Closed {
        /// Worker whose channel is gone.
        id: WorkerId,
    },

    /// Delivering an OS signal failed.
    #[error("cannot signal worker {id}: {reason}")]
    Signal {
        /// Worker that was being signalled.
        id: WorkerId,
        /// OS level reason.
        reason: String,
    },
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::{TransportError, WorkerId};
    ///
    /// let err = TransportError::Closed { id: WorkerId::new(1) };
    /// assert_eq!(err.as_label(), "transport_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Spawn { .. } => "transport_spawn",
            TransportError::Closed { .. } => "transport_closed",
            TransportError::Signal { .. } => "transport_signal",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TransportError::Spawn { program, source } => format!("{program}: {source}"),
            TransportError::Closed { id } => format!("worker {id}: channel closed"),
            TransportError::Signal { id, reason } => format!("worker {id}: {reason}"),
        }
    }
}
