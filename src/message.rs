//! # Messages exchanged between the supervisor and its workers.
//!
//! Both directions are closed tagged unions serialized as one JSON object per line,
//! discriminated by a `"type"` field:
//!
//! ```text
//! worker ──► supervisor:  log | profile | heartbeat | alive | stopping | stopped
//! supervisor ──► worker:  gracefullyDie | violentlyDie | heartbeat
//! ```
//!
//! ## Decoding rules
//! - not a JSON object, or no string `type` → dropped (`decode` returns `None`)
//! - unknown `type`, or known `type` with bad fields → [`WorkerMessage::Unrecognized`]

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity carried by a worker `log` message.
///
/// Accepts the worker-side aliases `verbose` (debug) and `silly` (trace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    #[serde(alias = "verbose")]
    Debug,
    #[serde(alias = "silly")]
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(s)
    }
}

/// Message sent by a worker to the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// Log record to forward to the logging collaborator.
    Log {
        level: LogLevel,
        message: String,
        #[serde(default)]
        payload: Value,
    },

    /// Metric sample to forward to the profiling collaborator.
    Profile {
        method: String,
        metric: String,
        #[serde(default)]
        tags: Value,
        value: f64,
    },

    /// Liveness ping; acknowledged with [`ControlMessage::Heartbeat`].
    Heartbeat,

    /// Worker finished starting up.
    Alive,

    /// Worker began terminating on its own.
    Stopping,

    /// Worker finished terminating but has not exited yet.
    Stopped,

    /// Tagged message the supervisor cannot interpret.
    #[serde(skip)]
    Unrecognized {
        /// Value of the `type` field.
        tag: String,
        /// Decoding failure for known tags with malformed fields.
        reason: Option<String>,
    },
}

impl WorkerMessage {
    /// Decodes one wire line.
    ///
    /// Returns `None` when the line carries no type tag at all.
    pub fn decode(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        let tag = value.get("type")?.as_str()?.to_owned();

        match serde_json::from_value::<WorkerMessage>(value) {
            Ok(msg) => Some(msg),
            Err(e) => {
                let reason = Self::is_known_tag(&tag).then(|| e.to_string());
                Some(WorkerMessage::Unrecognized { tag, reason })
            }
        }
    }

    fn is_known_tag(tag: &str) -> bool {
        matches!(
            tag,
            "log" | "profile" | "heartbeat" | "alive" | "stopping" | "stopped"
        )
    }

    /// Returns the wire tag of this message.
    pub fn tag(&self) -> &str {
        match self {
            WorkerMessage::Log { .. } => "log",
            WorkerMessage::Profile { .. } => "profile",
            WorkerMessage::Heartbeat => "heartbeat",
            WorkerMessage::Alive => "alive",
            WorkerMessage::Stopping => "stopping",
            WorkerMessage::Stopped => "stopped",
            WorkerMessage::Unrecognized { tag, .. } => tag,
        }
    }
}

/// Control message sent by the supervisor to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Please terminate gracefully.
    GracefullyDie,
    /// Forced termination follows; sent best-effort before SIGKILL.
    ViolentlyDie,
    /// Acknowledges a worker heartbeat.
    Heartbeat,
}
