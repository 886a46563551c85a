//! Collaborators that receive what workers report.
//!
//! - [`LogSink`] receives worker `log` messages.
//! - [`Profiler`] receives worker `profile` messages.
//! - [`PressureValve`] decides whether logs may be forwarded, based on a
//!   [`MemoryProbe`] reading of this process' resident memory.
//!
//! The defaults ([`TracingLogSink`], [`TracingProfiler`], [`ProcStatus`]) route
//! everything through `tracing` and `/proc/self/status`.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::message::LogLevel;
use crate::transport::WorkerId;

/// Destination of worker log records.
///
/// Called from the control task; implementations must not block.
pub trait LogSink: Send + Sync + 'static {
    fn log(&self, worker: WorkerId, level: LogLevel, message: &str, payload: &Value);
}

/// Destination of worker metric samples.
///
/// `method` is forwarded verbatim (e.g. `inc`, `set`, `upd`).
pub trait Profiler: Send + Sync + 'static {
    fn profile(&self, worker: WorkerId, method: &str, metric: &str, tags: &Value, value: f64);
}

/// Re-emits worker logs as `tracing` events under the `worker` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, worker: WorkerId, level: LogLevel, message: &str, payload: &Value) {
        let worker = worker.get();
        match level {
            LogLevel::Error => tracing::error!(target: "worker", worker, %payload, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "worker", worker, %payload, "{message}"),
            LogLevel::Info => tracing::info!(target: "worker", worker, %payload, "{message}"),
            LogLevel::Debug => tracing::debug!(target: "worker", worker, %payload, "{message}"),
            LogLevel::Trace => tracing::trace!(target: "worker", worker, %payload, "{message}"),
        }
    }
}

/// Records worker metric samples as debug-level `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProfiler;

impl Profiler for TracingProfiler {
    fn profile(&self, worker: WorkerId, method: &str, metric: &str, tags: &Value, value: f64) {
        tracing::debug!(
            target: "worker::profile",
            worker = worker.get(),
            method,
            metric,
            %tags,
            value,
            "profile sample"
        );
    }
}

/// Source of the supervisor's own resident memory size.
pub trait MemoryProbe: Send + Sync + 'static {
    /// Resident bytes, or `None` when unavailable on this platform.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads `VmRSS` from `/proc/self/status` (Linux).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcStatus;

impl MemoryProbe for ProcStatus {
    fn resident_bytes(&self) -> Option<u64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line
        .trim_start_matches("VmRSS:")
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse()
        .ok()?;
    Some(kib * 1024)
}

/// Outcome of asking the valve about one log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Memory is fine; forward the record.
    Forward,
    /// Under pressure; drop the record. `warn` is set at most once per cooldown.
    Drop { warn: bool },
}

/// How long one memory reading is reused before the probe is asked again.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Pool-wide backpressure valve for worker logs.
///
/// The probe is read at most once per second; a burst of worker logs shares
/// one reading.
pub struct PressureValve {
    limit: Option<u64>,
    cooldown: Duration,
    probe: Box<dyn MemoryProbe>,
    sample: Option<(Instant, Option<u64>)>,
    last_warned: Option<Instant>,
}

impl PressureValve {
    /// Creates a valve; `limit = None` always forwards.
    pub fn new(limit: Option<u64>, cooldown: Duration, probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            limit,
            cooldown,
            probe,
            sample: None,
            last_warned: None,
        }
    }

    fn resident_bytes(&mut self, now: Instant) -> Option<u64> {
        match self.sample {
            Some((at, rss)) if now.duration_since(at) < SAMPLE_INTERVAL => rss,
            _ => {
                let rss = self.probe.resident_bytes();
                self.sample = Some((now, rss));
                rss
            }
        }
    }

    /// Decides whether a log record may be forwarded right now.
    pub fn admit(&mut self) -> Admission {
        let Some(limit) = self.limit else {
            return Admission::Forward;
        };
        let now = Instant::now();
        match self.resident_bytes(now) {
            Some(rss) if rss >= limit => {}
            _ => return Admission::Forward,
        }

        let warn = match self.last_warned {
            Some(at) => now.duration_since(at) > self.cooldown,
            None => true,
        };
        if warn {
            self.last_warned = Some(now);
        }
        Admission::Drop { warn }
    }
}
