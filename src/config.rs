//! # Global supervisor configuration.
//!
//! Provides [`Config`] centralized settings for the pool supervisor.
//!
//! ## Sentinel values
//! - `memory_pressure_limit = 0` → memory pressure valve disabled
//! - `bus_capacity = 0` → clamped to 1 by the bus

use std::time::Duration;

/// Global configuration for the pool supervisor.
///
/// Defines:
/// - **Pool size**: how many young workers to keep alive
/// - **Liveness**: startup grace, heartbeat and cooldown timeouts
/// - **Pacing**: respawn debounce and shutdown poll interval
/// - **Backpressure**: resident memory threshold for worker log suppression
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors over
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Target number of young workers.
    pub workers: usize,

    /// Time a freshly spawned worker has to report `alive` or `heartbeat`.
    pub startup_grace: Duration,

    /// Death timeout re-armed by every `heartbeat`.
    pub heartbeat_timeout: Duration,

    /// Death timeout re-armed by `alive` and `stopped`.
    pub cooldown_timeout: Duration,

    /// Debounce delay before a respawn evaluation runs.
    pub respawn_delay: Duration,

    /// Interval between shutdown polls.
    pub shutdown_poll: Duration,

    /// Resident memory (bytes) above which worker `log` messages are dropped.
    ///
    /// `0` disables the valve.
    pub memory_pressure_limit: u64,

    /// Minimum spacing between two "logging disabled" warnings.
    pub memory_pressure_cooldown: Duration,

    /// Workers run under a debugger.
    ///
    /// Heartbeat acks are not sent and death timers are never armed.
    pub debug: bool,

    /// Capacity of the event bus ring buffer (min 1; clamped by Bus).
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the memory pressure threshold as an `Option`.
    ///
    /// - `None` → valve disabled
    /// - `Some(n)` → logs dropped above `n` resident bytes
    #[inline]
    pub fn memory_limit(&self) -> Option<u64> {
        if self.memory_pressure_limit == 0 {
            None
        } else {
            Some(self.memory_pressure_limit)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `workers` = available parallelism (1 if unknown)
    /// - `startup_grace = 5s`, `heartbeat_timeout = 30s`, `cooldown_timeout = 60s`
    /// - `respawn_delay = 1s`, `shutdown_poll = 1s`
    /// - `memory_pressure_limit = 128 MiB`, `memory_pressure_cooldown = 60s`
    /// - `debug = false`, `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            startup_grace: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(30),
            cooldown_timeout: Duration::from_secs(60),
            respawn_delay: Duration::from_secs(1),
            shutdown_poll: Duration::from_secs(1),
            memory_pressure_limit: 128 * 1024 * 1024,
            memory_pressure_cooldown: Duration::from_secs(60),
            debug: false,
            bus_capacity: 1024,
        }
    }
}
