//! Runtime core: worker handles, the pool supervisor and its timers.
//!
//! Internal modules:
//! - `handle`: one worker's liveness, state machine and death timer;
//! - `supervisor`: the pool, its rebalancing passes and the control loop;
//! - `timers`: single-slot scheduled tasks over one delay queue;
//! - `builder`: wires config, sinks and subscribers around a transport;
//! - `shutdown`: OS signals forwarded as supervisor requests.

mod builder;
mod handle;
mod shutdown;
mod supervisor;
mod timers;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::SupervisorBuilder;
pub use handle::{Generation, WorkerHandle, WorkerState};
pub use shutdown::forward_signals;
pub use supervisor::{Step, Supervisor, SupervisorHandle, WorkerSnapshot};
