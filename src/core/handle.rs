//! # WorkerHandle: liveness of one worker process.
//!
//! A handle owns its [`WorkerProcess`], tracks the worker's lifecycle state, and
//! keeps exactly one death timer that ages the worker toward certified death
//! unless a qualifying message refreshes it.
//!
//! ## State machine
//! ```text
//!            alive            stopping            stopped
//! unknown ─────────► alive ────────────► stopping ────────► stopped
//!    │                 │                    │                  │
//!    └─────────────────┴───── destroyed ◄───┴──────────────────┘
//!          (death timer, exit notification; terminal)
//! ```
//!
//! ## Death timer per message
//! | message     | state      | timer                    |
//! |-------------|------------|--------------------------|
//! | (spawn)     | unknown    | `startup_grace` (5s)     |
//! | `heartbeat` | unchanged  | `heartbeat_timeout` (30s)|
//! | `alive`     | alive      | `cooldown_timeout` (60s) |
//! | `stopping`  | stopping   | disarmed                 |
//! | `stopped`   | stopped    | `cooldown_timeout` (60s) |
//!
//! ## Rules
//! - After [`WorkerHandle::destroy`] every operation is a no-op.
//! - `generation` belongs to the pool: it is written by rolling restart and
//!   shutdown, never by the handle itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::timers::{Deadline, Slot, Timers};
use crate::config::Config;
use crate::events::{Bus, Event, EventKind};
use crate::message::{ControlMessage, WorkerMessage};
use crate::sinks::{Admission, LogSink, PressureValve, Profiler};
use crate::transport::{WorkerId, WorkerProcess};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Unknown,
    Alive,
    Stopping,
    Stopped,
    Destroyed,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Unknown => "unknown",
            WorkerState::Alive => "alive",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
            WorkerState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Cohort of a worker relative to the last rolling restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// Spawned since the last rolling restart; serves the target.
    Young,
    /// Marked for retirement once replacements exist.
    Old,
}

/// Everything a handle needs besides itself, owned by the supervisor.
pub(crate) struct Context {
    pub cfg: Config,
    pub bus: Bus,
    pub timers: Timers,
    pub logs: Arc<dyn LogSink>,
    pub profiler: Arc<dyn Profiler>,
    pub valve: PressureValve,
}

/// Per-worker liveness tracker.
pub struct WorkerHandle<P> {
    id: WorkerId,
    pid: Option<u32>,
    process: Option<P>,
    state: WorkerState,
    pub(crate) generation: Generation,
    alive: bool,
    created_at: Instant,
    updated_at: Instant,
    death: Slot,
}

impl<P: WorkerProcess> WorkerHandle<P> {
    /// Takes ownership of a freshly spawned process and arms the startup grace timer.
    pub(crate) fn new(process: P, ctx: &mut Context) -> Self {
        let now = Instant::now();
        let mut handle = Self {
            id: process.id(),
            pid: process.pid(),
            process: Some(process),
            state: WorkerState::Unknown,
            generation: Generation::Young,
            alive: true,
            created_at: now,
            updated_at: now,
            death: Slot::default(),
        };
        handle.postpone_death(Some(ctx.cfg.startup_grace), ctx);
        handle
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// False once the handle is destroyed.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn updated_at(&self) -> Instant {
        self.updated_at
    }

    /// True while a death timer is pending.
    pub fn death_timer_armed(&self) -> bool {
        self.death.is_armed()
    }

    /// Applies one message from the worker.
    pub(crate) fn handle_message(&mut self, message: WorkerMessage, ctx: &mut Context) {
        if !self.alive {
            return;
        }

        match message {
            WorkerMessage::Log {
                level,
                message,
                payload,
            } => match ctx.valve.admit() {
                Admission::Forward => ctx.logs.log(self.id, level, &message, &payload),
                Admission::Drop { warn: true } => ctx
                    .bus
                    .publish(Event::new(EventKind::LogsSuppressed).with_worker(self.id)),
                Admission::Drop { warn: false } => {}
            },
            WorkerMessage::Profile {
                method,
                metric,
                tags,
                value,
            } => ctx.profiler.profile(self.id, &method, &metric, &tags, value),
            WorkerMessage::Heartbeat => {
                if !ctx.cfg.debug {
                    if let Some(process) = self.process.as_mut() {
                        // A failed ack means the worker is going away; its exit will follow.
                        let _ = process.send(ControlMessage::Heartbeat);
                    }
                }
                self.postpone_death(Some(ctx.cfg.heartbeat_timeout), ctx);
            }
            WorkerMessage::Alive => {
                self.transition(WorkerState::Alive, &ctx.bus);
                self.postpone_death(Some(ctx.cfg.cooldown_timeout), ctx);
            }
            WorkerMessage::Stopping => {
                self.transition(WorkerState::Stopping, &ctx.bus);
                self.postpone_death(None, ctx);
            }
            WorkerMessage::Stopped => {
                self.transition(WorkerState::Stopped, &ctx.bus);
                self.postpone_death(Some(ctx.cfg.cooldown_timeout), ctx);
            }
            WorkerMessage::Unrecognized { tag, reason } => {
                let detail = match reason {
                    Some(reason) => format!("{tag}: {reason}"),
                    None => tag,
                };
                ctx.bus.publish(
                    Event::new(EventKind::UnrecognizedMessage)
                        .with_worker(self.id)
                        .with_detail(detail),
                );
            }
        }
    }

    /// Asks the worker to terminate gracefully. Destruction happens on exit or timer.
    pub(crate) fn kill(&mut self) {
        if !self.alive {
            return;
        }
        if let Some(process) = self.process.as_mut() {
            // Unreachable workers are caught by their death timer.
            let _ = process.send(ControlMessage::GracefullyDie);
        }
    }

    /// Death timer callback.
    pub(crate) fn on_death_timer(&mut self, ctx: &mut Context) {
        self.death.expire();
        self.age_to_death(ctx);
    }

    pub(crate) fn age_to_death(&mut self, ctx: &mut Context) {
        if !self.alive {
            return;
        }
        ctx.bus.publish(self.event(EventKind::WorkerUnresponsive));
        self.certify_death(ctx);
    }

    /// Force-terminates the worker and destroys the handle. Never fails.
    pub(crate) fn certify_death(&mut self, ctx: &mut Context) {
        if !self.alive {
            return;
        }
        ctx.bus.publish(self.event(EventKind::WorkerDead));

        if let Some(process) = self.process.as_mut() {
            // Best effort on a dying peer: every result is discarded.
            let _ = process.send(ControlMessage::ViolentlyDie);
            let _ = process.disconnect();
            let _ = process.kill();
        }

        self.destroy(ctx);
    }

    /// Terminal transition. Idempotent.
    pub(crate) fn destroy(&mut self, ctx: &mut Context) {
        if !self.alive {
            return;
        }
        ctx.timers.disarm(&mut self.death);
        self.process = None;
        self.state = WorkerState::Destroyed;
        self.alive = false;
        self.updated_at = Instant::now();
    }

    fn transition(&mut self, state: WorkerState, bus: &Bus) {
        self.state = state;
        self.updated_at = Instant::now();
        bus.publish(
            Event::new(EventKind::WorkerStateChanged)
                .with_worker(self.id)
                .with_state(state),
        );
    }

    /// Re-arms (`Some`) or disarms (`None`) the death timer.
    fn postpone_death(&mut self, timeout: Option<Duration>, ctx: &mut Context) {
        if !self.alive || ctx.cfg.debug {
            return;
        }
        match timeout {
            Some(after) => {
                ctx.timers
                    .arm(&mut self.death, Deadline::Death(self.id), after);
                self.updated_at = Instant::now();
            }
            None => ctx.timers.disarm(&mut self.death),
        }
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_worker(self.id)
            .with_pid(self.pid)
            .with_state(self.state)
            .with_generation(self.generation)
    }
}

impl<P> std::fmt::Display for WorkerHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "<WorkerHandle wid={} pid={pid} state={}>", self.id, self.state),
            None => write!(f, "<WorkerHandle wid={} pid=? state={}>", self.id, self.state),
        }
    }
}
