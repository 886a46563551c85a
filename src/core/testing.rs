//! Scripted transport and recording collaborators for unit tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::handle::Context;
use super::timers::Timers;
use crate::config::Config;
use crate::error::TransportError;
use crate::events::Bus;
use crate::message::{ControlMessage, LogLevel};
use crate::sinks::{LogSink, MemoryProbe, PressureValve, Profiler};
use crate::transport::{Inbox, Transport, WorkerId, WorkerProcess};

#[derive(Default)]
struct Entries {
    next_id: u64,
    refuse_spawns: usize,
    live: BTreeSet<WorkerId>,
    sent: Vec<(WorkerId, ControlMessage)>,
    broadcasts: Vec<ControlMessage>,
    killed: Vec<WorkerId>,
    disconnected: Vec<WorkerId>,
}

/// Shared record of everything the supervisor asked the transport to do.
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Entries>>);

impl Journal {
    fn with<R>(&self, f: impl FnOnce(&mut Entries) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }

    /// Registers a live process with a fixed id.
    pub fn process(&self, id: WorkerId) -> ScriptedProcess {
        self.with(|e| e.live.insert(id));
        ScriptedProcess {
            id,
            journal: self.clone(),
        }
    }

    /// Marks a process as exited (the caller delivers `Inbound::Exited`).
    pub fn exit(&self, id: WorkerId) {
        self.with(|e| e.live.remove(&id));
    }

    /// Makes the next `n` spawns fail.
    pub fn refuse_spawns(&self, n: usize) {
        self.with(|e| e.refuse_spawns = n);
    }

    pub fn live(&self) -> Vec<WorkerId> {
        self.with(|e| e.live.iter().copied().collect())
    }

    pub fn sent_to(&self, id: WorkerId) -> Vec<ControlMessage> {
        self.with(|e| {
            e.sent
                .iter()
                .filter(|(to, _)| *to == id)
                .map(|(_, m)| *m)
                .collect()
        })
    }

    pub fn broadcasts(&self) -> Vec<ControlMessage> {
        self.with(|e| e.broadcasts.clone())
    }

    pub fn killed(&self) -> Vec<WorkerId> {
        self.with(|e| e.killed.clone())
    }

    pub fn disconnected(&self) -> Vec<WorkerId> {
        self.with(|e| e.disconnected.clone())
    }
}

pub(crate) struct ScriptedProcess {
    id: WorkerId,
    journal: Journal,
}

impl WorkerProcess for ScriptedProcess {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn pid(&self) -> Option<u32> {
        u32::try_from(10_000 + self.id.get()).ok()
    }

    fn send(&mut self, message: ControlMessage) -> Result<(), TransportError> {
        let id = self.id;
        self.journal.with(|e| {
            if e.live.contains(&id) {
                e.sent.push((id, message));
                Ok(())
            } else {
                Err(TransportError::Closed { id })
            }
        })
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let id = self.id;
        self.journal.with(|e| e.disconnected.push(id));
        Ok(())
    }

    fn kill(&mut self) -> Result<(), TransportError> {
        let id = self.id;
        self.journal.with(|e| {
            if e.live.contains(&id) {
                e.killed.push(id);
            }
        });
        Ok(())
    }
}

/// Transport whose processes only exist in the journal.
pub(crate) struct ScriptedTransport {
    journal: Journal,
}

impl ScriptedTransport {
    pub fn new() -> (Self, Journal) {
        let journal = Journal::default();
        (
            Self {
                journal: journal.clone(),
            },
            journal,
        )
    }
}

impl Transport for ScriptedTransport {
    type Process = ScriptedProcess;

    fn spawn(&mut self, _inbox: &Inbox) -> Result<ScriptedProcess, TransportError> {
        let refused = self.journal.with(|e| {
            if e.refuse_spawns > 0 {
                e.refuse_spawns -= 1;
                true
            } else {
                false
            }
        });
        if refused {
            return Err(TransportError::Spawn {
                program: "scripted".into(),
                source: std::io::Error::other("refused"),
            });
        }

        let id = self.journal.with(|e| {
            e.next_id += 1;
            WorkerId::new(e.next_id)
        });
        Ok(self.journal.process(id))
    }

    fn broadcast(&mut self, message: ControlMessage) -> usize {
        self.journal.with(|e| {
            e.broadcasts.push(message);
            let live: Vec<WorkerId> = e.live.iter().copied().collect();
            for id in &live {
                e.sent.push((*id, message));
            }
            live.len()
        })
    }

    fn live_count(&self) -> usize {
        self.journal.with(|e| e.live.len())
    }
}

type LogEntry = (WorkerId, LogLevel, String);
type ProfileEntry = (WorkerId, String, String, f64);

/// Log sink, profiler and memory probe in one.
#[derive(Default)]
pub(crate) struct Recorder {
    logs: Mutex<Vec<LogEntry>>,
    profiles: Mutex<Vec<ProfileEntry>>,
    rss: AtomicU64,
}

impl Recorder {
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().unwrap().clone()
    }

    pub fn profiles(&self) -> Vec<ProfileEntry> {
        self.profiles.lock().unwrap().clone()
    }

    pub fn set_rss(&self, bytes: u64) {
        self.rss.store(bytes, Ordering::Relaxed);
    }
}

impl LogSink for Recorder {
    fn log(&self, worker: WorkerId, level: LogLevel, message: &str, _payload: &Value) {
        self.logs
            .lock()
            .unwrap()
            .push((worker, level, message.to_string()));
    }
}

impl Profiler for Recorder {
    fn profile(&self, worker: WorkerId, method: &str, metric: &str, _tags: &Value, value: f64) {
        self.profiles.lock().unwrap().push((
            worker,
            method.to_string(),
            metric.to_string(),
            value,
        ));
    }
}

impl MemoryProbe for Arc<Recorder> {
    fn resident_bytes(&self) -> Option<u64> {
        Some(self.rss.load(Ordering::Relaxed))
    }
}

/// Handle context wired to a recorder; resident memory starts at zero.
pub(crate) fn context(cfg: Config) -> (Context, Journal, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let valve = PressureValve::new(
        cfg.memory_limit(),
        cfg.memory_pressure_cooldown,
        Box::new(Arc::clone(&recorder)),
    );
    let ctx = Context {
        bus: Bus::new(cfg.bus_capacity_clamped()),
        timers: Timers::new(),
        logs: recorder.clone(),
        profiler: recorder.clone(),
        valve,
        cfg,
    };
    (ctx, Journal::default(), recorder)
}
