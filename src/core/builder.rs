use std::sync::Arc;

use super::handle::Context;
use super::supervisor::Supervisor;
use super::timers::Timers;
use crate::{
    config::Config,
    events::Bus,
    sinks::{LogSink, MemoryProbe, PressureValve, ProcStatus, Profiler, TracingLogSink, TracingProfiler},
    subscribers::{LogWriter, Subscribe},
    transport::Transport,
};

/// Builder for constructing a [`Supervisor`] over a transport.
///
/// Defaults: [`LogWriter`] as the only subscriber, [`TracingLogSink`],
/// [`TracingProfiler`] and [`ProcStatus`] for memory pressure.
pub struct SupervisorBuilder<T: Transport> {
    cfg: Config,
    transport: T,
    subscribers: Vec<Arc<dyn Subscribe>>,
    logs: Arc<dyn LogSink>,
    profiler: Arc<dyn Profiler>,
    probe: Box<dyn MemoryProbe>,
}

impl<T: Transport> SupervisorBuilder<T> {
    /// Creates a new builder with the given configuration and transport.
    pub fn new(cfg: Config, transport: T) -> Self {
        Self {
            cfg,
            transport,
            subscribers: vec![Arc::new(LogWriter::new())],
            logs: Arc::new(TracingLogSink),
            profiler: Arc::new(TracingProfiler),
            probe: Box::new(ProcStatus),
        }
    }

    /// Replaces the event subscribers.
    ///
    /// Pass an empty vector to run without any.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets where worker `log` messages go.
    pub fn with_log_sink(mut self, logs: Arc<dyn LogSink>) -> Self {
        self.logs = logs;
        self
    }

    /// Sets where worker `profile` messages go.
    pub fn with_profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.profiler = profiler;
        self
    }

    /// Sets how the supervisor measures its own resident memory.
    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Builds the supervisor. Nothing is spawned until [`Supervisor::run`]
    /// or [`Supervisor::kickstart`].
    pub fn build(self) -> Supervisor<T> {
        let valve = PressureValve::new(
            self.cfg.memory_limit(),
            self.cfg.memory_pressure_cooldown,
            self.probe,
        );
        let ctx = Context {
            bus: Bus::new(self.cfg.bus_capacity_clamped()),
            timers: Timers::new(),
            logs: self.logs,
            profiler: self.profiler,
            valve,
            cfg: self.cfg,
        };
        Supervisor::new(ctx, self.transport, self.subscribers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ScriptedTransport;

    #[tokio::test]
    async fn build_uses_configured_target() {
        let (transport, journal) = ScriptedTransport::new();
        let cfg = Config {
            workers: 4,
            ..Config::default()
        };
        let mut sup = SupervisorBuilder::new(cfg, transport)
            .with_subscribers(Vec::new())
            .build();

        assert_eq!(sup.target(), 4);
        assert!(journal.live().is_empty());

        sup.kickstart().unwrap();
        assert_eq!(sup.len(), 4);
        assert_eq!(journal.live().len(), 4);
    }
}
