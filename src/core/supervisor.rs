//! # Supervisor: keeps a pool of young workers at its target size.
//!
//! The [`Supervisor`] owns every [`WorkerHandle`], the transport that creates
//! worker processes, and the single timer queue. All mutation happens on one
//! control task: [`Supervisor::step`] takes the next inbound item (worker message,
//! worker exit, operator request) or the next expired timer and applies it.
//!
//! ## Architecture
//! ```text
//!  workers ── Inbound::Message / Exited ──┐
//!  SupervisorHandle ── Restart / Shutdown ┼──► Inbox ──► step() ──► handles / pool
//!  Timers ── Death(id) / Respawn / Poll ──┘                 │
//!                                                           └──► Bus ──► SubscriberSet
//! ```
//!
//! ## Respawn evaluation
//! ```text
//! (total, young) = count_workers()
//! young == 0 ─► target > 0 ? spawn one, reschedule : nothing
//! young  > 0 ─► young < total  ? kill old workers
//!               young < target ? spawn one, reschedule
//! ```
//! Each pass spawns at most one worker; the debounced reschedule converges the
//! pool one process at a time.
//!
//! ## Rules
//! - A handle is removed as soon as it is destroyed (exit or certified death).
//! - An exit for an id that was never tracked is fatal ([`SupervisorError::UntrackedWorker`]).
//! - Shutdown finishes only when no tracked handle and no live process remain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use super::handle::{Context, Generation, WorkerHandle, WorkerState};
use super::timers::{Deadline, Slot};
use crate::error::SupervisorError;
use crate::events::{Event, EventKind};
use crate::message::ControlMessage;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::transport::{ExitInfo, Inbound, Inbox, Transport, WorkerId};

/// Outcome of one [`Supervisor::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep stepping.
    Continue,
    /// Shutdown completed; every worker is gone.
    Finished,
}

/// Point-in-time view of one tracked worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    pub pid: Option<u32>,
    pub state: WorkerState,
    pub generation: Generation,
    /// Time since the handle was created.
    pub age: Duration,
    /// Time since the handle last changed state or postponed its death.
    pub idle: Duration,
}

/// Cloneable remote control for a running supervisor.
///
/// Requests are queued behind whatever the supervisor is processing.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    inbox: Inbox,
}

impl SupervisorHandle {
    /// Requests a rolling restart of every worker.
    pub fn restart(&self) {
        self.inbox.deliver(Inbound::Restart);
    }

    /// Requests a graceful shutdown of the pool.
    pub fn shutdown(&self) {
        self.inbox.deliver(Inbound::Shutdown);
    }
}

/// Worker pool supervisor.
pub struct Supervisor<T: Transport> {
    ctx: Context,
    transport: T,
    handles: HashMap<WorkerId, WorkerHandle<T::Process>>,
    /// Ids destroyed by their death timer whose exit has not arrived yet.
    certified: HashSet<WorkerId>,
    target: usize,
    respawn: Slot,
    shutdown: Slot,
    inbox: Inbox,
    rx: mpsc::UnboundedReceiver<Inbound>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<T: Transport> Supervisor<T> {
    pub(crate) fn new(ctx: Context, transport: T, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let (inbox, rx) = Inbox::channel();
        Self {
            target: ctx.cfg.workers,
            ctx,
            transport,
            handles: HashMap::new(),
            certified: HashSet::new(),
            respawn: Slot::default(),
            shutdown: Slot::default(),
            inbox,
            rx,
            subscribers,
        }
    }

    /// Returns a remote control that can be moved to other tasks.
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            inbox: self.inbox.clone(),
        }
    }

    /// Subscribes to the supervisor's event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.ctx.bus.subscribe()
    }

    /// Number of young workers the pool converges to.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Number of tracked handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Per-worker diagnostics, ordered by id.
    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let now = Instant::now();
        let mut out: Vec<WorkerSnapshot> = self
            .handles
            .values()
            .map(|h| WorkerSnapshot {
                id: h.id(),
                pid: h.pid(),
                state: h.state(),
                generation: h.generation(),
                age: now.saturating_duration_since(h.created_at()),
                idle: now.saturating_duration_since(h.updated_at()),
            })
            .collect();
        out.sort_by_key(|s| s.id);
        out
    }

    /// Kickstarts the pool, then processes inbound items and timers until
    /// shutdown completes.
    ///
    /// Events are delivered to the configured subscribers for the whole run;
    /// the subscriber queues are drained before this returns.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let fanout = if self.subscribers.is_empty() {
            None
        } else {
            let set = Arc::new(SubscriberSet::new(std::mem::take(&mut self.subscribers)));
            let listener = set.listen(&self.ctx.bus);
            Some((set, listener))
        };

        let result = self.drive().await;

        // Dropping the bus ends the listener once it has forwarded everything.
        drop(self);
        if let Some((set, listener)) = fanout {
            let _ = listener.await;
            if let Ok(set) = Arc::try_unwrap(set) {
                set.shutdown().await;
            }
        }
        result
    }

    async fn drive(&mut self) -> Result<(), SupervisorError> {
        self.kickstart()?;
        loop {
            if self.step().await? == Step::Finished {
                return Ok(());
            }
        }
    }

    /// Processes exactly one inbound item or expired timer. Cancel safe.
    ///
    /// Inbound items take priority over timers that expired at the same time.
    pub async fn step(&mut self) -> Result<Step, SupervisorError> {
        tokio::select! {
            biased;
            Some(item) = self.rx.recv() => self.dispatch(item),
            Some(deadline) = self.ctx.timers.next(), if !self.ctx.timers.is_empty() => {
                Ok(self.on_deadline(deadline))
            }
        }
    }

    /// Spawns workers until the pool holds `target` of them.
    pub fn kickstart(&mut self) -> Result<(), SupervisorError> {
        while self.count_workers().0 < self.target {
            self.spawn_new_worker()?;
        }
        Ok(())
    }

    /// Starts one young worker and begins tracking it.
    pub fn spawn_new_worker(&mut self) -> Result<WorkerId, SupervisorError> {
        let process = match self.transport.spawn(&self.inbox) {
            Ok(process) => process,
            Err(e) => {
                self.ctx
                    .bus
                    .publish(Event::new(EventKind::SpawnFailed).with_detail(e.to_string()));
                return Err(e.into());
            }
        };

        let handle = WorkerHandle::new(process, &mut self.ctx);
        let id = handle.id();
        self.ctx.bus.publish(
            Event::new(EventKind::WorkerSpawned)
                .with_worker(id)
                .with_pid(handle.pid()),
        );
        self.handles.insert(id, handle);
        Ok(id)
    }

    /// Returns `(total, young)`.
    pub fn count_workers(&self) -> (usize, usize) {
        let mut total = 0;
        let mut young = 0;
        for h in self.handles.values().filter(|h| h.is_alive()) {
            total += 1;
            if h.generation() == Generation::Young {
                young += 1;
            }
        }
        (total, young)
    }

    /// Asks every old worker to terminate gracefully.
    pub fn kill_old_workers(&mut self) {
        for h in self.handles.values_mut() {
            if h.generation() == Generation::Old {
                h.kill();
                self.ctx.bus.publish(
                    Event::new(EventKind::OldWorkerKilled)
                        .with_worker(h.id())
                        .with_generation(Generation::Old),
                );
            }
        }
    }

    /// One rebalancing pass.
    pub fn respawn_workers(&mut self) {
        let (total, young) = self.count_workers();
        let target = self.target;

        let mut spawn = false;
        let mut kill = false;

        if young == 0 {
            if target > 0 {
                self.ctx
                    .bus
                    .publish(Event::new(EventKind::YoungGenerationDead).with_count(target));
                spawn = true;
            }
        } else {
            if young < total {
                self.ctx
                    .bus
                    .publish(Event::new(EventKind::OldGenerationAlive).with_count(total - young));
                kill = true;
            }
            if young < target {
                self.ctx
                    .bus
                    .publish(Event::new(EventKind::MoreWorkersRequired).with_count(young));
                spawn = true;
            }
        }

        if spawn {
            // A failed spawn is already published; the next pass retries.
            let _ = self.spawn_new_worker();
        }
        if kill {
            self.kill_old_workers();
        }
        if spawn {
            self.schedule_respawn_workers();
        }
    }

    /// Schedules a respawn pass unless one is already pending.
    pub fn schedule_respawn_workers(&mut self) {
        let after = self.ctx.cfg.respawn_delay;
        self.ctx
            .timers
            .arm_if_idle(&mut self.respawn, Deadline::Respawn, after);
    }

    /// Rolling restart: every current worker becomes old and is replaced.
    pub fn restart_workers(&mut self) {
        for h in self.handles.values_mut() {
            h.generation = Generation::Old;
        }
        self.ctx
            .bus
            .publish(Event::new(EventKind::RollingRestartStarted).with_count(self.handles.len()));
        self.schedule_respawn_workers();
    }

    /// Graceful shutdown: target drops to zero and every live process is asked
    /// to terminate.
    pub fn shutdown_workers(&mut self) {
        self.target = 0;
        // Goes through the transport so processes without a handle are reached too.
        let reached = self.transport.broadcast(ControlMessage::GracefullyDie);
        for h in self.handles.values_mut() {
            h.generation = Generation::Old;
        }
        self.ctx
            .bus
            .publish(Event::new(EventKind::ShutdownStarted).with_count(reached));

        let after = self.ctx.cfg.shutdown_poll;
        self.ctx
            .timers
            .arm_if_idle(&mut self.shutdown, Deadline::ShutdownPoll, after);
    }

    /// Shutdown poll: finishes when nothing is left, otherwise polls again.
    fn shutdown_workers_loop(&mut self) -> Step {
        let remaining = self.handles.len().max(self.transport.live_count());
        if remaining == 0 {
            self.ctx.bus.publish(Event::new(EventKind::AllWorkersGone));
            return Step::Finished;
        }

        self.ctx
            .bus
            .publish(Event::new(EventKind::ShutdownProgress).with_count(remaining));
        let after = self.ctx.cfg.shutdown_poll;
        self.ctx
            .timers
            .arm_if_idle(&mut self.shutdown, Deadline::ShutdownPoll, after);
        Step::Continue
    }

    fn dispatch(&mut self, item: Inbound) -> Result<Step, SupervisorError> {
        match item {
            Inbound::Message { id, message } => match self.handles.get_mut(&id) {
                Some(h) => h.handle_message(message, &mut self.ctx),
                None => tracing::trace!(worker = id.get(), "message from untracked worker dropped"),
            },
            Inbound::Exited { id, exit } => self.handle_exit(id, exit)?,
            Inbound::Restart => self.restart_workers(),
            Inbound::Shutdown => self.shutdown_workers(),
        }
        Ok(Step::Continue)
    }

    fn handle_exit(&mut self, id: WorkerId, exit: ExitInfo) -> Result<(), SupervisorError> {
        match self.handles.remove(&id) {
            Some(mut h) => {
                self.ctx.bus.publish(
                    Event::new(EventKind::WorkerExited)
                        .with_worker(id)
                        .with_pid(h.pid())
                        .with_exit(exit),
                );
                h.certify_death(&mut self.ctx);
            }
            None if self.certified.remove(&id) => {
                tracing::debug!(worker = id.get(), "certified worker exited");
            }
            None => return Err(SupervisorError::UntrackedWorker { id }),
        }
        self.schedule_respawn_workers();
        Ok(())
    }

    fn on_deadline(&mut self, deadline: Deadline) -> Step {
        match deadline {
            Deadline::Death(id) => {
                if let Some(mut h) = self.handles.remove(&id) {
                    h.on_death_timer(&mut self.ctx);
                    self.certified.insert(id);
                    self.schedule_respawn_workers();
                }
                Step::Continue
            }
            Deadline::Respawn => {
                self.respawn.expire();
                self.respawn_workers();
                Step::Continue
            }
            Deadline::ShutdownPoll => {
                self.shutdown.expire();
                self.shutdown_workers_loop()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::testing::{context, Journal, ScriptedTransport};
    use crate::message::WorkerMessage;

    fn pool(workers: usize) -> (Supervisor<ScriptedTransport>, Journal) {
        let (ctx, _, _) = context(Config {
            workers,
            ..Config::default()
        });
        let (transport, journal) = ScriptedTransport::new();
        (Supervisor::new(ctx, transport, Vec::new()), journal)
    }

    fn id(raw: u64) -> WorkerId {
        WorkerId::new(raw)
    }

    fn tell(sup: &Supervisor<ScriptedTransport>, raw: u64, message: WorkerMessage) {
        sup.inbox.deliver(Inbound::Message {
            id: id(raw),
            message,
        });
    }

    fn exit(sup: &Supervisor<ScriptedTransport>, journal: &Journal, raw: u64) {
        journal.exit(id(raw));
        sup.inbox.deliver(Inbound::Exited {
            id: id(raw),
            exit: ExitInfo::default(),
        });
    }

    /// Every tracked worker reports `alive`.
    fn greet_all(sup: &Supervisor<ScriptedTransport>) {
        for s in sup.snapshot() {
            tell(sup, s.id.get(), WorkerMessage::Alive);
        }
    }

    /// Live processes asked to terminate gracefully exit.
    fn reap(sup: &Supervisor<ScriptedTransport>, journal: &Journal) {
        for wid in journal.live() {
            if journal.sent_to(wid).contains(&ControlMessage::GracefullyDie) {
                exit(sup, journal, wid.get());
            }
        }
    }

    async fn run_for(sup: &mut Supervisor<ScriptedTransport>, dur: Duration) -> Step {
        let deadline = Instant::now() + dur;
        loop {
            match tokio::time::timeout_at(deadline, sup.step()).await {
                Ok(Ok(Step::Finished)) => return Step::Finished,
                Ok(Ok(Step::Continue)) => {}
                Ok(Err(e)) => panic!("supervisor failed: {e}"),
                Err(_) => return Step::Continue,
            }
        }
    }

    fn ids(sup: &Supervisor<ScriptedTransport>) -> Vec<u64> {
        sup.snapshot().iter().map(|s| s.id.get()).collect()
    }

    fn all_young(sup: &Supervisor<ScriptedTransport>) -> bool {
        sup.snapshot()
            .iter()
            .all(|s| s.generation == Generation::Young)
    }

    #[tokio::test(start_paused = true)]
    async fn kickstart_fills_pool_with_young_workers() {
        let (mut sup, _) = pool(3);
        sup.kickstart().unwrap();

        assert_eq!(sup.count_workers(), (3, 3));
        assert!(sup
            .snapshot()
            .iter()
            .all(|s| s.state == WorkerState::Unknown && s.generation == Generation::Young));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_timeouts_do_not_break_the_timer_queue() {
        let (ctx, _, _) = context(Config {
            workers: 2,
            startup_grace: Duration::from_secs(100_000_000),
            heartbeat_timeout: Duration::MAX,
            cooldown_timeout: Duration::from_secs(u64::MAX / 2),
            ..Config::default()
        });
        let (transport, _journal) = ScriptedTransport::new();
        let mut sup = Supervisor::new(ctx, transport, Vec::new());

        sup.kickstart().unwrap();
        tell(&sup, 1, WorkerMessage::Alive);
        tell(&sup, 2, WorkerMessage::Heartbeat);
        run_for(&mut sup, Duration::from_secs(60)).await;

        assert_eq!(sup.count_workers(), (2, 2));
        assert_eq!(sup.snapshot()[0].state, WorkerState::Alive);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_worker_is_replaced() {
        let (mut sup, journal) = pool(3);
        sup.kickstart().unwrap();
        tell(&sup, 1, WorkerMessage::Alive);
        tell(&sup, 2, WorkerMessage::Alive);

        run_for(&mut sup, Duration::from_millis(4_500)).await;
        assert_eq!(ids(&sup), vec![1, 2, 3]);

        // Grace expires at 5s, the replacement is spawned at 6s.
        run_for(&mut sup, Duration::from_secs(2)).await;
        assert_eq!(ids(&sup), vec![1, 2, 4]);
        assert_eq!(journal.killed(), vec![id(3)]);
        tell(&sup, 4, WorkerMessage::Alive);

        for _ in 0..3 {
            for raw in [1, 2, 4] {
                tell(&sup, raw, WorkerMessage::Heartbeat);
            }
            run_for(&mut sup, Duration::from_secs(20)).await;
        }

        assert_eq!(ids(&sup), vec![1, 2, 4]);
        assert!(all_young(&sup));
        assert_eq!(sup.count_workers(), (3, 3));

        // The exit of the certified worker arrives late and is absorbed.
        exit(&sup, &journal, 3);
        assert_eq!(sup.step().await.unwrap(), Step::Continue);
        assert_eq!(ids(&sup), vec![1, 2, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_young_generation_is_resurrected_one_per_pass() {
        let (mut sup, journal) = pool(3);
        let mut events = sup.subscribe();
        sup.kickstart().unwrap();
        greet_all(&sup);
        for raw in 1..=3 {
            exit(&sup, &journal, raw);
        }

        run_for(&mut sup, Duration::from_millis(1_500)).await;
        assert_eq!(ids(&sup), vec![4]);

        run_for(&mut sup, Duration::from_secs(3)).await;
        assert_eq!(ids(&sup), vec![4, 5, 6]);
        assert!(all_young(&sup));

        let mut resurrections = 0;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::YoungGenerationDead {
                resurrections += 1;
                assert_eq!(ev.count, Some(3));
            }
        }
        assert_eq!(resurrections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rolling_restart_replaces_every_worker() {
        let (mut sup, journal) = pool(2);
        sup.kickstart().unwrap();
        greet_all(&sup);
        sup.handle().restart();
        run_for(&mut sup, Duration::from_millis(250)).await;

        for _ in 0..6 {
            run_for(&mut sup, Duration::from_millis(500)).await;
            greet_all(&sup);
            reap(&sup, &journal);
        }

        assert_eq!(ids(&sup), vec![3, 4]);
        assert!(all_young(&sup));
        for old in [1, 2] {
            assert!(journal
                .sent_to(id(old))
                .contains(&ControlMessage::GracefullyDie));
        }
        assert!(journal
            .sent_to(id(3))
            .iter()
            .all(|m| *m != ControlMessage::GracefullyDie));
    }

    #[tokio::test(start_paused = true)]
    async fn balanced_pool_does_not_reschedule() {
        let (mut sup, _) = pool(2);
        sup.kickstart().unwrap();
        sup.respawn_workers();

        assert!(!sup.respawn.is_armed());
        assert_eq!(sup.count_workers(), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn respawn_is_debounced() {
        let (mut sup, _) = pool(1);
        sup.schedule_respawn_workers();
        sup.schedule_respawn_workers();
        sup.schedule_respawn_workers();

        assert_eq!(sup.ctx.timers.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_every_worker() {
        let (mut sup, journal) = pool(2);
        let mut events = sup.subscribe();
        sup.kickstart().unwrap();
        greet_all(&sup);
        sup.handle().shutdown();

        assert_eq!(run_for(&mut sup, Duration::from_millis(3_500)).await, Step::Continue);
        assert_eq!(sup.target(), 0);
        assert_eq!(journal.broadcasts(), vec![ControlMessage::GracefullyDie]);
        assert!(sup
            .snapshot()
            .iter()
            .all(|s| s.generation == Generation::Old));

        reap(&sup, &journal);
        assert_eq!(run_for(&mut sup, Duration::from_secs(5)).await, Step::Finished);
        assert!(sup.is_empty());
        assert!(journal.live().is_empty());

        let kinds: Vec<EventKind> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert!(kinds.contains(&EventKind::ShutdownStarted));
        assert!(kinds.contains(&EventKind::ShutdownProgress));
        assert_eq!(kinds.last(), Some(&EventKind::AllWorkersGone));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_also_waits_for_untracked_processes() {
        let (mut sup, journal) = pool(0);
        // A live process the pool does not track.
        let _stray = journal.process(id(77));
        sup.shutdown_workers();

        assert_eq!(journal.sent_to(id(77)), vec![ControlMessage::GracefullyDie]);
        assert_eq!(run_for(&mut sup, Duration::from_millis(2_500)).await, Step::Continue);

        journal.exit(id(77));
        assert_eq!(run_for(&mut sup, Duration::from_secs(2)).await, Step::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_of_untracked_worker_is_fatal() {
        let (mut sup, _) = pool(1);
        sup.kickstart().unwrap();
        sup.inbox.deliver(Inbound::Exited {
            id: id(99),
            exit: ExitInfo::default(),
        });

        let err = sup.step().await.unwrap_err();
        assert!(matches!(err, SupervisorError::UntrackedWorker { id } if id.get() == 99));
        assert!(err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn exit_destroys_handle_and_schedules_respawn() {
        let (mut sup, journal) = pool(2);
        let mut events = sup.subscribe();
        sup.kickstart().unwrap();
        exit(&sup, &journal, 1);

        sup.step().await.unwrap();
        assert_eq!(ids(&sup), vec![2]);
        assert!(sup.respawn.is_armed());

        let exited = std::iter::from_fn(|| events.try_recv().ok())
            .find(|e| e.kind == EventKind::WorkerExited)
            .unwrap();
        assert_eq!(exited.worker, Some(id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_failure_is_retried_on_next_pass() {
        let (mut sup, journal) = pool(2);
        let mut events = sup.subscribe();
        sup.kickstart().unwrap();
        greet_all(&sup);
        exit(&sup, &journal, 2);
        journal.refuse_spawns(1);

        run_for(&mut sup, Duration::from_millis(1_500)).await;
        assert_eq!(ids(&sup), vec![1]);
        assert!(sup.respawn.is_armed());
        assert!(std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| e.kind == EventKind::SpawnFailed));

        run_for(&mut sup, Duration::from_secs(1)).await;
        assert_eq!(ids(&sup), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn kickstart_reports_spawn_failure() {
        let (mut sup, journal) = pool(2);
        journal.refuse_spawns(1);

        let err = sup.kickstart().unwrap_err();
        assert_eq!(err.as_label(), "supervisor_spawn_failed");
        assert!(sup.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn messages_for_unknown_workers_are_dropped() {
        let (mut sup, _) = pool(1);
        sup.kickstart().unwrap();
        tell(&sup, 42, WorkerMessage::Alive);

        assert_eq!(sup.step().await.unwrap(), Step::Continue);
        assert_eq!(sup.snapshot()[0].state, WorkerState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_after_shutdown() {
        let (sup, journal) = pool(2);
        let handle = sup.handle();
        let task = tokio::spawn(sup.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(journal.live().len(), 2);
        handle.shutdown();
        tokio::time::sleep(Duration::from_millis(100)).await;
        for wid in journal.live() {
            journal.exit(wid);
            handle.inbox.deliver(Inbound::Exited {
                id: wid,
                exit: ExitInfo::default(),
            });
        }

        let result = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
