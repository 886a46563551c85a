//! # SubscriberSet: per-subscriber queues fed from the event bus.
//!
//! Every [`Subscribe`] implementation gets its own bounded queue and task, so a
//! slow or panicking subscriber never holds up the others or the control task.
//!
//! ```text
//! Bus ──► listen() ──► emit(Event) ──┬──► [queue] ─► task ─► LogWriter::on_event
//!                                    └──► [queue] ─► task ─► custom::on_event
//! ```
//!
//! ## Rules
//! - `emit` never waits; a full or closed queue drops the event for that
//!   subscriber only (with a warning naming the subscriber and event kind).
//! - Each subscriber sees events in publication order; subscribers are not
//!   ordered relative to each other.
//! - A panic in `on_event` is caught and logged; the subscriber keeps running.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::{sync::mpsc, task::JoinHandle};

use super::Subscribe;
use crate::events::{Bus, Event};

struct Queue {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out over a fixed list of subscribers.
pub struct SubscriberSet {
    queues: Vec<Queue>,
    tasks: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Starts one delivery task per subscriber. Must run inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let (queues, tasks) = subs
            .into_iter()
            .map(|sub| {
                let name = sub.name();
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                (Queue { name, tx }, tokio::spawn(deliver(sub, rx)))
            })
            .unzip();
        Self { queues, tasks }
    }

    /// Spawns a task that emits everything published on `bus` until the bus is dropped.
    pub fn listen(self: &Arc<Self>, bus: &Bus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        let set = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(ev),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "subscriber fan-out fell behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Queues `event` for every subscriber without waiting.
    pub fn emit(&self, event: Event) {
        let kind = event.kind;
        let ev = Arc::new(event);
        for q in &self.queues {
            match q.tx.try_send(Arc::clone(&ev)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = q.name, ?kind, "event dropped: queue full");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(subscriber = q.name, ?kind, "event dropped: subscriber gone");
                }
            }
        }
    }

    /// Closes every queue and waits until each subscriber has drained its backlog.
    pub async fn shutdown(self) {
        drop(self.queues);
        for task in self.tasks {
            let _ = task.await;
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }
}

async fn deliver(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let fut = std::panic::AssertUnwindSafe(sub.on_event(&ev));
        if let Err(panic) = fut.catch_unwind().await {
            tracing::error!(subscriber = sub.name(), ?panic, "subscriber panicked");
        }
    }
}
