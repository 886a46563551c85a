//! # Event bus for supervisor events.
//!
//! The control task is the only publisher. Everyone else holds a receiver:
//!
//! ```text
//! control task ── publish ──► Bus ──┬──► SubscriberSet::listen ──► subscribers
//!                                   └──► Supervisor::subscribe receivers
//! ```
//!
//! ## Rules
//! - `publish()` never blocks the control task.
//! - One ring buffer of `capacity` events is shared by every receiver; a receiver
//!   that falls behind sees `RecvError::Lagged(n)` and loses the `n` oldest events.
//! - Events published while nobody listens are gone.
//! - Receivers see `RecvError::Closed` once the supervisor is dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for supervisor events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus keeping at most `capacity` (min 1) undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes `ev` to current receivers; dropped when there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn slow_receiver_lags_behind_small_ring() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(Event::new(EventKind::ShutdownProgress));
        }

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(3))));
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::ShutdownProgress);
    }

    #[test]
    fn receivers_close_with_the_bus() {
        let bus = Bus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::AllWorkersGone));
        drop(bus);

        assert_eq!(rx.try_recv().unwrap().kind, EventKind::AllWorkersGone);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
    }
}
