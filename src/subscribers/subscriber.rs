//! # Subscribe: plug custom handlers into supervisor events.
//!
//! Implementations receive every [`Event`] the supervisor publishes (spawns,
//! deaths, exits, restart and shutdown progress) on a task of their own, fed by
//! a bounded queue owned by [`SubscriberSet`](super::SubscriberSet).
//! A subscriber that cannot keep up loses events; it never slows the pool down.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use async_trait::async_trait;
//! use poolvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct DeathCounter(AtomicUsize);
//!
//! #[async_trait]
//! impl Subscribe for DeathCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerDead {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "death-counter"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receiver of supervisor events.
///
/// `on_event` runs on the subscriber's own task; blocking in it only delays
/// this subscriber's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used when this subscriber's queue overflows or it panics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered for this subscriber before new ones are dropped (min 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
