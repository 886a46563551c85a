//! # Single-slot scheduled tasks.
//!
//! All supervisor timers live in one [`DelayQueue`] polled by the control task, so
//! an expired timer is just another item processed in turn. Every owner keeps a
//! [`Slot`] holding at most one pending key:
//!
//! ```text
//! arm(slot, d)  : remove slot.key (if any) ─► insert ─► slot.key = new key
//! disarm(slot)  : remove slot.key (if any)
//! next()        : expired Deadline ─► owner calls slot.expire()
//! ```
//!
//! ## Rules
//! - A slot holds at most one key; arming replaces, never stacks.
//! - A key in a slot is always pending in the queue: the owner clears its slot
//!   (`expire`) as soon as the deadline is yielded, before anything else.
//! - Delays are capped at [`MAX_DELAY`]; the delay queue's wheel cannot hold
//!   deadlines much beyond two years.

use std::future::poll_fn;
use std::time::Duration;

use tokio_util::time::{delay_queue::Key, DelayQueue};

use crate::transport::WorkerId;

/// Longest delay a timer is armed with; longer requests are shortened to this.
pub(crate) const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// What a timer fires for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deadline {
    /// A worker's death timer.
    Death(WorkerId),
    /// The debounced respawn evaluation.
    Respawn,
    /// The shutdown poll.
    ShutdownPoll,
}

/// At most one pending timer owned by a handle or by the pool.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    key: Option<Key>,
}

impl Slot {
    /// True while a timer is pending.
    pub fn is_armed(&self) -> bool {
        self.key.is_some()
    }

    /// Forgets the key of a timer that was just yielded by [`Timers::next`].
    pub fn expire(&mut self) {
        self.key = None;
    }
}

/// Queue of every pending supervisor timer.
pub(crate) struct Timers {
    queue: DelayQueue<Deadline>,
}

impl Timers {
    pub fn new() -> Self {
        Self {
            queue: DelayQueue::new(),
        }
    }

    /// Arms `slot`, cancelling whatever it held.
    pub fn arm(&mut self, slot: &mut Slot, deadline: Deadline, after: Duration) {
        self.disarm(slot);
        slot.key = Some(self.queue.insert(deadline, after.min(MAX_DELAY)));
    }

    /// Arms `slot` only if nothing is pending in it. Returns whether it armed.
    pub fn arm_if_idle(&mut self, slot: &mut Slot, deadline: Deadline, after: Duration) -> bool {
        if slot.is_armed() {
            return false;
        }
        slot.key = Some(self.queue.insert(deadline, after.min(MAX_DELAY)));
        true
    }

    /// Cancels the timer held by `slot`, if any.
    pub fn disarm(&mut self, slot: &mut Slot) {
        if let Some(key) = slot.key.take() {
            self.queue.remove(&key);
        }
    }

    /// Waits for the next expired deadline. Cancel safe.
    pub async fn next(&mut self) -> Option<Deadline> {
        poll_fn(|cx| self.queue.poll_expired(cx))
            .await
            .map(|expired| expired.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
