//! Tick-based delayed-action scheduler.
//!
//! Actions are plain values rather than callbacks: the owner pulls due
//! actions out with [`Scheduler::run_actions`] and executes them itself,
//! so nothing runs while the scheduler is borrowed.

use std::collections::BTreeMap;

use tracing::debug;

/// Handle returned for a queued action; used to cancel it before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionHandle {
    fire_at: u64,
    seq: u64,
}

/// Outcome of [`Scheduler::after`].
#[derive(Debug, PartialEq)]
pub enum Scheduled<A> {
    /// Zero delay: the caller must execute the action now.
    Now(A),
    /// Queued for a later tick.
    Later(ActionHandle),
}

/// Queue of `(fire_at, action)` pairs ordered by fire tick then insertion.
#[derive(Debug)]
pub struct Scheduler<A> {
    now: u64,
    next_seq: u64,
    queue: BTreeMap<(u64, u64), A>,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            now: 0,
            next_seq: 0,
            queue: BTreeMap::new(),
        }
    }

    /// Sets the current tick that delays are measured from.
    pub fn begin_tick(&mut self, tick: u64) {
        self.now = tick;
    }

    /// Schedules `action` to fire `delay` ticks from now.
    ///
    /// # Returns
    ///
    /// `Scheduled::Now(action)` when `delay` is zero (nothing is queued),
    /// otherwise a handle that can be passed to [`Scheduler::cancel`].
    pub fn after(&mut self, delay: u64, action: A) -> Scheduled<A> {
        if delay == 0 {
            return Scheduled::Now(action);
        }
        let handle = ActionHandle {
            fire_at: self.now + delay,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.queue.insert((handle.fire_at, handle.seq), action);
        debug!(fire_at = handle.fire_at, "action scheduled");
        Scheduled::Later(handle)
    }

    /// Removes and returns every action due at exactly `tick`, in the order
    /// they were scheduled.
    ///
    /// Must be called once per tick even when nothing is queued. A second
    /// call for the same tick returns nothing.
    pub fn run_actions(&mut self, tick: u64) -> Vec<A> {
        let later = self.queue.split_off(&(tick + 1, 0));
        let due = std::mem::replace(&mut self.queue, later);
        let mut fired = Vec::new();
        for ((fire_at, seq), action) in due {
            if fire_at == tick {
                fired.push(action);
            } else {
                // Missed ticks stay queued; they can only be cancelled.
                self.queue.insert((fire_at, seq), action);
            }
        }
        fired
    }

    /// Cancels a pending action.
    ///
    /// # Returns
    ///
    /// The action if it was still queued.
    pub fn cancel(&mut self, handle: ActionHandle) -> Option<A> {
        let removed = self.queue.remove(&(handle.fire_at, handle.seq));
        if removed.is_some() {
            debug!(fire_at = handle.fire_at, "action cancelled");
        }
        removed
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
