// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Cooperative, cancellable, at-most-once timers owned by a [`Worker`](super::Worker).

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

impl TimerId {
    pub fn next() -> TimerId {
        TimerId(NEXT_TIMER_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// A live timer's cancellation flag, shared between the scheduling side and
/// the worker's min-heap entry. Cancelling after the timer already fired is
/// a harmless no-op, matching the "fire at-most-once between start and stop"
/// invariant.
#[derive(Clone)]
pub struct TimerHandle {
    pub(crate) id: TimerId,
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub(crate) fn new(id: TimerId) -> (TimerHandle, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            TimerHandle {
                id,
                cancelled: flag.clone(),
            },
            flag,
        )
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

pub(crate) struct TimerEntry {
    pub deadline: Instant,
    pub id: TimerId,
    pub cancelled: Arc<AtomicBool>,
    pub callback: Box<dyn FnOnce() + Send>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for TimerEntry {}

// BinaryHeap in std is a max-heap; we want the earliest deadline first, so
// the ordering is reversed here rather than wrapping every push in
// `std::cmp::Reverse`.
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `min(ivl_max, ivl * 2^n)`, reset to `n = 0` on a successful connection, as
/// required by invariant 3 / scenario S5. `ivl_max == 0` disables backoff
/// growth and the interval stays constant at `ivl`.
pub fn reconnect_backoff(ivl_ms: u64, ivl_max_ms: u64, attempt: u32) -> u64 {
    if ivl_max_ms == 0 {
        return ivl_ms;
    }
    let scaled = ivl_ms.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
    scaled.min(ivl_max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(reconnect_backoff(50, 400, 0), 50);
        assert_eq!(reconnect_backoff(50, 400, 1), 100);
        assert_eq!(reconnect_backoff(50, 400, 2), 200);
        assert_eq!(reconnect_backoff(50, 400, 3), 400);
        assert_eq!(reconnect_backoff(50, 400, 10), 400);
    }

    #[test]
    fn zero_max_means_constant_interval() {
        for n in 0..5 {
            assert_eq!(reconnect_backoff(100, 0, n), 100);
        }
    }
}
