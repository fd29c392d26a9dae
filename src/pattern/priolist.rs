// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Sixteen priority slots, each a round-robin ring of pipes. Grounded on
//! `original_source/src/protocols/utils/priolist.c`'s intrusive-list
//! algorithm, reimplemented with a `VecDeque` per slot instead of
//! `container_of`-recovered list nodes — the "current" pipe per slot is
//! just the deque's front.

use std::collections::VecDeque;

use crate::pipe::PipeId;

pub const SLOTS: usize = 16;

#[derive(Default)]
struct Slot {
    ready: VecDeque<PipeId>,
}

/// A 16-slot round-robin priority queue of pipes (1 = highest priority).
pub struct Priolist {
    slots: [Slot; SLOTS],
    current: Option<u8>,
}

impl Priolist {
    pub fn new() -> Priolist {
        Priolist {
            slots: Default::default(),
            current: None,
        }
    }

    fn slot_index(priority: u8) -> usize {
        debug_assert!((1..=SLOTS as u8).contains(&priority));
        (priority - 1) as usize
    }

    /// Marks `pipe` ready to be picked by [`Priolist::current_pipe`]. A
    /// pipe not yet marked ready (e.g. freshly added but waiting for its
    /// first `IN`/`OUT` signal) is invisible to `current_pipe`/`advance`.
    pub fn activate(&mut self, pipe: PipeId, priority: u8) {
        let idx = Self::slot_index(priority);
        self.slots[idx].ready.push_back(pipe);

        match self.current {
            None => self.current = Some(priority),
            Some(cur) if cur > priority => self.current = Some(priority),
            Some(_) => {}
        }
    }

    /// Removes `pipe` entirely (pipe is gone, not just temporarily
    /// unready).
    pub fn remove(&mut self, pipe: PipeId, priority: u8) {
        let idx = Self::slot_index(priority);
        self.slots[idx].ready.retain(|&p| p != pipe);

        if self.current == Some(priority) {
            self.advance_current_if_empty();
        }
    }

    fn advance_current_if_empty(&mut self) {
        let mut p = match self.current {
            Some(p) => p,
            None => return,
        };
        while self.slots[Self::slot_index(p)].ready.is_empty() {
            if p as usize == SLOTS {
                self.current = None;
                return;
            }
            p += 1;
        }
        self.current = Some(p);
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_priority(&self) -> Option<u8> {
        self.current
    }

    /// The pipe that the next `recv`/`send` should use, without consuming
    /// its turn.
    pub fn current_pipe(&self) -> Option<PipeId> {
        let p = self.current?;
        self.slots[Self::slot_index(p)].ready.front().copied()
    }

    /// Moves the round-robin pointer for the current slot forward. If
    /// `release`, the current pipe is detached entirely instead of being
    /// rotated to the back — the caller must call `activate` again to put
    /// it back in rotation (mirrors `GRID_PIPE_RELEASE`).
    pub fn advance(&mut self, release: bool) {
        let p = match self.current {
            Some(p) => p,
            None => return,
        };
        let slot = &mut self.slots[Self::slot_index(p)];
        if let Some(pipe) = slot.ready.pop_front() {
            if !release {
                slot.ready.push_back(pipe);
            }
        }
        self.advance_current_if_empty();
    }
}

impl Default for Priolist {
    fn default() -> Priolist {
        Priolist::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_priority_is_lowest_nonempty_slot() {
        let mut pl = Priolist::new();
        assert_eq!(pl.current_priority(), None);

        pl.activate(PipeId(1), 5);
        assert_eq!(pl.current_priority(), Some(5));

        pl.activate(PipeId(2), 2);
        assert_eq!(pl.current_priority(), Some(2));

        pl.remove(PipeId(2), 2);
        assert_eq!(pl.current_priority(), Some(5));
    }

    #[test]
    fn round_robin_within_a_slot_visits_every_pipe() {
        let mut pl = Priolist::new();
        pl.activate(PipeId(1), 4);
        pl.activate(PipeId(2), 4);
        pl.activate(PipeId(3), 4);

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(pl.current_pipe().unwrap());
            pl.advance(false);
        }

        assert_eq!(
            seen,
            vec![
                PipeId(1),
                PipeId(2),
                PipeId(3),
                PipeId(1),
                PipeId(2),
                PipeId(3),
            ]
        );
    }

    #[test]
    fn release_detaches_the_pipe_until_reactivated() {
        let mut pl = Priolist::new();
        pl.activate(PipeId(1), 1);
        pl.activate(PipeId(2), 1);

        assert_eq!(pl.current_pipe(), Some(PipeId(1)));
        pl.advance(true);
        assert_eq!(pl.current_pipe(), Some(PipeId(2)));

        pl.advance(false);
        assert_eq!(pl.current_pipe(), Some(PipeId(2)));
    }

    #[test]
    fn becomes_inactive_when_every_slot_empties() {
        let mut pl = Priolist::new();
        pl.activate(PipeId(1), 16);
        pl.advance(true);

        assert!(!pl.is_active());
        assert_eq!(pl.current_pipe(), None);
    }

    #[test]
    fn no_pipe_is_skipped_more_than_n_minus_one_turns_in_a_row() {
        // Invariant 9/10: among N equally-prioritised ready pipes delivering
        // steadily, no pipe's consecutive skipped turns exceeds N-1.
        let mut pl = Priolist::new();
        for i in 1..=4u64 {
            pl.activate(PipeId(i), 7);
        }

        let mut last_seen_at = [0usize; 5];
        let mut max_gap = 0usize;
        for turn in 0..40 {
            let PipeId(id) = pl.current_pipe().unwrap();
            let gap = turn - last_seen_at[id as usize];
            max_gap = max_gap.max(gap);
            last_seen_at[id as usize] = turn;
            pl.advance(false);
        }

        assert!(max_gap <= 4);
    }
}
