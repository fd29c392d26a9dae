// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Fair-queue: a [`Priolist`] over inbound pipes, grounded on
//! `original_source/src/protocols/utils/fq.c`.

use super::priolist::Priolist;
use crate::pipe::PipeId;

#[derive(Default)]
pub struct FairQueue {
    priolist: Priolist,
}

impl FairQueue {
    pub fn new() -> FairQueue {
        FairQueue {
            priolist: Priolist::new(),
        }
    }

    pub fn add(&mut self, _pipe: PipeId, _priority: u8) {
        // Pipes become visible to the fair queue only once they signal
        // readiness (`in`), matching `grid_fq_add` + a later `grid_fq_in`.
    }

    pub fn remove(&mut self, pipe: PipeId, priority: u8) {
        self.priolist.remove(pipe, priority);
    }

    /// The pipe reported it has a message ready (`IN`).
    pub fn on_in(&mut self, pipe: PipeId, priority: u8) {
        self.priolist.activate(pipe, priority);
    }

    pub fn can_recv(&self) -> bool {
        self.priolist.is_active()
    }

    pub fn current_pipe(&self) -> Option<PipeId> {
        self.priolist.current_pipe()
    }

    /// Call after successfully pulling a message from `current_pipe()`;
    /// `release` should be true if the pipe reported `RELEASE` (it has
    /// nothing more to give right now).
    pub fn advance(&mut self, release: bool) {
        self.priolist.advance(release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fair_queue_round_robins_across_ready_pipes() {
        let mut fq = FairQueue::new();
        fq.on_in(PipeId(1), 8);
        fq.on_in(PipeId(2), 8);

        assert!(fq.can_recv());
        assert_eq!(fq.current_pipe(), Some(PipeId(1)));
        fq.advance(false);
        assert_eq!(fq.current_pipe(), Some(PipeId(2)));
        fq.advance(false);
        assert_eq!(fq.current_pipe(), Some(PipeId(1)));
    }

    #[test]
    fn release_takes_the_pipe_out_of_rotation() {
        let mut fq = FairQueue::new();
        fq.on_in(PipeId(1), 8);
        fq.on_in(PipeId(2), 8);

        fq.advance(true);
        assert_eq!(fq.current_pipe(), Some(PipeId(2)));
        fq.advance(false);
        assert_eq!(fq.current_pipe(), Some(PipeId(2)));

        fq.on_in(PipeId(1), 8);
        assert_eq!(fq.current_pipe(), Some(PipeId(2)));
    }
}
