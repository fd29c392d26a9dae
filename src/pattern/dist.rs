// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Distributor: an unordered set of outbound pipes ready to receive a
//! broadcast, grounded on `original_source/src/protocols/utils/dist.c`.
//! Unlike [`crate::pattern::lb::LoadBalance`] every ready pipe gets a copy
//! of each message (PUB, BUS, SURVEYOR sends), not just one. This type only
//! tracks membership; the actual `pipe.send(msg.bulkcopy())` fan-out and
//! the `RELEASE`-driven `on_release` callback live in the owning socket
//! type (see `proto::xpub`, `proto::bus`, `proto::surveyor`).

use std::collections::HashSet;

use crate::pipe::PipeId;

#[derive(Default)]
pub struct Distributor {
    ready: HashSet<PipeId>,
}

impl Distributor {
    pub fn new() -> Distributor {
        Distributor {
            ready: HashSet::new(),
        }
    }

    pub fn remove(&mut self, pipe: PipeId) {
        self.ready.remove(&pipe);
    }

    /// Pipe reported `OUT`: it rejoins the broadcast rotation.
    pub fn on_out(&mut self, pipe: PipeId) {
        self.ready.insert(pipe);
    }

    /// Pipe returned `RELEASE` from the last send: detach until it signals
    /// `OUT` again.
    pub fn on_release(&mut self, pipe: PipeId) {
        self.ready.remove(&pipe);
    }

    pub fn count(&self) -> usize {
        self.ready.len()
    }

    /// Every pipe that should receive a copy of the next broadcast,
    /// `exclude` skipped (BUS excludes the originating pipe).
    pub fn targets(&self, exclude: Option<PipeId>) -> Vec<PipeId> {
        self.ready
            .iter()
            .copied()
            .filter(|p| Some(*p) != exclude)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_excludes_the_source_pipe() {
        let mut dist = Distributor::new();
        dist.on_out(PipeId(1));
        dist.on_out(PipeId(2));
        dist.on_out(PipeId(3));

        let mut targets = dist.targets(Some(PipeId(2)));
        targets.sort_by_key(|p| p.0);

        assert_eq!(targets, vec![PipeId(1), PipeId(3)]);
    }

    #[test]
    fn released_pipes_stop_receiving_until_out_again() {
        let mut dist = Distributor::new();
        dist.on_out(PipeId(1));
        dist.on_release(PipeId(1));

        assert!(dist.targets(None).is_empty());

        dist.on_out(PipeId(1));
        assert_eq!(dist.targets(None), vec![PipeId(1)]);
    }
}
