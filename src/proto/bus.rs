// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! BUS: full-mesh broadcast, every connected peer gets every message this
//! socket sends and nothing it didn't. Grounded on
//! `original_source/src/protocols/bus/bus.c`, the `xsurveyor`/`Pub`
//! dist+fq combination generalized to two-way traffic.

use std::collections::HashMap;

use crate::message::Message;
use crate::pattern::{Distributor, FairQueue};
use crate::pipe::PipeId;

use super::{Protocol, RecvDecision, SendDecision};

pub const PROTOCOL_ID: u16 = 0x70; // BUS = 7 << 4 | 0
pub const PEER_PROTOCOL_ID: u16 = 0x70;

#[derive(Default)]
pub struct Bus {
    outpipes: Distributor,
    inpipes: FairQueue,
    priority: HashMap<PipeId, u8>,
}

impl Bus {
    pub fn new() -> Bus {
        Bus::default()
    }
}

impl Protocol for Bus {
    fn protocol_id(&self) -> u16 {
        PROTOCOL_ID
    }

    fn peer_protocol_id(&self) -> u16 {
        PEER_PROTOCOL_ID
    }

    fn name(&self) -> &'static str {
        "bus"
    }

    fn add_pipe(&mut self, id: PipeId, _send_priority: u8, recv_priority: u8) {
        self.priority.insert(id, recv_priority);
    }

    fn remove_pipe(&mut self, id: PipeId) {
        self.outpipes.remove(id);
        if let Some(priority) = self.priority.remove(&id) {
            self.inpipes.remove(id, priority);
        }
    }

    fn on_pipe_out(&mut self, id: PipeId) {
        self.outpipes.on_out(id);
    }

    fn on_pipe_in(&mut self, id: PipeId) {
        if let Some(&priority) = self.priority.get(&id) {
            self.inpipes.on_in(id, priority);
        }
    }

    fn send(&mut self, msg: &mut Message) -> SendDecision {
        // bus.c rejects a non-empty sphdr with EINVAL; BUS never routes on
        // a header the way REQ/REP/SURVEYOR do, so one showing up here
        // means the caller attached routing state that doesn't apply.
        if !msg.header().is_empty() {
            return SendDecision::Invalid("BUS does not accept a message header");
        }
        // The local application is not itself a pipe, so every ready
        // peer gets a copy — nothing to exclude.
        SendDecision::Targets(self.outpipes.targets(None))
    }

    fn on_send_complete(&mut self, id: PipeId, released: bool) {
        if released {
            self.outpipes.on_release(id);
        }
    }

    fn recv(&mut self) -> RecvDecision {
        if self.inpipes.can_recv() {
            match self.inpipes.current_pipe() {
                Some(id) => RecvDecision::From(id),
                None => RecvDecision::NotReady,
            }
        } else {
            RecvDecision::NotReady
        }
    }

    fn on_recv_complete(&mut self, _id: PipeId, msg: Message, released: bool) -> Option<Message> {
        self.inpipes.advance(released);
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_rejects_a_nonempty_header() {
        let mut bus = Bus::new();
        bus.add_pipe(PipeId(1), 8, 8);
        bus.on_pipe_out(PipeId(1));

        let mut msg = Message::with_header_and_body(vec![1, 2, 3, 4], b"hi".to_vec());
        match bus.send(&mut msg) {
            SendDecision::Invalid(_) => {}
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn send_fans_out_to_every_ready_pipe() {
        let mut bus = Bus::new();
        bus.add_pipe(PipeId(1), 8, 8);
        bus.add_pipe(PipeId(2), 8, 8);
        bus.on_pipe_out(PipeId(1));
        bus.on_pipe_out(PipeId(2));

        let mut msg = Message::with_body(b"hi".to_vec());
        match bus.send(&mut msg) {
            SendDecision::Targets(mut targets) => {
                targets.sort_by_key(|id| id.0);
                assert_eq!(targets, vec![PipeId(1), PipeId(2)]);
            }
            other => panic!("expected Targets, got {:?}", other),
        }
    }
}
