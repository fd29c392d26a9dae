// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PUB: broadcasts to every connected SUB, recv-less. Grounded directly
//! on the teacher's `protocol/pbu.rs` `Pub` (`HashSet<Token>` ready set
//! is the ancestor of `pattern::dist::Distributor`).

use crate::message::Message;
use crate::pattern::Distributor;
use crate::pipe::PipeId;

use super::{Protocol, RecvDecision, SendDecision};

pub const PROTOCOL_ID: u16 = 0x20; // PUB = 2 << 4 | 0
pub const PEER_PROTOCOL_ID: u16 = 0x21; // SUB = 2 << 4 | 1

#[derive(Default)]
pub struct Pub {
    dist: Distributor,
}

impl Pub {
    pub fn new() -> Pub {
        Pub::default()
    }
}

impl Protocol for Pub {
    fn protocol_id(&self) -> u16 {
        PROTOCOL_ID
    }

    fn peer_protocol_id(&self) -> u16 {
        PEER_PROTOCOL_ID
    }

    fn name(&self) -> &'static str {
        "pub"
    }

    fn add_pipe(&mut self, _id: PipeId, _send_priority: u8, _recv_priority: u8) {}

    fn remove_pipe(&mut self, id: PipeId) {
        self.dist.remove(id);
    }

    fn on_pipe_out(&mut self, id: PipeId) {
        self.dist.on_out(id);
    }

    fn on_pipe_in(&mut self, _id: PipeId) {}

    fn send(&mut self, _msg: &mut Message) -> SendDecision {
        let targets = self.dist.targets(None);
        if targets.is_empty() {
            // Nobody's listening; PUB still reports success upstream
            // (a broadcast with no subscribers is not an error), but the
            // socket layer has nothing to hand to a pipe.
            SendDecision::Targets(Vec::new())
        } else {
            SendDecision::Targets(targets)
        }
    }

    fn on_send_complete(&mut self, id: PipeId, released: bool) {
        if released {
            self.dist.on_release(id);
        }
    }

    fn recv(&mut self) -> RecvDecision {
        RecvDecision::NotSupported
    }

    fn on_recv_complete(&mut self, _id: PipeId, msg: Message, _released: bool) -> Option<Message> {
        Some(msg)
    }
}
