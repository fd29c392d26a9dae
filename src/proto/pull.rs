// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PULL: fair-queued, recv-only. Grounded on
//! `original_source/src/protocols/pipeline/pull.c`.

use std::collections::HashMap;

use crate::message::Message;
use crate::pattern::FairQueue;
use crate::pipe::PipeId;

use super::{Protocol, RecvDecision, SendDecision};

pub const PROTOCOL_ID: u16 = 0x51; // PULL = 5 << 4 | 1
pub const PEER_PROTOCOL_ID: u16 = 0x50; // PUSH = 5 << 4 | 0

#[derive(Default)]
pub struct Pull {
    fq: FairQueue,
    priority: HashMap<PipeId, u8>,
}

impl Pull {
    pub fn new() -> Pull {
        Pull::default()
    }
}

impl Protocol for Pull {
    fn protocol_id(&self) -> u16 {
        PROTOCOL_ID
    }

    fn peer_protocol_id(&self) -> u16 {
        PEER_PROTOCOL_ID
    }

    fn name(&self) -> &'static str {
        "pull"
    }

    fn add_pipe(&mut self, id: PipeId, _send_priority: u8, recv_priority: u8) {
        self.priority.insert(id, recv_priority);
    }

    fn remove_pipe(&mut self, id: PipeId) {
        if let Some(priority) = self.priority.remove(&id) {
            self.fq.remove(id, priority);
        }
    }

    fn on_pipe_out(&mut self, _id: PipeId) {}

    fn on_pipe_in(&mut self, id: PipeId) {
        if let Some(&priority) = self.priority.get(&id) {
            self.fq.on_in(id, priority);
        }
    }

    fn send(&mut self, _msg: &mut Message) -> SendDecision {
        SendDecision::NotSupported
    }

    fn on_send_complete(&mut self, _id: PipeId, _released: bool) {}

    fn recv(&mut self) -> RecvDecision {
        if self.fq.can_recv() {
            match self.fq.current_pipe() {
                Some(id) => RecvDecision::From(id),
                None => RecvDecision::NotReady,
            }
        } else {
            RecvDecision::NotReady
        }
    }

    fn on_recv_complete(&mut self, _id: PipeId, msg: Message, released: bool) -> Option<Message> {
        self.fq.advance(released);
        Some(msg)
    }
}
