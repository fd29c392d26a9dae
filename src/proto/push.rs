// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PUSH: load-balanced, send-only. Grounded on
//! `original_source/src/protocols/pipeline/push.c`.

use std::collections::HashMap;

use crate::message::Message;
use crate::pattern::LoadBalance;
use crate::pipe::PipeId;

use super::{Protocol, RecvDecision, SendDecision};

pub const PROTOCOL_ID: u16 = 0x50; // PUSH = 5 << 4 | 0
pub const PEER_PROTOCOL_ID: u16 = 0x51; // PULL = 5 << 4 | 1

#[derive(Default)]
pub struct Push {
    lb: LoadBalance,
    priority: HashMap<PipeId, u8>,
}

impl Push {
    pub fn new() -> Push {
        Push::default()
    }
}

impl Protocol for Push {
    fn protocol_id(&self) -> u16 {
        PROTOCOL_ID
    }

    fn peer_protocol_id(&self) -> u16 {
        PEER_PROTOCOL_ID
    }

    fn name(&self) -> &'static str {
        "push"
    }

    fn add_pipe(&mut self, id: PipeId, send_priority: u8, _recv_priority: u8) {
        self.priority.insert(id, send_priority);
    }

    fn remove_pipe(&mut self, id: PipeId) {
        if let Some(priority) = self.priority.remove(&id) {
            self.lb.remove(id, priority);
        }
    }

    fn on_pipe_out(&mut self, id: PipeId) {
        if let Some(&priority) = self.priority.get(&id) {
            self.lb.on_out(id, priority);
        }
    }

    fn on_pipe_in(&mut self, _id: PipeId) {}

    fn send(&mut self, _msg: &mut Message) -> SendDecision {
        if self.lb.can_send() {
            match self.lb.current_pipe() {
                Some(id) => SendDecision::Targets(vec![id]),
                None => SendDecision::NotReady,
            }
        } else {
            SendDecision::NotReady
        }
    }

    fn on_send_complete(&mut self, _id: PipeId, released: bool) {
        self.lb.advance(released);
    }

    fn recv(&mut self) -> RecvDecision {
        RecvDecision::NotSupported
    }

    fn on_recv_complete(&mut self, _id: PipeId, msg: Message, _released: bool) -> Option<Message> {
        Some(msg)
    }
}
