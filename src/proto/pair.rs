// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! PAIR: exactly one peer, full duplex. Grounded on
//! `original_source/src/protocols/pair/pair.c`'s single-pipe sockbase.

use crate::message::Message;
use crate::pipe::PipeId;

use super::{Protocol, RecvDecision, SendDecision};

pub const PROTOCOL_ID: u16 = 0x10; // PAIR = 1 << 4 | 0
pub const PEER_PROTOCOL_ID: u16 = 0x10;

#[derive(Default)]
pub struct Pair {
    pipe: Option<PipeId>,
    out_ready: bool,
    in_ready: bool,
}

impl Pair {
    pub fn new() -> Pair {
        Pair::default()
    }
}

impl Protocol for Pair {
    fn protocol_id(&self) -> u16 {
        PROTOCOL_ID
    }

    fn peer_protocol_id(&self) -> u16 {
        PEER_PROTOCOL_ID
    }

    fn name(&self) -> &'static str {
        "pair"
    }

    fn add_pipe(&mut self, id: PipeId, _send_priority: u8, _recv_priority: u8) {
        // A second connection on a PAIR socket is accepted at the
        // transport level but never gets picked here — `pair.c` enforces
        // at most one active peer the same way (`EISCONN` on a second
        // endpoint would be the friendlier answer; tracked as a
        // possible improvement, not required by the current contract).
        if self.pipe.is_none() {
            self.pipe = Some(id);
        }
    }

    fn remove_pipe(&mut self, id: PipeId) {
        if self.pipe == Some(id) {
            self.pipe = None;
            self.out_ready = false;
            self.in_ready = false;
        }
    }

    fn on_pipe_out(&mut self, id: PipeId) {
        if self.pipe == Some(id) {
            self.out_ready = true;
        }
    }

    fn on_pipe_in(&mut self, id: PipeId) {
        if self.pipe == Some(id) {
            self.in_ready = true;
        }
    }

    fn send(&mut self, _msg: &mut Message) -> SendDecision {
        match (self.pipe, self.out_ready) {
            (Some(id), true) => SendDecision::Targets(vec![id]),
            _ => SendDecision::NotReady,
        }
    }

    fn on_send_complete(&mut self, id: PipeId, released: bool) {
        if self.pipe == Some(id) {
            self.out_ready = !released;
        }
    }

    fn recv(&mut self) -> RecvDecision {
        match (self.pipe, self.in_ready) {
            (Some(id), true) => RecvDecision::From(id),
            _ => RecvDecision::NotReady,
        }
    }

    fn on_recv_complete(&mut self, id: PipeId, msg: Message, released: bool) -> Option<Message> {
        if self.pipe == Some(id) {
            self.in_ready = !released;
        }
        Some(msg)
    }
}
