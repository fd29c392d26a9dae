// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! REP: fair-queued recv, backtrace-routed send. Grounded on
//! `original_source/src/protocols/reqrep/xrep.c`'s `grid_xrep_recv`
//! (split the stack off the body, prepend this pipe's own key) and
//! `grid_xrep_send` (pop the destination key, look the pipe up, drop
//! silently if it isn't there or isn't ready).

use std::collections::{HashMap, HashSet};

use crate::message::Message;
use crate::pattern::backtrace::{decode_id, encode_id, split_backtrace, PeerKeyAllocator};
use crate::pattern::FairQueue;
use crate::pipe::PipeId;

use super::{Protocol, RecvDecision, SendDecision};

pub const PROTOCOL_ID: u16 = 0x31; // REP = 3 << 4 | 1
pub const PEER_PROTOCOL_ID: u16 = 0x30; // REQ = 3 << 4 | 0

pub struct Rep {
    fq: FairQueue,
    priority: HashMap<PipeId, u8>,
    keys: HashMap<PipeId, u32>,
    pipes_by_key: HashMap<u32, PipeId>,
    allocator: PeerKeyAllocator,
    out_ready: HashSet<PipeId>,
}

impl Rep {
    pub fn new() -> Rep {
        Rep {
            fq: FairQueue::new(),
            priority: HashMap::new(),
            keys: HashMap::new(),
            pipes_by_key: HashMap::new(),
            allocator: PeerKeyAllocator::new(),
            out_ready: HashSet::new(),
        }
    }
}

impl Default for Rep {
    fn default() -> Rep {
        Rep::new()
    }
}

impl Protocol for Rep {
    fn protocol_id(&self) -> u16 {
        PROTOCOL_ID
    }

    fn peer_protocol_id(&self) -> u16 {
        PEER_PROTOCOL_ID
    }

    fn name(&self) -> &'static str {
        "rep"
    }

    fn add_pipe(&mut self, id: PipeId, _send_priority: u8, recv_priority: u8) {
        let key = self.allocator.next_key();
        self.keys.insert(id, key);
        self.pipes_by_key.insert(key, id);
        self.priority.insert(id, recv_priority);
    }

    fn remove_pipe(&mut self, id: PipeId) {
        if let Some(priority) = self.priority.remove(&id) {
            self.fq.remove(id, priority);
        }
        if let Some(key) = self.keys.remove(&id) {
            self.pipes_by_key.remove(&key);
        }
        self.out_ready.remove(&id);
    }

    fn on_pipe_out(&mut self, id: PipeId) {
        self.out_ready.insert(id);
    }

    fn on_pipe_in(&mut self, id: PipeId) {
        if let Some(&priority) = self.priority.get(&id) {
            self.fq.on_in(id, priority);
        }
    }

    fn send(&mut self, msg: &mut Message) -> SendDecision {
        if msg.header().len() < 4 {
            // No backtrace to route on — nothing we can do but drop it,
            // matching xrep.c's "ignore a malformed outgoing reply".
            return SendDecision::Targets(Vec::new());
        }
        let key_bytes = msg.trim_header(4);
        let key = match decode_id(&key_bytes) {
            Some(k) => k,
            None => return SendDecision::Targets(Vec::new()),
        };
        let pipe = match self.pipes_by_key.get(&key) {
            Some(&p) => p,
            None => return SendDecision::Targets(Vec::new()),
        };
        if !self.out_ready.contains(&pipe) {
            return SendDecision::Targets(Vec::new());
        }
        let rest = msg.header().to_vec();
        if !rest.is_empty() {
            let mut body = rest;
            body.extend_from_slice(msg.body());
            msg.replace_body(body);
        }
        msg.set_header(Vec::new());
        SendDecision::Targets(vec![pipe])
    }

    fn on_send_complete(&mut self, id: PipeId, released: bool) {
        if released {
            self.out_ready.remove(&id);
        }
    }

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

    fn on_recv_complete(&mut self, id: PipeId, mut msg: Message, released: bool) -> Option<Message> {
        self.fq.advance(released);
        let (header, header_len) = split_backtrace(msg.body())?;
        let body = msg.body()[header_len..].to_vec();
        msg.replace_body(body);
        let own_key = self.keys.get(&id).copied().unwrap_or(0);
        let mut full_header = encode_id(own_key).to_vec();
        full_header.extend_from_slice(&header);
        msg.set_header(full_header);
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::backtrace::is_terminator;

    #[test]
    fn recv_prepends_the_receiving_pipes_own_key() {
        let mut rep = Rep::new();
        rep.add_pipe(PipeId(1), 8, 8);
        rep.on_pipe_in(PipeId(1));

        let terminator = encode_id(0x8000_0001);
        let mut body = terminator.to_vec();
        body.extend_from_slice(b"ping");
        let msg = Message::with_body(body);

        let out = rep.on_recv_complete(PipeId(1), msg, false).unwrap();
        assert_eq!(out.body(), b"ping");
        assert_eq!(out.header().len(), 8);
        let own_key = decode_id(&out.header()[..4]).unwrap();
        assert!(!is_terminator(own_key));
        assert_eq!(&out.header()[4..], &terminator[..]);
    }

    #[test]
    fn send_drops_silently_when_destination_pipe_is_gone() {
        let mut rep = Rep::new();
        rep.add_pipe(PipeId(1), 8, 8);
        let bogus_key = encode_id(0x1234);
        let mut msg = Message::with_header_and_body(bogus_key.to_vec(), b"pong".to_vec());

        match rep.send(&mut msg) {
            SendDecision::Targets(targets) => assert!(targets.is_empty()),
            other => panic!("expected Targets([]), got {:?}", other),
        }
    }
}
