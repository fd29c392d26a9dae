// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! RESPONDENT: fair-queued recv of surveys, key-routed send of answers.
//! A survey carries a single 4-byte id (no backtrace stack to scan, one
//! hop only — grounded on `original_source/src/protocols/survey/
//! xsurveyor.c`'s plain header split), but the reply still has to find
//! its way back down the exact pipe the survey arrived on, so this
//! reuses `rep.rs`'s own-key/reverse-map routing from
//! `xrep.c` rather than `xsurveyor.c`'s stateless broadcast.

use std::collections::{HashMap, HashSet};

use crate::message::Message;
use crate::pattern::backtrace::{decode_id, encode_id, PeerKeyAllocator};
use crate::pattern::FairQueue;
use crate::pipe::PipeId;

use super::{Protocol, RecvDecision, SendDecision};

pub const PROTOCOL_ID: u16 = 0x53; // RESPONDENT = 5 << 4 | 3
pub const PEER_PROTOCOL_ID: u16 = 0x52; // SURVEYOR = 5 << 4 | 2

pub struct Respondent {
    fq: FairQueue,
    priority: HashMap<PipeId, u8>,
    keys: HashMap<PipeId, u32>,
    pipes_by_key: HashMap<u32, PipeId>,
    allocator: PeerKeyAllocator,
    out_ready: HashSet<PipeId>,
}

impl Respondent {
    pub fn new() -> Respondent {
        Respondent {
            fq: FairQueue::new(),
            priority: HashMap::new(),
            keys: HashMap::new(),
            pipes_by_key: HashMap::new(),
            allocator: PeerKeyAllocator::new(),
            out_ready: HashSet::new(),
        }
    }
}

impl Default for Respondent {
    fn default() -> Respondent {
        Respondent::new()
    }
}

impl Protocol for Respondent {
    fn protocol_id(&self) -> u16 {
        PROTOCOL_ID
    }

    fn peer_protocol_id(&self) -> u16 {
        PEER_PROTOCOL_ID
    }

    fn name(&self) -> &'static str {
        "respondent"
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
        let survey_id = msg.header().to_vec();
        let mut body = survey_id;
        body.extend_from_slice(msg.body());
        msg.replace_body(body);
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
        if msg.body_len() < 4 {
            return None;
        }
        let survey_id = msg.body()[..4].to_vec();
        let body = msg.body()[4..].to_vec();
        msg.replace_body(body);
        let own_key = self.keys.get(&id).copied().unwrap_or(0);
        let mut header = encode_id(own_key).to_vec();
        header.extend_from_slice(&survey_id);
        msg.set_header(header);
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_routes_back_down_the_pipe_the_survey_came_from() {
        let mut respondent = Respondent::new();
        respondent.add_pipe(PipeId(1), 8, 8);
        respondent.on_pipe_in(PipeId(1));
        respondent.on_pipe_out(PipeId(1));

        let mut body = [0, 0, 0, 42].to_vec();
        body.extend_from_slice(b"how many?");
        let survey = Message::with_body(body);
        let question = respondent.on_recv_complete(PipeId(1), survey, false).unwrap();
        assert_eq!(question.body(), b"how many?");
        assert_eq!(question.header().len(), 8);

        let mut answer = Message::with_header_and_body(question.header().to_vec(), b"seven".to_vec());
        match respondent.send(&mut answer) {
            SendDecision::Targets(targets) => assert_eq!(targets, vec![PipeId(1)]),
            other => panic!("expected Targets([PipeId(1)]), got {:?}", other),
        }
        assert_eq!(&answer.body()[..4], &[0, 0, 0, 42]);
        assert_eq!(&answer.body()[4..], b"seven");
    }
}
