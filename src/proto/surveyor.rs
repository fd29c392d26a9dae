// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! SURVEYOR: broadcasts a survey to every respondent, then collects
//! replies tagged with the survey id until a per-survey deadline.
//! Grounded on `original_source/src/protocols/survey/{xsurveyor,surveyor}.c`:
//! `xsurveyor` is the raw dist/fq pair, `surveyor` layers the
//! passive/active state machine and survey id matching on top. The
//! original's extra `cancelling`/`stopping_timer` states exist only to
//! wait out an asynchronous timer-cancellation acknowledgement; this
//! crate's deadline is polled once per tick under the socket's own lock
//! (`Protocol::deadline`/`on_timer_elapsed`), so cancelling one is just
//! overwriting it — there is nothing to wait for.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::message::Message;
use crate::pattern::{Distributor, FairQueue};
use crate::pipe::PipeId;

use super::{Protocol, RecvDecision, SendDecision};

pub const PROTOCOL_ID: u16 = 0x52; // SURVEYOR = 5 << 4 | 2
pub const PEER_PROTOCOL_ID: u16 = 0x53; // RESPONDENT = 5 << 4 | 3

pub const DEFAULT_DEADLINE_MS: u64 = 1000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum SurveyState {
    /// No survey outstanding.
    Passive,
    /// A survey is outstanding; `deadline` names when it expires.
    Active,
}

pub struct Surveyor {
    outpipes: Distributor,
    inpipes: FairQueue,
    pipe_priority: HashMap<PipeId, u8>,
    state: SurveyState,
    survey_id: u32,
    deadline_ms: u64,
    deadline: Option<Instant>,
    /// Set once by `on_timer_elapsed`, consumed once by `recv_error` —
    /// spec.md §G.8's "next recv returns TIMEDOUT exactly once".
    timed_out: bool,
}

impl Surveyor {
    pub fn new() -> Surveyor {
        Surveyor {
            outpipes: Distributor::new(),
            inpipes: FairQueue::new(),
            pipe_priority: HashMap::new(),
            state: SurveyState::Passive,
            survey_id: {
                let mut seed = [0u8; 4];
                rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut seed);
                u32::from_be_bytes(seed)
            },
            deadline_ms: DEFAULT_DEADLINE_MS,
            deadline: None,
            timed_out: false,
        }
    }

    fn in_progress(&self) -> bool {
        self.state == SurveyState::Active
    }
}

impl Default for Surveyor {
    fn default() -> Surveyor {
        Surveyor::new()
    }
}

impl Protocol for Surveyor {
    fn protocol_id(&self) -> u16 {
        PROTOCOL_ID
    }

    fn peer_protocol_id(&self) -> u16 {
        PEER_PROTOCOL_ID
    }

    fn name(&self) -> &'static str {
        "surveyor"
    }

    fn add_pipe(&mut self, id: PipeId, _send_priority: u8, recv_priority: u8) {
        self.pipe_priority.insert(id, recv_priority);
    }

    fn remove_pipe(&mut self, id: PipeId) {
        self.outpipes.remove(id);
        if let Some(prio) = self.pipe_priority.remove(&id) {
            self.inpipes.remove(id, prio);
        }
    }

    fn on_pipe_out(&mut self, id: PipeId) {
        self.outpipes.on_out(id);
    }

    fn on_pipe_in(&mut self, id: PipeId) {
        if let Some(&prio) = self.pipe_priority.get(&id) {
            self.inpipes.on_in(id, prio);
        }
    }

    /// A send while a survey is already active cancels it and starts a
    /// fresh one immediately — no intermediate state needed once the
    /// deadline is just a value this protocol holds under the socket lock.
    fn send(&mut self, msg: &mut Message) -> SendDecision {
        self.survey_id = self.survey_id.wrapping_add(1) | 0x8000_0000;
        let mut body = self.survey_id.to_be_bytes().to_vec();
        body.extend_from_slice(msg.body());
        msg.replace_body(body);
        msg.set_header(Vec::new());

        let decision = self.broadcast(msg);
        if matches!(decision, SendDecision::Targets(_)) {
            self.state = SurveyState::Active;
            self.deadline = Some(Instant::now() + Duration::from_millis(self.deadline_ms));
            self.timed_out = false;
        }
        decision
    }

    fn on_send_complete(&mut self, id: PipeId, released: bool) {
        if released {
            self.outpipes.on_release(id);
        }
    }

    fn recv(&mut self) -> RecvDecision {
        if !self.in_progress() {
            return RecvDecision::NotSupported;
        }
        if !self.inpipes.can_recv() {
            return RecvDecision::NotReady;
        }
        match self.inpipes.current_pipe() {
            Some(id) => RecvDecision::From(id),
            None => RecvDecision::NotReady,
        }
    }

    fn on_recv_complete(&mut self, id: PipeId, mut msg: Message, released: bool) -> Option<Message> {
        self.inpipes.advance(released);
        if msg.body_len() < 4 {
            return None;
        }
        let reply_id = {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&msg.body()[..4]);
            u32::from_be_bytes(buf)
        };
        let _ = id;
        if reply_id != self.survey_id {
            return None;
        }
        let trimmed = msg.body()[4..].to_vec();
        msg.replace_body(trimmed);
        Some(msg)
    }

    fn set_option(&mut self, name: &str, value: &[u8]) -> Result<()> {
        match name {
            "deadline" => {
                self.deadline_ms = std::str::from_utf8(value)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(Error::InvalidInput("deadline must be a millisecond integer"))?;
                Ok(())
            }
            _ => Err(Error::NotSupported("no such surveyor option")),
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn on_timer_elapsed(&mut self) {
        if self.state == SurveyState::Active {
            self.state = SurveyState::Passive;
            self.deadline = None;
            self.timed_out = true;
        }
    }

    fn recv_error(&mut self) -> Option<Error> {
        if self.in_progress() {
            return None;
        }
        if std::mem::replace(&mut self.timed_out, false) {
            Some(Error::TimedOut)
        } else {
            Some(Error::Fsm)
        }
    }
}

impl Surveyor {
    fn broadcast(&mut self, _msg: &mut Message) -> SendDecision {
        let targets = self.outpipes.targets(None);
        if targets.is_empty() {
            SendDecision::NotReady
        } else {
            SendDecision::Targets(targets)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_error_is_fsm_before_any_survey() {
        let mut s = Surveyor::new();
        assert!(matches!(s.recv_error(), Some(Error::Fsm)));
    }

    #[test]
    fn recv_error_is_timed_out_exactly_once_after_deadline() {
        let mut s = Surveyor::new();
        s.deadline_ms = 10;
        let mut msg = Message::with_body(b"?".to_vec());
        s.add_pipe(PipeId(1), 8, 8);
        s.on_pipe_out(PipeId(1));
        assert!(matches!(s.send(&mut msg), SendDecision::Targets(_)));

        s.on_timer_elapsed();
        assert!(matches!(s.recv_error(), Some(Error::TimedOut)));
        assert!(matches!(s.recv_error(), Some(Error::Fsm)));
    }
}
