// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Socket types (component H): thin policies on top of `crate::pattern`
//! that decide which pipe(s) a message goes to or comes from. Every
//! policy is a [`Protocol`] impl; the actual pipe I/O stays in
//! `crate::socket`, which owns the `Pipe` objects and only asks the
//! protocol "who's next". Grounded on the teacher's `protocol/pbu.rs`
//! (`Pub`'s `HashMap<Token, Pipe>` + ready-set is the direct ancestor of
//! `pattern::dist::Distributor`) and `original_source/src/protocols/**`.

pub mod bus;
pub mod pair;
pub mod pull;
pub mod push;
pub mod rep;
pub mod req;
pub mod respondent;
pub mod surveyor;
pub mod xpub;
pub mod xsub;

use std::time::Instant;

use crate::message::Message;
use crate::pipe::PipeId;

/// What the socket layer should do after offering a message to `send`.
#[derive(Debug)]
pub enum SendDecision {
    /// Hand a copy of the message to each listed pipe (length 1 for
    /// everything but PUB/BUS/SURVEYOR).
    Targets(Vec<PipeId>),
    /// No pipe is currently able to take a message.
    NotReady,
    /// This socket type doesn't implement `send`.
    NotSupported,
    /// The message itself is malformed for this socket type (e.g. BUS
    /// rejecting a non-empty `sp_header` on send, spec.md §G.6).
    Invalid(&'static str),
}

#[derive(Debug)]
pub enum RecvDecision {
    /// Ask this pipe for its queued message next.
    From(PipeId),
    NotReady,
    NotSupported,
}

/// A pattern implementation. `protocol_id`/`peer_protocol_id` are the SP
/// wire identifiers exchanged during the handshake (`pipe::Pipe::new`).
pub trait Protocol: Send {
    fn protocol_id(&self) -> u16;
    fn peer_protocol_id(&self) -> u16;
    fn name(&self) -> &'static str;

    fn add_pipe(&mut self, id: PipeId, send_priority: u8, recv_priority: u8);
    fn remove_pipe(&mut self, id: PipeId);

    /// Pipe `id` just reported it can accept a write.
    fn on_pipe_out(&mut self, id: PipeId);
    /// Pipe `id` just reported it has an inbound message ready.
    fn on_pipe_in(&mut self, id: PipeId);

    /// Choose where `msg` should go. May rewrite `msg`'s header in place
    /// (REQ/REP/SURVEYOR tag the wire frame with a routing id that rides
    /// in `sp_header`, which `pipe::Pipe::send` folds back into the wire
    /// frame ahead of the body).
    fn send(&mut self, msg: &mut Message) -> SendDecision;
    /// The socket layer reports whether the send to `id` completed or
    /// the pipe asked to be released from rotation.
    fn on_send_complete(&mut self, id: PipeId, released: bool);

    /// Choose which pipe to pull the next message from.
    fn recv(&mut self) -> RecvDecision;
    /// The socket layer reports the message it actually read from `id`
    /// (already framed); the protocol may filter it out (`None`) or
    /// rewrite it (SUB trie match, REQ id check, REP backtrace push).
    fn on_recv_complete(&mut self, id: PipeId, msg: Message, released: bool) -> Option<Message>;

    /// Generic `set_option`/`get_option` hook for pattern-specific
    /// options (`SOL_SOCKET` < level, spec.md §4.F); most socket types
    /// have none.
    fn set_option(&mut self, _name: &str, _value: &[u8]) -> crate::error::Result<()> {
        Err(crate::error::Error::NotSupported("no pattern-specific options"))
    }

    /// Instant this protocol's internal deadline timer (if any) next
    /// fires. Polled once per tick by the socket layer instead of going
    /// through `fsm::worker`'s timer, since it only ever needs checking
    /// at tick granularity (SURVEYOR's survey deadline, spec.md §G.8).
    fn deadline(&self) -> Option<Instant> {
        None
    }

    /// Reported once `deadline()`'s instant has passed.
    fn on_timer_elapsed(&mut self) {}

    /// Lets a protocol surface a state-specific error (SURVEYOR's
    /// *timed-out*/*FSM* recv errors, spec.md §G.8) ahead of suspending
    /// the caller when the recv queue is otherwise empty.
    fn recv_error(&mut self) -> Option<crate::error::Error> {
        None
    }
}
