// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! One bind() or connect() instance (component E), grounded on
//! `socket_impl.rs`'s `connect`/`bind`/`reconnect`/`rebind` and
//! `on_pipe_error`/`on_acceptor_error` capped-retry-via-timer shape. A
//! connector resolves/connects/sessions and re-arms on a backoff timer;
//! an acceptor listens/accepts and re-arms immediately on listener
//! failure. Unique per `EndpointId`, monotonically increasing per socket.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct EndpointId(pub u64);

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

impl EndpointId {
    pub fn next() -> EndpointId {
        EndpointId(NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    Connect,
    Bind,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EndpointState {
    /// Resolving/connecting, or listening with no pipe yet.
    Pending,
    /// A pipe is attached and handshaking or exchanging messages.
    Active,
    /// Connection lost or listener failed; waiting on the reconnect timer.
    Retrying,
    /// `remove_endpoint` or socket shutdown requested; draining.
    Stopping,
}

/// Error counters surfaced to the application per spec.md §4.E.
#[derive(Debug, Default, Clone, Copy)]
pub struct EndpointErrorCounters {
    pub connect_errors: u64,
    pub bind_errors: u64,
    pub accept_errors: u64,
    pub broken_connections: u64,
}

pub struct Endpoint {
    id: EndpointId,
    url: String,
    direction: Direction,
    state: EndpointState,
    reconnect_ivl_ms: u64,
    reconnect_ivl_max_ms: u64,
    attempt: u32,
    errors: EndpointErrorCounters,
}

impl Endpoint {
    pub fn new(url: String, direction: Direction, reconnect_ivl_ms: u64, reconnect_ivl_max_ms: u64) -> Endpoint {
        Endpoint {
            id: EndpointId::next(),
            url,
            direction,
            state: EndpointState::Pending,
            reconnect_ivl_ms,
            reconnect_ivl_max_ms,
            attempt: 0,
            errors: EndpointErrorCounters::default(),
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn errors(&self) -> EndpointErrorCounters {
        self.errors
    }

    pub fn mark_active(&mut self) {
        self.state = EndpointState::Active;
        self.attempt = 0;
    }

    pub fn mark_stopping(&mut self) {
        self.state = EndpointState::Stopping;
    }

    /// A pipe or listener just failed. Returns the backoff, in
    /// milliseconds, the caller should wait before retrying (connectors
    /// only — an acceptor rearms immediately, per `on_acceptor_error`'s
    /// fixed 200ms, so it ignores the doubling).
    pub fn on_error(&mut self) -> u64 {
        self.state = EndpointState::Retrying;
        match self.direction {
            Direction::Connect => {
                self.errors.connect_errors += 1;
                self.errors.broken_connections += 1;
                let delay = crate::fsm::timer::reconnect_backoff(
                    self.reconnect_ivl_ms,
                    self.reconnect_ivl_max_ms,
                    self.attempt,
                );
                self.attempt += 1;
                delay
            }
            Direction::Bind => {
                self.errors.bind_errors += 1;
                200
            }
        }
    }

    pub fn on_accept_error(&mut self) {
        self.errors.accept_errors += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_resets_on_success() {
        let mut ep = Endpoint::new("tcp://127.0.0.1:0".into(), Direction::Connect, 100, 1600);

        assert_eq!(ep.on_error(), 100);
        assert_eq!(ep.on_error(), 200);
        assert_eq!(ep.on_error(), 400);

        ep.mark_active();
        assert_eq!(ep.on_error(), 100);
    }

    #[test]
    fn bind_errors_use_a_fixed_retry_delay() {
        let mut ep = Endpoint::new("tcp://127.0.0.1:0".into(), Direction::Bind, 100, 1600);

        assert_eq!(ep.on_error(), 200);
        assert_eq!(ep.on_error(), 200);
        assert_eq!(ep.errors().bind_errors, 2);
    }
}
