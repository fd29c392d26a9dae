// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Global registry (component J) and the public-facing [`Socket`] facade.
//! Grounded on `socket_facade.rs`'s thin wrapper-around-a-channel shape;
//! this crate's facade wraps `crate::socket::Socket` directly instead of
//! going through `mpsc`, since `crate::socket::Socket` already owns its
//! own backend thread and exposes blocking calls (see `socket.rs`'s
//! module docs for why). `Session` plays the role the teacher's single
//! implicit process-wide event loop plays: a place sockets are created
//! from and a point at which every outstanding socket can be told to
//! drain on shutdown.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::proto::{bus, pair, pull, push, rep, req, respondent, surveyor, xpub, xsub, Protocol};
use crate::socket::{self, SocketId};

/// One of the ten wire-level socket types (spec.md §4.G).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SocketType {
    Pair,
    Pub,
    Sub,
    Req,
    Rep,
    Push,
    Pull,
    Surveyor,
    Respondent,
    Bus,
}

impl SocketType {
    fn new_protocol(self) -> Box<dyn Protocol> {
        match self {
            SocketType::Pair => Box::new(pair::Pair::new()),
            SocketType::Pub => Box::new(xpub::Pub::new()),
            SocketType::Sub => Box::new(xsub::Sub::new()),
            SocketType::Req => Box::new(req::Req::new()),
            SocketType::Rep => Box::new(rep::Rep::new()),
            SocketType::Push => Box::new(push::Push::new()),
            SocketType::Pull => Box::new(pull::Pull::new()),
            SocketType::Surveyor => Box::new(surveyor::Surveyor::new()),
            SocketType::Respondent => Box::new(respondent::Respondent::new()),
            SocketType::Bus => Box::new(bus::Bus::new()),
        }
    }

    /// Two socket types may exchange messages iff each is the other's
    /// declared peer, per spec.md §4.H's pairing table.
    pub fn matches(self, other: SocketType) -> bool {
        matches!(
            (self, other),
            (SocketType::Pair, SocketType::Pair)
                | (SocketType::Pub, SocketType::Sub)
                | (SocketType::Sub, SocketType::Pub)
                | (SocketType::Req, SocketType::Rep)
                | (SocketType::Rep, SocketType::Req)
                | (SocketType::Push, SocketType::Pull)
                | (SocketType::Pull, SocketType::Push)
                | (SocketType::Surveyor, SocketType::Respondent)
                | (SocketType::Respondent, SocketType::Surveyor)
                | (SocketType::Bus, SocketType::Bus)
        )
    }
}

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// An endpoint handle returned by [`Socket::connect`]/[`Socket::bind`],
/// usable only to later call [`Socket::remove_endpoint`].
pub use crate::endpoint::EndpointId as Endpoint;

/// The public, thread-safe handle an application holds. Cloning shares
/// the same backend thread and pipe set; dropping the last clone stops it.
#[derive(Clone)]
pub struct Socket {
    socket_type: SocketType,
    inner: Arc<socket::Socket>,
}

impl Socket {
    fn new(socket_type: SocketType) -> Socket {
        let id = SocketId(NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed));
        let protocol = socket_type.new_protocol();
        Socket {
            socket_type,
            inner: Arc::new(socket::Socket::new(id, protocol)),
        }
    }

    pub fn id(&self) -> SocketId {
        self.inner.id()
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    /// Connects to a remote endpoint; see spec.md §6 for the URL grammar.
    pub fn connect(&self, url: &str) -> Result<Endpoint> {
        self.inner.connect(url)
    }

    /// Binds a local endpoint other peers connect to.
    pub fn bind(&self, url: &str) -> Result<Endpoint> {
        self.inner.bind(url)
    }

    pub fn remove_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        self.inner.remove_endpoint(endpoint)
    }

    pub fn send(&self, buffer: Vec<u8>) -> Result<()> {
        self.inner.send(buffer)
    }

    pub fn recv(&self) -> Result<Vec<u8>> {
        self.inner.recv()
    }

    pub fn set_option(&self, option: SocketOption) -> Result<()> {
        option.apply(&self.inner)
    }

    pub fn set_send_timeout(&self, timeout: Duration) -> Result<()> {
        self.set_option(SocketOption::SendTimeout(timeout))
    }

    pub fn set_recv_timeout(&self, timeout: Duration) -> Result<()> {
        self.set_option(SocketOption::RecvTimeout(timeout))
    }

    pub fn set_send_priority(&self, priority: u8) -> Result<()> {
        self.set_option(SocketOption::SendPriority(priority))
    }

    pub fn set_recv_priority(&self, priority: u8) -> Result<()> {
        self.set_option(SocketOption::RecvPriority(priority))
    }

    /// SURVEYOR-only; no-op (rejected) on every other socket type.
    pub fn set_deadline(&self, deadline: Duration) -> Result<()> {
        self.set_option(SocketOption::Deadline(deadline))
    }

    /// Escape hatch for options [`SocketOption`] doesn't name (SUB's
    /// `subscribe`/`unsubscribe`, which take arbitrary prefix bytes rather
    /// than an integer or duration). Used by the `spcat` binary.
    pub fn set_raw_option(&self, name: &str, value: &[u8]) -> Result<()> {
        self.inner.set_option(name, value)
    }

    /// Shuts this socket down from any handle sharing it, unblocking a
    /// peer thread's blocked `send`/`recv` with [`crate::Error::BadHandle`].
    pub fn close(&self) {
        self.inner.shutdown();
    }

    /// Used by [`Session::close_all`]: flips this socket straight to the
    /// permanently-terminated state rather than the graceful shutdown
    /// `close` performs, so blocked peers see [`crate::Error::Terminated`].
    fn terminate(&self) {
        self.inner.terminate();
    }

    /// Two sockets can be meaningfully wired together (`forward`) iff
    /// their types are each other's declared peer.
    pub fn matches(&self, other: &Socket) -> bool {
        self.socket_type.matches(other.socket_type)
    }

    /// Convenience used by the `spcat` binary and device-style bridging:
    /// one blocking receive followed by a send on the other socket.
    pub fn forward(&self, other: &Socket) -> Result<()> {
        let body = self.recv()?;
        other.send(body)
    }
}

/// Options settable through [`Socket::set_option`], mirroring spec.md
/// §4.F's table; integer-typed options still also accept the raw
/// `set_option(name, bytes)` path on `crate::socket::Socket` for the
/// `spcat` CLI, which only has strings in hand.
#[derive(Debug, Clone, Copy)]
pub enum SocketOption {
    Linger(Duration),
    SendBuf(usize),
    RecvBuf(usize),
    RecvMaxSize(i64),
    SendTimeout(Duration),
    RecvTimeout(Duration),
    ReconnectIvl(Duration),
    ReconnectIvlMax(Duration),
    SendPriority(u8),
    RecvPriority(u8),
    Ipv4Only(bool),
    /// SURVEYOR-only: how long a survey stays open before `recv` reports
    /// `Error::TimedOut` (spec.md §G.8). Routed through to
    /// `Protocol::set_option` since it has no `SOL_SOCKET` counterpart.
    Deadline(Duration),
}

impl SocketOption {
    fn apply(self, inner: &socket::Socket) -> Result<()> {
        let (name, value) = match self {
            SocketOption::Linger(d) => ("linger".to_string(), (d.as_millis() as i64).to_string()),
            SocketOption::SendBuf(n) => ("sndbuf".to_string(), n.to_string()),
            SocketOption::RecvBuf(n) => ("rcvbuf".to_string(), n.to_string()),
            SocketOption::RecvMaxSize(n) => ("rcvmaxsize".to_string(), n.to_string()),
            SocketOption::SendTimeout(d) => ("sndtimeo".to_string(), (d.as_millis() as i64).to_string()),
            SocketOption::RecvTimeout(d) => ("rcvtimeo".to_string(), (d.as_millis() as i64).to_string()),
            SocketOption::ReconnectIvl(d) => ("reconnect_ivl".to_string(), d.as_millis().to_string()),
            SocketOption::ReconnectIvlMax(d) => ("reconnect_ivl_max".to_string(), d.as_millis().to_string()),
            SocketOption::SendPriority(p) => ("sndprio".to_string(), p.to_string()),
            SocketOption::RecvPriority(p) => ("rcvprio".to_string(), p.to_string()),
            SocketOption::Ipv4Only(b) => ("ipv4only".to_string(), if b { "1" } else { "0" }.to_string()),
            SocketOption::Deadline(d) => ("deadline".to_string(), d.as_millis().to_string()),
        };
        inner.set_option(&name, value.as_bytes())
    }
}

/// Registry of the sockets a process has created, so a caller can shut
/// every one of them down together. The teacher never needed this
/// explicitly (its single global `EventLoop` owned every socket
/// implicitly); this crate's per-socket backend thread means a `Session`
/// is what lets `close_all()` actually reach all of them.
#[derive(Default)]
pub struct Session {
    sockets: Mutex<Vec<Socket>>,
    terminated: AtomicBool,
}

impl Session {
    pub fn new() -> Session {
        Session {
            sockets: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
        }
    }

    /// Fails with [`crate::Error::Terminated`] once [`Session::close_all`]
    /// has been called, per spec.md §4.F/§5 scenario S6 ("subsequent
    /// socket creation also returns terminated").
    pub fn create_socket(&self, socket_type: SocketType) -> Result<Socket> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(Error::Terminated);
        }
        let socket = Socket::new(socket_type);
        self.sockets.lock().unwrap().push(socket.clone());
        Ok(socket)
    }

    /// Number of sockets still registered (including ones the caller
    /// has otherwise dropped its own handle to).
    pub fn len(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terminates every socket this session created, the library-wide
    /// `term()` analogue (spec.md §4.B/§4.F, scenario S6): every blocked
    /// `send`/`recv` across every registered socket unblocks with
    /// `Error::Terminated` once this returns, and every later
    /// `create_socket` call on this session fails the same way.
    pub fn close_all(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        for socket in self.sockets.lock().unwrap().iter() {
            socket.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_and_rep_are_mutual_peers() {
        assert!(SocketType::Req.matches(SocketType::Rep));
        assert!(SocketType::Rep.matches(SocketType::Req));
        assert!(!SocketType::Req.matches(SocketType::Req));
    }

    #[test]
    fn pair_only_matches_pair() {
        assert!(SocketType::Pair.matches(SocketType::Pair));
        assert!(!SocketType::Pair.matches(SocketType::Bus));
    }

    #[test]
    fn session_tracks_created_sockets() {
        let session = Session::new();
        assert!(session.is_empty());
        let _a = session.create_socket(SocketType::Pair).unwrap();
        let _b = session.create_socket(SocketType::Bus).unwrap();
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn create_socket_fails_after_close_all() {
        let session = Session::new();
        let _a = session.create_socket(SocketType::Pair).unwrap();
        session.close_all();
        assert!(matches!(session.create_socket(SocketType::Pair), Err(Error::Terminated)));
    }
}
