// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The application-visible socket (component F): owns endpoints and
//! pipes, mediates between a [`Protocol`]'s pipe-selection decisions
//! and the actual [`Pipe`] I/O, and exposes blocking `send`/`recv`
//! timed out against its own `Condvar`-backed `sndfd`/`rcvfd` stand-in.
//! Grounded on `socket_facade.rs` (public surface) and `socket_impl.rs`
//! (internal state holder, `on_pipe_error`/`on_acceptor_error` retry
//! shape); the `sndfd`/`rcvfd` bits are `Condvar`s rather than OS event
//! handles since this crate has no C ABI to expose them through (see
//! DESIGN.md, OQ-1).
//!
//! The teacher drives its backend off a dedicated thread blocking on an
//! `mpsc::Receiver` of commands; this module instead schedules a
//! self-rearming timer on a shared [`crate::fsm::worker::WorkerPool`]
//! worker, driving I/O with a fixed-interval wake rather than full `mio`
//! registration per pipe — see DESIGN.md, OQ-4.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::endpoint::{Direction, Endpoint, EndpointId};
use crate::error::{Error, Result};
use crate::fsm::worker::WorkerHandle;
use crate::message::Message;
use crate::pipe::{Pipe, PipeId, PipeRecvStatus, PipeSendStatus};
use crate::proto::{Protocol, RecvDecision, SendDecision};
use crate::transport::{self, Listener};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SocketId(pub u64);

/// Socket-wide option block, spec.md §4.F's table.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub linger_ms: i64,
    pub send_buf: usize,
    pub recv_buf: usize,
    pub recv_max_size: i64,
    pub send_timeout_ms: i64,
    pub recv_timeout_ms: i64,
    pub reconnect_ivl_ms: u64,
    pub reconnect_ivl_max_ms: u64,
    pub send_priority: u8,
    pub recv_priority: u8,
    pub ipv4_only: bool,
    pub name: String,
}

impl Default for SocketOptions {
    fn default() -> SocketOptions {
        SocketOptions {
            linger_ms: 1000,
            send_buf: 128 * 1024,
            recv_buf: 128 * 1024,
            recv_max_size: 1024 * 1024,
            send_timeout_ms: -1,
            recv_timeout_ms: -1,
            reconnect_ivl_ms: 100,
            reconnect_ivl_max_ms: 0,
            send_priority: 8,
            recv_priority: 8,
            ipv4_only: true,
            name: String::new(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Lifecycle {
    Init,
    Active,
    Zombie,
    StoppingEps,
    Stopping,
    Fini,
}

struct EndpointEntry {
    endpoint: Endpoint,
    listener: Option<Box<dyn Listener>>,
    pipe: Option<PipeId>,
    next_retry: Option<Instant>,
}

struct Core {
    lifecycle: Lifecycle,
    protocol: Box<dyn Protocol>,
    options: SocketOptions,
    endpoints: HashMap<EndpointId, EndpointEntry>,
    pipes: HashMap<PipeId, Pipe>,
    pipe_endpoint: HashMap<PipeId, EndpointId>,
    recv_queue: VecDeque<Message>,
    out_queue: HashMap<PipeId, VecDeque<Message>>,
    send_errors: u64,
}

/// Shared, lock-guarded socket state plus the two condition variables
/// standing in for `sndfd`/`rcvfd`.
struct Shared {
    core: Mutex<Core>,
    sendable: Condvar,
    recvable: Condvar,
    /// Signalled once the tick callback observes `Lifecycle::Fini`, so
    /// `shutdown` has something to wait on now that there's no
    /// `JoinHandle` to join.
    drained: Condvar,
}

/// Process-wide pool a socket's periodic tick is scheduled on, rather
/// than each socket spawning its own OS thread — this is what actually
/// exercises `fsm::worker` (component A): every tick is a self-re-arming
/// `WorkerHandle::schedule_timer_after` callback running on one of the
/// pool's cooperative worker threads. Readiness-driven wakeup (the
/// `Readable`/`register` half of `fsm::worker`) stays unused; pipes are
/// still polled cooperatively each tick instead of registered for OS
/// readiness notifications (see DESIGN.md, OQ-4).
fn worker_pool() -> &'static crate::fsm::worker::WorkerPool {
    static POOL: std::sync::OnceLock<crate::fsm::worker::WorkerPool> = std::sync::OnceLock::new();
    POOL.get_or_init(|| {
        let size = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        crate::fsm::worker::WorkerPool::new(size).expect("spawn scopemq worker pool")
    })
}

/// The engine driving one socket's endpoints and pipes; ticked on a
/// shared [`worker_pool`] worker rather than owning a dedicated thread.
pub struct Socket {
    id: SocketId,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
}

impl Socket {
    pub fn new(id: SocketId, protocol: Box<dyn Protocol>) -> Socket {
        let core = Core {
            lifecycle: Lifecycle::Active,
            protocol,
            options: SocketOptions::default(),
            endpoints: HashMap::new(),
            pipes: HashMap::new(),
            pipe_endpoint: HashMap::new(),
            recv_queue: VecDeque::new(),
            out_queue: HashMap::new(),
            send_errors: 0,
        };
        let shared = Arc::new(Shared {
            core: Mutex::new(core),
            sendable: Condvar::new(),
            recvable: Condvar::new(),
            drained: Condvar::new(),
        });
        let stop = Arc::new(AtomicBool::new(false));

        let handle = worker_pool().choose_worker();
        arm_tick(handle, shared.clone(), stop.clone());

        Socket { id, shared, stop }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn connect(&self, url: &str) -> Result<EndpointId> {
        let (scheme, _address) = transport::parse_url(url)?;
        transport::transport_for(scheme)?; // validate the scheme up front; the actual dial happens on the backend thread
        let mut core = self.shared.core.lock().unwrap();
        check_live(&core)?;
        debug!("[{:?}] connect: '{}'", self.id, url);
        let (ivl, ivl_max) = (core.options.reconnect_ivl_ms, core.options.reconnect_ivl_max_ms);
        let endpoint = Endpoint::new(url.to_string(), Direction::Connect, ivl, ivl_max);
        let id = endpoint.id();
        core.endpoints.insert(
            id,
            EndpointEntry { endpoint, listener: None, pipe: None, next_retry: Some(Instant::now()) },
        );
        Ok(id)
    }

    pub fn bind(&self, url: &str) -> Result<EndpointId> {
        let (scheme, address) = transport::parse_url(url)?;
        let transport = transport::transport_for(scheme)?;
        let listener = transport.bind(address)?;
        let mut core = self.shared.core.lock().unwrap();
        check_live(&core)?;
        debug!("[{:?}] bind: '{}'", self.id, url);
        let (ivl, ivl_max) = (core.options.reconnect_ivl_ms, core.options.reconnect_ivl_max_ms);
        let endpoint = Endpoint::new(url.to_string(), Direction::Bind, ivl, ivl_max);
        let id = endpoint.id();
        core.endpoints.insert(
            id,
            EndpointEntry { endpoint, listener: Some(listener), pipe: None, next_retry: None },
        );
        Ok(id)
    }

    pub fn remove_endpoint(&self, id: EndpointId) -> Result<()> {
        let mut core = self.shared.core.lock().unwrap();
        match core.endpoints.get_mut(&id) {
            Some(entry) => {
                entry.endpoint.mark_stopping();
                if let Some(pipe_id) = entry.pipe {
                    if let Some(pipe) = core.pipes.get_mut(&pipe_id) {
                        pipe.stop();
                    }
                }
                core.endpoints.remove(&id);
                Ok(())
            }
            None => Err(Error::InvalidInput("unknown endpoint id")),
        }
    }

    pub fn set_option(&self, name: &str, value: &[u8]) -> Result<()> {
        let mut core = self.shared.core.lock().unwrap();
        if core.lifecycle != Lifecycle::Active && core.lifecycle != Lifecycle::Init {
            return Err(Error::BadHandle);
        }
        match name {
            "linger" => core.options.linger_ms = parse_i64(value)?,
            "sndbuf" => core.options.send_buf = parse_positive_usize(value)?,
            "rcvbuf" => core.options.recv_buf = parse_positive_usize(value)?,
            "rcvmaxsize" => core.options.recv_max_size = parse_i64(value)?,
            "sndtimeo" => core.options.send_timeout_ms = parse_i64(value)?,
            "rcvtimeo" => core.options.recv_timeout_ms = parse_i64(value)?,
            "reconnect_ivl" => core.options.reconnect_ivl_ms = parse_positive_usize(value)? as u64,
            "reconnect_ivl_max" => core.options.reconnect_ivl_max_ms = parse_positive_usize(value)? as u64,
            "sndprio" => core.options.send_priority = parse_priority(value)?,
            "rcvprio" => core.options.recv_priority = parse_priority(value)?,
            "ipv4only" => core.options.ipv4_only = parse_bool(value)?,
            "socket_name" => {
                if value.len() > 63 {
                    return Err(Error::InvalidInput("socket_name longer than 63 bytes"));
                }
                core.options.name = String::from_utf8_lossy(value).to_string();
            }
            other => {
                let name = other.to_string();
                return core.protocol.set_option(&name, value);
            }
        }
        Ok(())
    }

    /// Blocking send honouring `SNDTIMEO`; `None` means "wait forever".
    pub fn send(&self, body: Vec<u8>) -> Result<()> {
        let deadline = {
            let core = self.shared.core.lock().unwrap();
            check_live(&core)?;
            timeout_deadline(core.options.send_timeout_ms)
        };
        let mut msg = Message::with_body(body);
        loop {
            {
                let mut core = self.shared.core.lock().unwrap();
                check_live(&core)?;
                match core.protocol.send(&mut msg) {
                    SendDecision::Targets(targets) => {
                        for pipe_id in &targets {
                            core.out_queue.entry(*pipe_id).or_default().push_back(msg.bulkcopy());
                        }
                        return Ok(());
                    }
                    SendDecision::NotSupported => return Err(Error::NotSupported("send")),
                    SendDecision::Invalid(msg) => return Err(Error::InvalidInput(msg)),
                    SendDecision::NotReady => {}
                }
            }
            if !wait_or_timeout(&self.shared.sendable, &self.shared.core, deadline)? {
                return Err(Error::TimedOut);
            }
        }
    }

    /// Blocking recv honouring `RCVTIMEO`.
    pub fn recv(&self) -> Result<Vec<u8>> {
        let deadline = {
            let core = self.shared.core.lock().unwrap();
            check_live(&core)?;
            timeout_deadline(core.options.recv_timeout_ms)
        };
        loop {
            {
                let mut core = self.shared.core.lock().unwrap();
                check_live(&core)?;
                if let Some(msg) = core.recv_queue.pop_front() {
                    return Ok(msg.into_body());
                }
                if let Some(err) = core.protocol.recv_error() {
                    return Err(err);
                }
            }
            if !wait_or_timeout(&self.shared.recvable, &self.shared.core, deadline)? {
                return Err(Error::TimedOut);
            }
        }
    }

    /// Stops every endpoint and waits (bounded by `LINGER`) for the
    /// scheduled tick to observe every pipe gone, per spec.md §4.F's
    /// teardown chain. Idempotent: a second call after `Fini` is a no-op.
    /// Takes `&self`, not `&mut self`: every field it touches is already
    /// behind a `Mutex`/`Condvar`/`AtomicBool`, so a shared handle (e.g.
    /// a clone of the `session::Socket` wrapping this one) can shut the
    /// socket down out from under a peer blocked in `recv`/`send`.
    pub fn shutdown(&self) {
        let deadline = {
            let mut core = self.shared.core.lock().unwrap();
            if core.lifecycle == Lifecycle::Fini || core.lifecycle == Lifecycle::Zombie {
                return;
            }
            core.lifecycle = Lifecycle::StoppingEps;
            debug!("[{:?}] shutdown starting, linger {}ms", self.id, core.options.linger_ms);
            Instant::now() + Duration::from_millis(core.options.linger_ms.max(0) as u64)
        };
        self.stop.store(true, Ordering::SeqCst);
        self.shared.sendable.notify_all();
        self.shared.recvable.notify_all();

        let mut core = self.shared.core.lock().unwrap();
        while core.lifecycle != Lifecycle::Fini {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            core = self.shared.drained.wait_timeout(core, remaining.min(POLL_INTERVAL)).unwrap().0;
        }
    }

    /// Immediately and permanently flips this socket to `Zombie`, the
    /// library-wide `term()` counterpart to the graceful per-socket
    /// [`Socket::shutdown`]: every blocked `send`/`recv` wakes up and sees
    /// [`Error::Terminated`] rather than waiting out `LINGER`, and every
    /// call made afterwards sees it too. Idempotent.
    pub fn terminate(&self) {
        {
            let mut core = self.shared.core.lock().unwrap();
            if core.lifecycle == Lifecycle::Zombie || core.lifecycle == Lifecycle::Fini {
                return;
            }
            core.lifecycle = Lifecycle::Zombie;
            debug!("[{:?}] terminated", self.id);
        }
        self.stop.store(true, Ordering::SeqCst);
        self.shared.sendable.notify_all();
        self.shared.recvable.notify_all();
        self.shared.drained.notify_all();
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_live(core: &Core) -> Result<()> {
    match core.lifecycle {
        Lifecycle::Init | Lifecycle::Active => Ok(()),
        Lifecycle::Zombie => Err(Error::Terminated),
        Lifecycle::StoppingEps | Lifecycle::Stopping | Lifecycle::Fini => Err(Error::BadHandle),
    }
}

fn timeout_deadline(timeout_ms: i64) -> Option<Instant> {
    if timeout_ms < 0 {
        None
    } else {
        Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
    }
}

fn wait_or_timeout(cv: &Condvar, mutex: &Mutex<Core>, deadline: Option<Instant>) -> Result<bool> {
    let guard = mutex.lock().unwrap();
    match deadline {
        None => {
            let _ = cv.wait_timeout(guard, POLL_INTERVAL).unwrap();
            Ok(true)
        }
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            let _ = cv.wait_timeout(guard, remaining.min(POLL_INTERVAL)).unwrap();
            Ok(Instant::now() < deadline)
        }
    }
}

fn parse_i64(value: &[u8]) -> Result<i64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::InvalidInput("expected an integer"))
}

fn parse_positive_usize(value: &[u8]) -> Result<usize> {
    let n = parse_i64(value)?;
    if n <= 0 {
        return Err(Error::InvalidInput("expected a positive integer"));
    }
    Ok(n as usize)
}

fn parse_priority(value: &[u8]) -> Result<u8> {
    let n = parse_i64(value)?;
    if !(1..=16).contains(&n) {
        return Err(Error::InvalidInput("priority must be in 1..=16"));
    }
    Ok(n as u8)
}

fn parse_bool(value: &[u8]) -> Result<bool> {
    match parse_i64(value)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::InvalidInput("expected 0 or 1")),
    }
}

/// Arms the next tick on `handle` as a one-shot timer that reschedules
/// itself; this is the `worker_timer` work kind from spec.md §4.A
/// standing in for the teacher's `mpsc`-driven `socket_impl.rs` loop
/// (see module docs) — no dedicated OS thread per socket.
fn arm_tick(handle: WorkerHandle, shared: Arc<Shared>, stop: Arc<AtomicBool>) {
    let next_handle = handle.clone();
    handle.schedule_timer_after(POLL_INTERVAL, move || {
        tick_once(next_handle, shared, stop);
    });
}

fn tick_once(handle: WorkerHandle, shared: Arc<Shared>, stop: Arc<AtomicBool>) {
    if stop.load(Ordering::SeqCst) {
        let mut core = shared.core.lock().unwrap();
        if core.lifecycle == Lifecycle::Zombie {
            // terminate() already woke every waiter; stop ticking without
            // overwriting the permanent Zombie state with Fini.
            return;
        }
        if core.pipes.is_empty() {
            core.lifecycle = Lifecycle::Fini;
            drop(core);
            shared.drained.notify_all();
            return;
        }
    }

    {
        let mut core = shared.core.lock().unwrap();
        tick(&mut core);
    }
    shared.sendable.notify_all();
    shared.recvable.notify_all();

    arm_tick(handle, shared, stop);
}

fn tick(core: &mut Core) {
    if let Some(deadline) = core.protocol.deadline() {
        if Instant::now() >= deadline {
            core.protocol.on_timer_elapsed();
        }
    }
    drive_endpoints(core);
    drive_pipes(core);
}

fn drive_endpoints(core: &mut Core) {
    let ids: Vec<EndpointId> = core.endpoints.keys().copied().collect();
    for id in ids {
        let should_accept = {
            let entry = core.endpoints.get(&id).unwrap();
            entry.endpoint.direction() == Direction::Bind && entry.listener.is_some()
        };
        if should_accept {
            accept_from(core, id);
            continue;
        }
        let due = {
            let entry = core.endpoints.get(&id).unwrap();
            entry.pipe.is_none() && entry.next_retry.map(|t| Instant::now() >= t).unwrap_or(false)
        };
        if due {
            connect_endpoint(core, id);
        }
    }
}

fn accept_from(core: &mut Core, id: EndpointId) {
    let accepted = {
        let entry = core.endpoints.get_mut(&id).unwrap();
        match entry.listener.as_mut() {
            Some(listener) => listener.try_accept(),
            None => return,
        }
    };
    match accepted {
        Ok(Some(conn)) => {
            let (send_prio, recv_prio) = {
                let opts = &core.options;
                (opts.send_priority, opts.recv_priority)
            };
            let protocol_id = core.protocol.protocol_id();
            let peer_id = core.protocol.peer_protocol_id();
            let pipe = Pipe::new(send_prio, protocol_id, peer_id, conn);
            let pipe_id = pipe.id();
            core.protocol.add_pipe(pipe_id, send_prio, recv_prio);
            core.pipes.insert(pipe_id, pipe);
            core.pipe_endpoint.insert(pipe_id, id);
            if let Some(entry) = core.endpoints.get_mut(&id) {
                entry.endpoint.mark_active();
            }
        }
        Ok(None) => {}
        Err(e) => {
            error!("endpoint [{:?}] accept failed: {}", id, e);
            if let Some(entry) = core.endpoints.get_mut(&id) {
                entry.endpoint.on_accept_error();
            }
        }
    }
}

fn connect_endpoint(core: &mut Core, id: EndpointId) {
    let (scheme, address) = {
        let entry = match core.endpoints.get(&id) {
            Some(e) => e,
            None => return,
        };
        match transport::parse_url(entry.endpoint.url()) {
            Ok((s, a)) => (s.to_string(), a.to_string()),
            Err(_) => return,
        }
    };
    let result = transport::transport_for(&scheme).and_then(|t| t.connect(&address));
    match result {
        Ok(conn) => {
            let (send_prio, recv_prio) = (core.options.send_priority, core.options.recv_priority);
            let protocol_id = core.protocol.protocol_id();
            let peer_id = core.protocol.peer_protocol_id();
            let pipe = Pipe::new(send_prio, protocol_id, peer_id, conn);
            let pipe_id = pipe.id();
            core.protocol.add_pipe(pipe_id, send_prio, recv_prio);
            core.pipes.insert(pipe_id, pipe);
            core.pipe_endpoint.insert(pipe_id, id);
            if let Some(entry) = core.endpoints.get_mut(&id) {
                entry.endpoint.mark_active();
                entry.pipe = Some(pipe_id);
                entry.next_retry = None;
            }
        }
        Err(e) => {
            if let Some(entry) = core.endpoints.get_mut(&id) {
                let backoff = entry.endpoint.on_error();
                debug!("endpoint [{:?}] connect failed: {} (retrying in {}ms)", id, e, backoff);
                entry.next_retry = Some(Instant::now() + Duration::from_millis(backoff));
            }
        }
    }
}

/// Drains as much of `pipe_id`'s queued outbound messages as the
/// connection's write buffer allows this tick; a partially-written
/// message keeps its `send_op` alive inside the `Pipe` across ticks.
fn flush_out_queue(core: &mut Core, pipe_id: PipeId, dead: &mut HashSet<PipeId>) {
    loop {
        let head = match core.out_queue.get(&pipe_id).and_then(|q| q.front()) {
            Some(msg) => msg.bulkcopy(),
            None => return,
        };
        let pipe = match core.pipes.get_mut(&pipe_id) {
            Some(pipe) => pipe,
            None => return,
        };
        match pipe.send(&head) {
            Ok(PipeSendStatus::Done) => {
                core.out_queue.get_mut(&pipe_id).unwrap().pop_front();
                core.protocol.on_send_complete(pipe_id, false);
            }
            Ok(PipeSendStatus::InProgress) => return,
            Ok(PipeSendStatus::Release) | Err(_) => {
                dead.insert(pipe_id);
                return;
            }
        }
    }
}

fn drive_pipes(core: &mut Core) {
    let ids: Vec<PipeId> = core.pipes.keys().copied().collect();
    let mut dead = HashSet::new();

    // Handshake each pipe forward and decode at most one frame per pipe
    // this tick, stashing it in the pipe's own data slot and telling
    // the protocol it's ready. Delivery order is decided below by
    // `Protocol::recv`, not by this loop's iteration order.
    for pipe_id in &ids {
        let started = {
            let pipe = core.pipes.get_mut(pipe_id).unwrap();
            if pipe.is_idle() {
                true
            } else {
                pipe.start().unwrap_or(false)
            }
        };
        if !started {
            continue;
        }
        core.protocol.on_pipe_out(*pipe_id);

        match core.pipes.get_mut(pipe_id).unwrap().recv() {
            Ok(PipeRecvStatus::Done(msg)) => {
                core.pipes.get_mut(pipe_id).unwrap().set_data(msg);
                core.protocol.on_pipe_in(*pipe_id);
            }
            Ok(PipeRecvStatus::InProgress) => {}
            Ok(PipeRecvStatus::Release) | Err(_) => {
                dead.insert(*pipe_id);
            }
        }

        flush_out_queue(core, *pipe_id, &mut dead);
    }

    // Drain the protocol's fair-queue selection until it runs dry; this
    // is what actually hands decoded frames to `on_recv_complete`.
    loop {
        let id = match core.protocol.recv() {
            RecvDecision::From(id) => id,
            RecvDecision::NotReady | RecvDecision::NotSupported => break,
        };
        let pending = core
            .pipes
            .get_mut(&id)
            .and_then(|pipe| pipe.data_mut::<Message>().map(|slot| std::mem::replace(slot, Message::new())));
        let msg = match pending {
            Some(msg) => msg,
            None => break,
        };
        if let Some(delivered) = core.protocol.on_recv_complete(id, msg, false) {
            core.recv_queue.push_back(delivered);
        }
    }

    for pipe_id in &dead {
        debug!("pipe [{:?}] released", pipe_id);
    }
    for pipe_id in dead {
        core.protocol.remove_pipe(pipe_id);
        core.pipes.remove(&pipe_id);
        core.out_queue.remove(&pipe_id);
        if let Some(endpoint_id) = core.pipe_endpoint.remove(&pipe_id) {
            if let Some(entry) = core.endpoints.get_mut(&endpoint_id) {
                entry.pipe = None;
                if entry.endpoint.direction() == Direction::Connect {
                    let backoff = entry.endpoint.on_error();
                    entry.next_retry = Some(Instant::now() + Duration::from_millis(backoff));
                }
            }
        }
        core.send_errors += 1;
    }
}
