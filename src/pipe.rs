// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! A pipe handshakes with its peer and then ferries raw messages over a
//! connection: send/receive a length prefix, then the payload, as the
//! connection's readiness allows. Grounded on `pipe.rs`'s `PipeState`
//! chain (`Initial` → `HandshakeTx` → `HandshakeRx` → `Idle`) and
//! `original_source/src/core/sock.c`'s `GRID_PIPE_RELEASE`/
//! `GRID_PIPE_PARSED` flags.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, error};

use crate::error::{Error, Result};
use crate::message::Message;

static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PipeId(pub u64);

impl PipeId {
    pub fn next() -> PipeId {
        PipeId(NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a transport gives a pipe: a duplex, non-blocking byte stream.
/// `try_read`/`try_write` return `Ok(None)` on `WouldBlock`, matching the
/// teacher's `transport::Connection`.
pub trait Connection: Send {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
    fn try_write(&mut self, buf: &[u8]) -> io::Result<Option<usize>>;
}

/// Blanket impl for any plain non-blocking `Read + Write` (TCP/IPC
/// streams register as `WouldBlock`-returning already).
impl<T: Read + Write + Send> Connection for T {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<Option<usize>> {
        match self.write(buf) {
            Ok(n) => Ok(Some(n)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Non-blocking result of offering a pipe a message to send or asking it
/// for one to receive (spec.md §4.D).
#[derive(Debug, PartialEq, Eq)]
pub enum PipeSendStatus {
    /// Message handed to the transport and fully flushed.
    Done,
    /// Queued; more `send_progress` calls are needed once writable.
    InProgress,
    /// Not ready right now (handshaking, or a partial write is ongoing) —
    /// caller must wait for the pipe's `OUT` signal.
    Release,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PipeRecvStatus {
    Done(Message),
    InProgress,
    Release,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    HandshakeTx,
    HandshakeRx,
    Idle,
    Stopping,
    Dead,
}

struct SendOp {
    prefix: [u8; 8],
    written: usize,
    body: Vec<u8>,
}

impl SendOp {
    fn new(msg: &Message) -> SendOp {
        let body = {
            let (header, body) = (msg.header().to_vec(), msg.body().to_vec());
            let mut full = header;
            full.extend_from_slice(&body);
            full
        };
        let mut prefix = [0u8; 8];
        BigEndian::write_u64(&mut prefix, full_len(&body));
        SendOp {
            prefix,
            written: 0,
            body,
        }
    }

    fn total_len(&self) -> usize {
        self.prefix.len() + self.body.len()
    }

    /// Drives the prefix, then the body, across `conn` until it would
    /// block or the frame is fully flushed.
    fn progress(&mut self, conn: &mut dyn Connection) -> io::Result<bool> {
        loop {
            if self.written == self.total_len() {
                return Ok(true);
            }
            fn frame_slice(this: &SendOp) -> &[u8] {
                if this.written < this.prefix.len() {
                    &this.prefix[this.written..]
                } else {
                    &this.body[this.written - this.prefix.len()..]
                }
            }
            match conn.try_write(frame_slice(self))? {
                Some(0) | None => return Ok(false),
                Some(n) => self.written += n,
            }
        }
    }
}

fn full_len(body: &[u8]) -> u64 {
    body.len() as u64
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum RecvStep {
    Prefix,
    Payload,
}

struct RecvOp {
    step: RecvStep,
    read: usize,
    prefix: [u8; 8],
    len: u64,
    buffer: Vec<u8>,
}

impl RecvOp {
    fn new() -> RecvOp {
        RecvOp {
            step: RecvStep::Prefix,
            read: 0,
            prefix: [0u8; 8],
            len: 0,
            buffer: Vec::new(),
        }
    }

    /// Returns `Some(message)` once a full frame has been read.
    fn progress(&mut self, conn: &mut dyn Connection) -> io::Result<Option<Message>> {
        if self.step == RecvStep::Prefix {
            match conn.try_read(&mut self.prefix[self.read..])? {
                Some(0) | None => return Ok(None),
                Some(n) => self.read += n,
            }
            if self.read < self.prefix.len() {
                return Ok(None);
            }
            self.len = BigEndian::read_u64(&self.prefix);
            self.buffer = vec![0u8; self.len as usize];
            self.read = 0;
            self.step = RecvStep::Payload;
        }

        if self.len == 0 {
            self.step = RecvStep::Prefix;
            self.read = 0;
            return Ok(Some(Message::with_body(Vec::new())));
        }

        match conn.try_read(&mut self.buffer[self.read..])? {
            Some(0) | None => Ok(None),
            Some(n) => {
                self.read += n;
                if self.read as u64 == self.len {
                    let buffer = std::mem::take(&mut self.buffer);
                    self.step = RecvStep::Prefix;
                    self.read = 0;
                    Ok(Some(Message::with_body(buffer)))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

/// The 8-byte SP opening handshake: `0x00 'S' 'P' 0x00`, then the
/// protocol id and its peer id (the matching receiver protocol), each
/// big-endian `u16`.
fn make_handshake(protocol_id: u16) -> [u8; 8] {
    let mut hs = [0u8; 8];
    hs[0] = 0x00;
    hs[1] = b'S';
    hs[2] = b'P';
    hs[3] = 0x00;
    BigEndian::write_u16(&mut hs[4..6], protocol_id);
    hs
}

fn check_handshake(received: &[u8; 8], expected_peer_id: u16) -> Result<()> {
    if received[0] != 0x00 || received[1] != b'S' || received[2] != b'P' || received[3] != 0x00 {
        return Err(Error::InvalidInput("bad SP handshake magic"));
    }
    let peer_id = BigEndian::read_u16(&received[4..6]);
    if peer_id != expected_peer_id {
        return Err(Error::ProtocolNotSupported);
    }
    Ok(())
}

/// One bidirectional message stream between a socket and a transport
/// connection (component D). `priority` is the send/recv priority this
/// pipe was added at, consumed by `crate::pattern`.
pub struct Pipe {
    id: PipeId,
    priority: u8,
    protocol_id: u16,
    protocol_peer_id: u16,
    conn: Box<dyn Connection>,
    phase: Phase,
    handshake_buf: [u8; 8],
    handshake_written: usize,
    handshake_read: usize,
    send_op: Option<SendOp>,
    recv_op: RecvOp,
    data: Option<Box<dyn std::any::Any + Send>>,
}

impl Pipe {
    pub fn new(
        priority: u8,
        protocol_id: u16,
        protocol_peer_id: u16,
        conn: Box<dyn Connection>,
    ) -> Pipe {
        Pipe {
            id: PipeId::next(),
            priority,
            protocol_id,
            protocol_peer_id,
            conn,
            phase: Phase::HandshakeTx,
            handshake_buf: [0u8; 8],
            handshake_written: 0,
            handshake_read: 0,
            send_op: None,
            recv_op: RecvOp::new(),
            data: None,
        }
    }

    pub fn id(&self) -> PipeId {
        self.id
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn is_dead(&self) -> bool {
        self.phase == Phase::Dead
    }

    pub fn set_data<T: std::any::Any + Send>(&mut self, data: T) {
        self.data = Some(Box::new(data));
    }

    pub fn data<T: std::any::Any>(&self) -> Option<&T> {
        self.data.as_deref().and_then(|d| d.downcast_ref())
    }

    pub fn data_mut<T: std::any::Any>(&mut self) -> Option<&mut T> {
        self.data.as_deref_mut().and_then(|d| d.downcast_mut())
    }

    /// Drives the handshake forward; called on every readiness
    /// notification while `phase` is `HandshakeTx`/`HandshakeRx`.
    pub fn start(&mut self) -> Result<bool> {
        if self.phase == Phase::HandshakeTx {
            if self.handshake_written == 0 {
                self.handshake_buf = make_handshake(self.protocol_id);
            }
            loop {
                if self.handshake_written == self.handshake_buf.len() {
                    self.phase = Phase::HandshakeRx;
                    break;
                }
                match self.conn.try_write(&self.handshake_buf[self.handshake_written..])? {
                    Some(0) | None => return Ok(false),
                    Some(n) => self.handshake_written += n,
                }
            }
        }

        if self.phase == Phase::HandshakeRx {
            loop {
                if self.handshake_read == self.handshake_buf.len() {
                    break;
                }
                match self.conn.try_read(&mut self.handshake_buf[self.handshake_read..])? {
                    Some(0) | None => return Ok(false),
                    Some(n) => self.handshake_read += n,
                }
            }
            if let Err(e) = check_handshake(&self.handshake_buf, self.protocol_peer_id) {
                error!("[{:?}] handshake rejected: {}", self.id, e);
                return Err(e);
            }
            debug!("[{:?}] handshake complete", self.id);
            self.phase = Phase::Idle;
        }

        Ok(self.phase == Phase::Idle)
    }

    pub fn stop(&mut self) {
        self.phase = Phase::Stopping;
    }

    /// Non-blocking send; see `PipeSendStatus`.
    pub fn send(&mut self, msg: &Message) -> Result<PipeSendStatus> {
        if self.phase != Phase::Idle && self.send_op.is_none() {
            return Ok(PipeSendStatus::Release);
        }
        if self.send_op.is_none() {
            self.send_op = Some(SendOp::new(msg));
        }
        let op = self.send_op.as_mut().unwrap();
        let done = op.progress(&mut *self.conn).map_err(map_io_err)?;
        if done {
            self.send_op = None;
            Ok(PipeSendStatus::Done)
        } else {
            Ok(PipeSendStatus::InProgress)
        }
    }

    /// Non-blocking recv; see `PipeRecvStatus`.
    pub fn recv(&mut self) -> Result<PipeRecvStatus> {
        if self.phase != Phase::Idle {
            return Ok(PipeRecvStatus::Release);
        }
        match self.recv_op.progress(&mut *self.conn).map_err(map_io_err)? {
            Some(msg) => Ok(PipeRecvStatus::Done(msg)),
            None => Ok(PipeRecvStatus::InProgress),
        }
    }
}

fn map_io_err(e: io::Error) -> Error {
    Error::from(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct MockConn {
        inbox: Arc<Mutex<VecDeque<u8>>>,
        outbox: Arc<Mutex<Vec<u8>>>,
    }

    impl MockConn {
        fn new() -> MockConn {
            MockConn {
                inbox: Arc::new(Mutex::new(VecDeque::new())),
                outbox: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn feed(&self, bytes: &[u8]) {
            self.inbox.lock().unwrap().extend(bytes.iter().copied());
        }

        fn take_written(&self) -> Vec<u8> {
            std::mem::take(&mut *self.outbox.lock().unwrap())
        }
    }

    impl Connection for MockConn {
        fn try_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
            let mut inbox = self.inbox.lock().unwrap();
            if inbox.is_empty() {
                return Ok(None);
            }
            let mut n = 0;
            for slot in buf.iter_mut() {
                match inbox.pop_front() {
                    Some(b) => {
                        *slot = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(Some(n))
        }

        fn try_write(&mut self, buf: &[u8]) -> io::Result<Option<usize>> {
            self.outbox.lock().unwrap().extend_from_slice(buf);
            Ok(Some(buf.len()))
        }
    }

    #[test]
    fn handshake_completes_and_reaches_idle() {
        let conn = MockConn::new();
        conn.feed(&make_handshake(16));
        let mut pipe = Pipe::new(8, 16, 16, Box::new(conn));

        assert!(pipe.start().unwrap());
        assert!(pipe.is_idle());
    }

    #[test]
    fn mismatched_peer_protocol_is_rejected() {
        let conn = MockConn::new();
        conn.feed(&make_handshake(17));
        let mut pipe = Pipe::new(8, 16, 16, Box::new(conn));

        assert!(pipe.start().is_err());
    }

    #[test]
    fn send_then_recv_round_trips_a_frame() {
        let conn = MockConn::new();
        conn.feed(&make_handshake(16));
        let handle = conn.clone();
        let mut pipe = Pipe::new(8, 16, 16, Box::new(conn));
        pipe.start().unwrap();

        let msg = Message::with_body(b"hello".to_vec());
        assert_eq!(pipe.send(&msg).unwrap(), PipeSendStatus::Done);

        // Loop the pipe's own outbox back into its inbox to simulate the peer.
        let sent = handle.take_written();
        handle.feed(&sent);

        match pipe.recv().unwrap() {
            PipeRecvStatus::Done(got) => assert_eq!(got.body(), b"hello"),
            other => panic!("expected Done, got {:?}", other),
        }
    }
}
