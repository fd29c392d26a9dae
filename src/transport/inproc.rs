// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! In-process transport: a `connect` looks up a name a `bind` previously
//! registered and hands both ends a byte-queue connection, no copy
//! further than the `Vec<u8>` chunks already crossing through `mpsc`.
//! Grounded on spec.md §4.I's "a direct ownership hand-off without
//! copy" and the teacher's global socket/transport registry shape
//! (`global.rs`), here scoped to just the inproc name table.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc;
use std::sync::{Mutex, OnceLock};

use crate::error::{Error, Result};
use crate::pipe::Connection;

use super::{Listener, Transport};

fn registry() -> &'static Mutex<HashMap<String, mpsc::Sender<InprocConn>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, mpsc::Sender<InprocConn>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub struct InprocConn {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

fn pair() -> (InprocConn, InprocConn) {
    let (tx_a, rx_b) = mpsc::channel();
    let (tx_b, rx_a) = mpsc::channel();
    (
        InprocConn { tx: tx_a, rx: rx_a, pending: Vec::new() },
        InprocConn { tx: tx_b, rx: rx_b, pending: Vec::new() },
    )
}

impl Connection for InprocConn {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        if self.pending.is_empty() {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending = chunk,
                Err(mpsc::TryRecvError::Empty) => return Ok(None),
                Err(mpsc::TryRecvError::Disconnected) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "inproc peer gone"))
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(Some(n))
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<Option<usize>> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "inproc peer gone"))?;
        Ok(Some(buf.len()))
    }
}

pub struct InprocListener {
    rx: mpsc::Receiver<InprocConn>,
    name: String,
}

impl Listener for InprocListener {
    fn try_accept(&mut self) -> Result<Option<Box<dyn Connection>>> {
        match self.rx.try_recv() {
            Ok(conn) => Ok(Some(Box::new(conn))),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => Ok(None),
        }
    }
}

impl Drop for InprocListener {
    fn drop(&mut self) {
        registry().lock().unwrap().remove(&self.name);
    }
}

pub struct InprocTransport;

impl InprocTransport {
    pub fn new() -> InprocTransport {
        InprocTransport
    }
}

impl Default for InprocTransport {
    fn default() -> InprocTransport {
        InprocTransport::new()
    }
}

impl Transport for InprocTransport {
    fn connect(&self, address: &str) -> Result<Box<dyn Connection>> {
        let sender = {
            let table = registry().lock().unwrap();
            table.get(address).cloned()
        };
        let sender = sender.ok_or(Error::ConnectionRefused)?;
        let (ours, theirs) = pair();
        sender.send(theirs).map_err(|_| Error::ConnectionRefused)?;
        Ok(Box::new(ours))
    }

    fn bind(&self, address: &str) -> Result<Box<dyn Listener>> {
        let mut table = registry().lock().unwrap();
        if table.contains_key(address) {
            return Err(Error::AddressInUse);
        }
        let (tx, rx) = mpsc::channel();
        table.insert(address.to_string(), tx);
        Ok(Box::new(InprocListener { rx, name: address.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_before_bind_is_refused() {
        let t = InprocTransport::new();
        assert!(matches!(t.connect("nobody-home"), Err(Error::ConnectionRefused)));
    }

    #[test]
    fn bind_then_connect_hands_the_listener_a_live_connection() {
        let t = InprocTransport::new();
        let mut listener = t.bind("pipeline").unwrap();
        assert!(listener.try_accept().unwrap().is_none());

        let mut client = t.connect("pipeline").unwrap();
        let mut server = loop {
            if let Some(c) = listener.try_accept().unwrap() {
                break c;
            }
        };

        client.try_write(b"hello").unwrap();
        let mut buf = [0u8; 16];
        let n = loop {
            if let Some(n) = server.try_read(&mut buf).unwrap() {
                break n;
            }
        };
        assert_eq!(&buf[..n], b"hello");
    }
}
