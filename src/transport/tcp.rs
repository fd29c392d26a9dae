// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! TCP transport: a thin non-blocking wrapper over `std::net`. Grounded
//! on the teacher's `transport/tcp.rs` connect/bind shape; this crate's
//! `pipe::Connection` blanket impl over `Read + Write` already covers
//! `TcpStream` once it's in non-blocking mode, so this module is mostly
//! address parsing and listener bookkeeping.

use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::error::{Error, Result};
use crate::pipe::Connection;

use super::{Listener, Transport};

pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> TcpTransport {
        TcpTransport
    }
}

impl Default for TcpTransport {
    fn default() -> TcpTransport {
        TcpTransport::new()
    }
}

impl Transport for TcpTransport {
    fn connect(&self, address: &str) -> Result<Box<dyn Connection>> {
        let mut addrs = address
            .to_socket_addrs()
            .map_err(|_| Error::InvalidInput("malformed tcp address"))?;
        let addr = addrs.next().ok_or(Error::Unreachable)?;
        let stream = TcpStream::connect(addr)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true).ok();
        Ok(Box::new(stream))
    }

    fn bind(&self, address: &str) -> Result<Box<dyn Listener>> {
        let mut addrs = address
            .to_socket_addrs()
            .map_err(|_| Error::InvalidInput("malformed tcp address"))?;
        let addr = addrs.next().ok_or(Error::Unreachable)?;
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Box::new(TcpListenerWrapper { listener }))
    }
}

struct TcpListenerWrapper {
    listener: TcpListener,
}

impl Listener for TcpListenerWrapper {
    fn try_accept(&mut self) -> Result<Option<Box<dyn Connection>>> {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(true)?;
                stream.set_nodelay(true).ok();
                Ok(Some(Box::new(stream)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
