// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! IPC transport: Unix domain sockets. The teacher additionally supports
//! Windows named pipes (`miow`/`mio-named-pipes`); this crate narrows
//! IPC to Unix domain sockets only (`std::os::unix::net`, no extra
//! dependency needed) — see DESIGN.md for the dropped Windows deps.

#![cfg(unix)]

use std::os::unix::net::{UnixListener, UnixStream};

use crate::error::Result;
use crate::pipe::Connection;

use super::{Listener, Transport};

pub struct IpcTransport;

impl IpcTransport {
    pub fn new() -> IpcTransport {
        IpcTransport
    }
}

impl Default for IpcTransport {
    fn default() -> IpcTransport {
        IpcTransport::new()
    }
}

impl Transport for IpcTransport {
    fn connect(&self, address: &str) -> Result<Box<dyn Connection>> {
        let stream = UnixStream::connect(address)?;
        stream.set_nonblocking(true)?;
        Ok(Box::new(stream))
    }

    fn bind(&self, address: &str) -> Result<Box<dyn Listener>> {
        // A stale socket file from a previous run would otherwise make
        // every bind fail with AddrInUse.
        let _ = std::fs::remove_file(address);
        let listener = UnixListener::bind(address)?;
        listener.set_nonblocking(true)?;
        Ok(Box::new(UnixListenerWrapper { listener }))
    }
}

struct UnixListenerWrapper {
    listener: UnixListener,
}

impl Listener for UnixListenerWrapper {
    fn try_accept(&mut self) -> Result<Option<Box<dyn Connection>>> {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(true)?;
                Ok(Some(Box::new(stream)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
