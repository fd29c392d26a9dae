// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Transports: producers of an established non-blocking byte stream
//! (`pipe::Connection`) given a `bind`/`connect` address, per spec.md
//! §1's "treated as producers of an established byte stream" carve-out.
//! Grounded on the teacher's `transport/{tcp,ipc,inproc,ws}.rs` dispatch
//! by URL scheme (`transport/mod.rs::create_transport`).

pub mod inproc;
#[cfg(unix)]
pub mod ipc;
pub mod tcp;
pub mod ws;

use crate::error::{Error, Result};
use crate::pipe::Connection;

/// One accepted or established connection, handed to `pipe::Pipe::new`.
pub trait Listener: Send {
    /// Non-blocking accept; `Ok(None)` means no pending connection.
    fn try_accept(&mut self) -> Result<Option<Box<dyn Connection>>>;
}

pub trait Transport: Send + Sync {
    fn connect(&self, address: &str) -> Result<Box<dyn Connection>>;
    fn bind(&self, address: &str) -> Result<Box<dyn Listener>>;
}

/// Splits `<scheme>://<address>` per spec.md §6's URL grammar.
pub fn parse_url(url: &str) -> Result<(&str, &str)> {
    match url.split_once("://") {
        Some((scheme, address)) if !address.is_empty() => Ok((scheme, address)),
        _ => Err(Error::InvalidInput("malformed url, expected scheme://address")),
    }
}

/// Resolves a URL scheme to its transport, per spec.md §6: `inproc`,
/// `ipc`, `tcp`, `ws` (`tcpmux` is named in the grammar but not
/// implemented by this crate — see DESIGN.md).
pub fn transport_for(scheme: &str) -> Result<Box<dyn Transport>> {
    match scheme {
        "inproc" => Ok(Box::new(inproc::InprocTransport::new())),
        "tcp" => Ok(Box::new(tcp::TcpTransport::new())),
        #[cfg(unix)]
        "ipc" => Ok(Box::new(ipc::IpcTransport::new())),
        "ws" => Ok(Box::new(ws::WsTransport::new())),
        _ => Err(Error::ProtocolNotSupported),
    }
}
