// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Error kinds shared across the library, plus conversion helpers that mirror
//! the teacher's `global::*_io_error` constructors.

use std::fmt;
use std::io;

/// Failure surfaced by a blocking `send`/`recv` or by a socket-level call.
///
/// Most variants map onto a stable [`io::ErrorKind`] so existing callers that
/// only look at `io::Error` keep working; a couple (`Fsm`) have no clean
/// `ErrorKind` counterpart and fall back to `ErrorKind::Other`.
#[derive(Debug)]
pub enum Error {
    /// Operation deadline elapsed; caller may retry.
    TimedOut,
    /// Non-blocking call would have blocked.
    WouldBlock,
    /// Library-wide `term()` was called; permanent.
    Terminated,
    /// Socket is closed or closing; permanent.
    BadHandle,
    /// Bad FSM state (e.g. surveyor recv with no in-progress survey and no
    /// recent timeout).
    Fsm,
    /// Malformed option value or message header.
    InvalidInput(&'static str),
    /// Wrong socket type, or unknown option.
    NotSupported(&'static str),
    /// Transport-level fault.
    AddressInUse,
    ConnectionRefused,
    Unreachable,
    ProtocolNotSupported,
    /// Anything else, wrapping the underlying I/O error.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TimedOut => write!(f, "timed out"),
            Error::WouldBlock => write!(f, "operation would block"),
            Error::Terminated => write!(f, "library terminated"),
            Error::BadHandle => write!(f, "bad socket handle"),
            Error::Fsm => write!(f, "operation not valid in current state"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Error::NotSupported(msg) => write!(f, "not supported: {}", msg),
            Error::AddressInUse => write!(f, "address in use"),
            Error::ConnectionRefused => write!(f, "connection refused"),
            Error::Unreachable => write!(f, "address unreachable"),
            Error::ProtocolNotSupported => write!(f, "protocol family not supported"),
            Error::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        match e.kind() {
            io::ErrorKind::TimedOut => Error::TimedOut,
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => Error::BadHandle,
            io::ErrorKind::AddrInUse => Error::AddressInUse,
            io::ErrorKind::ConnectionRefused => Error::ConnectionRefused,
            io::ErrorKind::AddrNotAvailable | io::ErrorKind::HostUnreachable => Error::Unreachable,
            _ => Error::Io(e),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        match e {
            Error::TimedOut => io::Error::new(io::ErrorKind::TimedOut, "timed out"),
            Error::WouldBlock => io::Error::new(io::ErrorKind::WouldBlock, "would block"),
            Error::Terminated => io::Error::new(io::ErrorKind::Other, "terminated"),
            Error::BadHandle => io::Error::new(io::ErrorKind::NotConnected, "bad handle"),
            Error::Fsm => io::Error::new(io::ErrorKind::Other, "bad fsm state"),
            Error::InvalidInput(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            Error::NotSupported(msg) => io::Error::new(io::ErrorKind::Other, msg),
            Error::AddressInUse => io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
            Error::ConnectionRefused => {
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")
            }
            Error::Unreachable => io::Error::new(io::ErrorKind::Other, "unreachable"),
            Error::ProtocolNotSupported => {
                io::Error::new(io::ErrorKind::Other, "protocol not supported")
            }
            Error::Io(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn other_io_error(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, msg)
}

pub fn invalid_data_io_error(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

pub fn would_block_io_error(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::WouldBlock, msg)
}

pub fn invalid_input_io_error(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}
