// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! scopemq: scalability-protocols messaging over pluggable transports.
//!
//! A socket is created with a [`SocketType`] through a [`Session`], wired
//! up with [`Socket::connect`]/[`Socket::bind`], and then used with
//! [`Socket::send`]/[`Socket::recv`]. Ten socket types are implemented —
//! `PAIR`, `PUB`/`SUB`, `REQ`/`REP`, `PUSH`/`PULL`, `SURVEYOR`/
//! `RESPONDENT`, `BUS` — over `inproc://`, `tcp://`, `ipc://` and `ws://`
//! transports.
//!
//! ```no_run
//! use scopemq::{Session, SocketType};
//!
//! let session = Session::new();
//! let server = session.create_socket(SocketType::Pair).unwrap();
//! server.bind("inproc://example").unwrap();
//!
//! let client = session.create_socket(SocketType::Pair).unwrap();
//! client.connect("inproc://example").unwrap();
//!
//! client.send(b"ping".to_vec()).unwrap();
//! assert_eq!(server.recv().unwrap(), b"ping");
//! ```

pub mod endpoint;
pub mod error;
pub mod fsm;
pub mod message;
pub mod pattern;
pub mod pipe;
pub mod proto;
pub mod session;
pub mod socket;
pub mod transport;

pub use endpoint::EndpointId;
pub use error::{Error, Result};
pub use message::Message;
pub use session::{Endpoint, Session, Socket, SocketOption, SocketType};
