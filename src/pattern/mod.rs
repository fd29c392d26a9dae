// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Reusable per-socket-type building blocks, grounded on
//! `original_source/src/protocols/utils/*.c`: a 16-slot round-robin
//! priority scheduler shared by [`fq`] (inbound) and [`lb`] (outbound), a
//! broadcast pipe set ([`dist`]), a subscription trie for SUB sockets
//! ([`trie`]), and the REQ/REP backtrace helpers ([`backtrace`]). The
//! socket types in `crate::proto` compose these; none of them touch
//! `Pipe` I/O directly.

pub mod backtrace;
pub mod dist;
pub mod fq;
pub mod lb;
pub mod priolist;
pub mod trie;

pub use backtrace::{PeerKeyAllocator, RequestIdAllocator};
pub use dist::Distributor;
pub use fq::FairQueue;
pub use lb::LoadBalance;
pub use priolist::Priolist;
pub use trie::SubscriptionTrie;
