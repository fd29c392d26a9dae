// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! REQ/REP backtrace: the sp_header carries a stack of 32-bit big-endian
//! ids, innermost peer first, each `< 0x80000000` except the terminator
//! (high bit set). Grounded on
//! `original_source/src/protocols/reqrep/xrep.c`.

use byteorder::{BigEndian, ByteOrder};
use rand::RngCore;

const TERMINATOR_BIT: u32 = 0x8000_0000;
const KEY_MASK: u32 = 0x7fff_ffff;

/// Generates 31-bit peer keys for a REP-side socket's outbound-pipe hash,
/// starting from a random seed so restarts don't collide with a peer's
/// memory of a previous incarnation's keys (mirrors `grid_random_generate`
/// feeding `xrep->next_key`).
pub struct PeerKeyAllocator {
    next: u32,
}

impl PeerKeyAllocator {
    pub fn new() -> PeerKeyAllocator {
        let mut seed = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut seed);
        PeerKeyAllocator {
            next: BigEndian::read_u32(&seed),
        }
    }

    /// Next 31-bit key, masked so it never collides with the terminator bit.
    pub fn next_key(&mut self) -> u32 {
        let key = self.next & KEY_MASK;
        self.next = self.next.wrapping_add(1);
        key
    }
}

impl Default for PeerKeyAllocator {
    fn default() -> PeerKeyAllocator {
        PeerKeyAllocator::new()
    }
}

/// Generates REQ request ids. A REQ socket is always the bottom of the
/// backtrace stack, so its own id always carries the terminator bit.
pub struct RequestIdAllocator {
    next: u32,
}

impl RequestIdAllocator {
    pub fn new() -> RequestIdAllocator {
        let mut seed = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut seed);
        RequestIdAllocator {
            next: BigEndian::read_u32(&seed),
        }
    }

    pub fn next_id(&mut self) -> u32 {
        let id = (self.next & KEY_MASK) | TERMINATOR_BIT;
        self.next = self.next.wrapping_add(1);
        id
    }
}

impl Default for RequestIdAllocator {
    fn default() -> RequestIdAllocator {
        RequestIdAllocator::new()
    }
}

pub fn encode_id(id: u32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, id);
    buf
}

pub fn decode_id(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 4 {
        None
    } else {
        Some(BigEndian::read_u32(bytes))
    }
}

pub fn is_terminator(id: u32) -> bool {
    id & TERMINATOR_BIT != 0
}

/// Splits the leading backtrace stack off the front of `body`, stopping
/// right after the first id whose terminator bit is set. Returns
/// `(header_bytes, remaining_body_offset)`, or `None` if `body` doesn't
/// contain a terminated stack (malformed request — caller should drop it,
/// per xrep.c's "ignore the malformed requests without the bottom of the
/// stack").
pub fn split_backtrace(body: &[u8]) -> Option<(Vec<u8>, usize)> {
    let mut i = 0;
    loop {
        let start = i * 4;
        if start + 4 > body.len() {
            return None;
        }
        let id = BigEndian::read_u32(&body[start..start + 4]);
        i += 1;
        if is_terminator(id) {
            break;
        }
    }
    let header_len = i * 4;
    Some((body[..header_len].to_vec(), header_len))
}
