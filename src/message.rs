// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The three-part message: `sp_header` (protocol-internal routing bytes),
//! kept as a plain owned buffer since it is small and rewritten on almost
//! every hop, and `body`, kept behind an `Arc` so that [`Message::bulkcopy`]
//! (used by the distributor, see `pattern::dist`) can hand the same payload
//! to every subscriber without a copy. `Arc` rather than `Rc` since a
//! socket's backend thread and the application thread both touch messages
//! through the same `Mutex`-guarded queue (`crate::socket`).

use std::sync::Arc;

/// A single SP message flowing through the library.
///
/// `sp_header.len()` is one of `0`, `4` (REQ/REP/SURVEYOR peer id) or a
/// multiple of 4 (REQ/REP backtrace stack); the pattern modules are
/// responsible for enforcing that invariant, this type just carries bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    sp_header: Vec<u8>,
    body: Arc<Vec<u8>>,
}

impl Message {
    pub fn new() -> Message {
        Message {
            sp_header: Vec::new(),
            body: Arc::new(Vec::new()),
        }
    }

    pub fn with_body(buffer: Vec<u8>) -> Message {
        Message {
            sp_header: Vec::new(),
            body: Arc::new(buffer),
        }
    }

    pub fn with_header_and_body(sp_header: Vec<u8>, body: Vec<u8>) -> Message {
        Message {
            sp_header,
            body: Arc::new(body),
        }
    }

    pub fn header(&self) -> &[u8] {
        &self.sp_header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_header(&mut self, header: Vec<u8>) {
        self.sp_header = header;
    }

    /// Pops `n` bytes off the front of the header, returning them.
    pub fn trim_header(&mut self, n: usize) -> Vec<u8> {
        let tail = self.sp_header.split_off(n.min(self.sp_header.len()));
        std::mem::replace(&mut self.sp_header, tail)
    }

    pub fn prepend_header(&mut self, prefix: &[u8]) {
        let mut next = Vec::with_capacity(prefix.len() + self.sp_header.len());
        next.extend_from_slice(prefix);
        next.extend_from_slice(&self.sp_header);
        self.sp_header = next;
    }

    /// Replaces the body with a new chunk, dropping the old one.
    pub fn replace_body(&mut self, new_body: Vec<u8>) {
        self.body = Arc::new(new_body);
    }

    /// Consumes the message into its owned `(header, body)` buffers. If the
    /// body is still shared (refcount > 1) this clones it, mirroring the
    /// C source's copy-on-write-on-mutation rule.
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        let body = Arc::try_unwrap(self.body).unwrap_or_else(|rc| (*rc).clone());
        (self.sp_header, body)
    }

    pub fn into_body(self) -> Vec<u8> {
        self.into_parts().1
    }

    /// One logical copy sharing the same body storage: the refcount bump
    /// that stands in for `grid_msg_bulkcopy_cp`.
    pub fn bulkcopy(&self) -> Message {
        Message {
            sp_header: self.sp_header.clone(),
            body: Arc::clone(&self.body),
        }
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }
}

impl Default for Message {
    fn default() -> Message {
        Message::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulkcopy_yields_independent_messages_sharing_storage() {
        let original = Message::with_header_and_body(vec![1, 2, 3, 4], vec![65, 66, 67]);
        let copies: Vec<Message> = (0..4).map(|_| original.bulkcopy()).collect();

        for copy in &copies {
            assert_eq!(copy.body(), original.body());
            assert_eq!(copy.header(), original.header());
        }
        assert_eq!(Arc::strong_count(&original.body), 5);
    }

    #[test]
    fn trim_header_splits_backtrace_entries() {
        let mut msg = Message::with_header_and_body(vec![0, 0, 0, 1, 0x80, 0, 0, 2], vec![]);
        let popped = msg.trim_header(4);
        assert_eq!(popped, vec![0, 0, 0, 1]);
        assert_eq!(msg.header(), &[0x80, 0, 0, 2]);
    }

    #[test]
    fn prepend_header_adds_a_routing_prefix() {
        let mut msg = Message::with_header_and_body(vec![9, 9], vec![]);
        msg.prepend_header(&[1, 2, 3, 4]);
        assert_eq!(msg.header(), &[1, 2, 3, 4, 9, 9]);
    }
}
