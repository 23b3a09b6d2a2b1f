use shared::error::{Error, Result};
use std::collections::HashMap;

use crate::handshake::{HandshakeHeader, HandshakeType, HANDSHAKE_HEADER_LENGTH};
use crate::record::MAX_FRAGMENT_SIZE;

/// Upper bound on buffered fragment bytes, against hostile peers.
const MAX_BUFFERED_BYTES: usize = 1 << 20;

struct PartialMessage {
    handshake_type: HandshakeType,
    length: usize,
    received: Vec<bool>,
    body: Vec<u8>,
}

/// Reassembles fragmented handshake messages, keyed by `message_seq` and
/// ordered by fragment offset (RFC 6347 section 4.2.3).
#[derive(Default)]
pub struct FragmentBuffer {
    partials: HashMap<u16, PartialMessage>,
    buffered: usize,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one handshake fragment (header included). Returns the complete
    /// message `(type, message_seq, body)` once every byte has arrived.
    pub fn push(&mut self, fragment: &[u8]) -> Result<Option<(HandshakeType, u16, Vec<u8>)>> {
        let header = HandshakeHeader::unmarshal(fragment)?;
        let body = &fragment[HANDSHAKE_HEADER_LENGTH..];

        if body.len() != header.fragment_length as usize {
            return Err(Error::ErrLengthMismatch);
        }
        if header.length as usize > MAX_FRAGMENT_SIZE {
            return Err(Error::ErrFragmentBufferOverflow {
                new_size: header.length as usize,
                max_size: MAX_FRAGMENT_SIZE,
            });
        }
        if header.fragment_length == 0 && header.length != 0 {
            return Err(Error::ErrEmptyFragment);
        }
        if header.fragment_offset as usize + body.len() > header.length as usize {
            return Err(Error::ErrLengthMismatch);
        }

        let partial = self
            .partials
            .entry(header.message_sequence)
            .or_insert_with(|| PartialMessage {
                handshake_type: header.handshake_type,
                length: header.length as usize,
                received: vec![false; header.length as usize],
                body: vec![0u8; header.length as usize],
            });

        if partial.handshake_type != header.handshake_type
            || partial.length != header.length as usize
        {
            return Err(Error::ErrLengthMismatch);
        }

        let offset = header.fragment_offset as usize;
        for (i, b) in body.iter().enumerate() {
            if !partial.received[offset + i] {
                self.buffered += 1;
            }
            partial.received[offset + i] = true;
            partial.body[offset + i] = *b;
        }

        if self.buffered > MAX_BUFFERED_BYTES {
            return Err(Error::ErrFragmentBufferOverflow {
                new_size: self.buffered,
                max_size: MAX_BUFFERED_BYTES,
            });
        }

        if partial.received.iter().all(|r| *r) {
            let complete = self.partials.remove(&header.message_sequence).unwrap();
            self.buffered -= complete.length;
            return Ok(Some((
                complete.handshake_type,
                header.message_sequence,
                complete.body,
            )));
        }

        Ok(None)
    }

    pub fn clear(&mut self) {
        self.partials.clear();
        self.buffered = 0;
    }
}

#[cfg(test)]
mod fragment_test {
    use super::*;

    fn fragment(
        typ: HandshakeType,
        seq: u16,
        total: u32,
        offset: u32,
        body: &[u8],
    ) -> Vec<u8> {
        let header = HandshakeHeader {
            handshake_type: typ,
            length: total,
            message_sequence: seq,
            fragment_offset: offset,
            fragment_length: body.len() as u32,
        };
        let mut out = header.marshal();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_unfragmented_message() {
        let mut buf = FragmentBuffer::new();
        let out = buf
            .push(&fragment(HandshakeType::Finished, 5, 4, 0, &[1, 2, 3, 4]))
            .unwrap();
        assert_eq!(out, Some((HandshakeType::Finished, 5, vec![1, 2, 3, 4])));
    }

    #[test]
    fn test_out_of_order_fragments() {
        let mut buf = FragmentBuffer::new();
        // second half first
        assert_eq!(
            buf.push(&fragment(HandshakeType::Certificate, 2, 6, 3, &[4, 5, 6]))
                .unwrap(),
            None
        );
        let out = buf
            .push(&fragment(HandshakeType::Certificate, 2, 6, 0, &[1, 2, 3]))
            .unwrap();
        assert_eq!(
            out,
            Some((HandshakeType::Certificate, 2, vec![1, 2, 3, 4, 5, 6]))
        );
    }

    #[test]
    fn test_duplicate_fragment_is_idempotent() {
        let mut buf = FragmentBuffer::new();
        let frag = fragment(HandshakeType::ClientHello, 0, 4, 0, &[9, 9]);
        assert_eq!(buf.push(&frag).unwrap(), None);
        assert_eq!(buf.push(&frag).unwrap(), None);
        let out = buf
            .push(&fragment(HandshakeType::ClientHello, 0, 4, 2, &[8, 8]))
            .unwrap();
        assert_eq!(out, Some((HandshakeType::ClientHello, 0, vec![9, 9, 8, 8])));
    }

    #[test]
    fn test_fragment_past_end_rejected() {
        let mut buf = FragmentBuffer::new();
        assert!(buf
            .push(&fragment(HandshakeType::ClientHello, 0, 4, 3, &[1, 2]))
            .is_err());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut buf = FragmentBuffer::new();
        let header = HandshakeHeader {
            handshake_type: HandshakeType::Certificate,
            length: (MAX_FRAGMENT_SIZE + 1) as u32,
            message_sequence: 0,
            fragment_offset: 0,
            fragment_length: 1,
        };
        let mut raw = header.marshal();
        raw.push(0);
        assert!(buf.push(&raw).is_err());
    }
}
