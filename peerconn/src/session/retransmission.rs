//! The sender-side retransmission history consulted when NACKs arrive.

/// How many sent packets are retained; a power of two so `seq % N` is cheap.
pub const RETRANSMISSION_BUFFER_SIZE: usize = 128;

/// A circular buffer of the last sent packets, indexed by
/// `seq % RETRANSMISSION_BUFFER_SIZE` with overwrite-on-wrap.
pub struct RetransmissionBuffer {
    slots: Vec<Option<rtp::Packet>>,
}

impl Default for RetransmissionBuffer {
    fn default() -> Self {
        RetransmissionBuffer {
            slots: (0..RETRANSMISSION_BUFFER_SIZE).map(|_| None).collect(),
        }
    }
}

impl RetransmissionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, packet: rtp::Packet) {
        let index = packet.header.sequence_number as usize % RETRANSMISSION_BUFFER_SIZE;
        self.slots[index] = Some(packet);
    }

    /// Returns the stored packet for `seq`, verifying the slot was not
    /// overwritten by a later packet that maps to the same index.
    pub fn get(&self, seq: u16) -> Option<&rtp::Packet> {
        let index = seq as usize % RETRANSMISSION_BUFFER_SIZE;
        self.slots[index]
            .as_ref()
            .filter(|p| p.header.sequence_number == seq)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod retransmission_test {
    use super::*;
    use bytes::Bytes;

    fn packet(seq: u16) -> rtp::Packet {
        rtp::Packet {
            header: rtp::Header {
                version: 2,
                sequence_number: seq,
                ..Default::default()
            },
            payload: Bytes::from_static(b"x"),
            padding_size: 0,
        }
    }

    #[test]
    fn test_put_get() {
        let mut buf = RetransmissionBuffer::new();
        for seq in 0..100u16 {
            buf.put(packet(seq));
        }
        assert_eq!(buf.get(50).unwrap().header.sequence_number, 50);
        assert!(buf.get(100).is_none());
    }

    #[test]
    fn test_overwrite_on_wrap() {
        let mut buf = RetransmissionBuffer::new();
        buf.put(packet(10));
        // 138 maps to the same slot (138 % 128 == 10)
        buf.put(packet(138));
        assert!(buf.get(10).is_none(), "overwritten slot must not lie");
        assert_eq!(buf.get(138).unwrap().header.sequence_number, 138);
    }

    #[test]
    fn test_unknown_seq_skipped() {
        let buf = RetransmissionBuffer::new();
        assert!(buf.get(7).is_none());
    }
}
