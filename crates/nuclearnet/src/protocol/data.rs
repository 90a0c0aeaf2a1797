// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DATA packet.
//!
//! ```text
//! [header kind=2]
//! [messageId: u16 LE] [fragmentIndex: u16 LE] [fragmentCount: u16 LE]
//! [wasMulticast: u8]  [typeHash: 16 bytes]    [fragment payload ...]
//! ```
//!
//! `wasMulticast` is 0 when the packet was sent to the multicast group.

use super::hash::{TypeHash, WIRE_HASH_LEN};
use super::header::{PacketHeader, PacketKind, HEADER_LEN};
use crate::error::ProtocolError;

/// Fixed part of the DATA body.
pub const DATA_BODY_FIXED_LEN: usize = 2 + 2 + 2 + 1 + WIRE_HASH_LEN;

/// Header plus fixed DATA fields (32 bytes).
pub const DATA_HEADER_LEN: usize = HEADER_LEN + DATA_BODY_FIXED_LEN;

/// One DATA fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub message_id: u16,
    pub fragment_index: u16,
    pub fragment_count: u16,
    /// Sent to the multicast group rather than unicast.
    pub multicast: bool,
    /// Raw 16-byte hash field, kept verbatim so re-encoding is exact.
    pub hash: [u8; WIRE_HASH_LEN],
    pub payload: Vec<u8>,
}

impl DataPacket {
    /// Routing hash carried by this packet.
    pub fn type_hash(&self) -> TypeHash {
        TypeHash::from_wire(&self.hash)
    }

    /// Encode header and body.
    pub fn encode(&self) -> Vec<u8> {
        let body_len = DATA_BODY_FIXED_LEN + self.payload.len();
        let mut buf = Vec::with_capacity(HEADER_LEN + body_len);
        PacketHeader::new(PacketKind::Data, body_len).encode_into(&mut buf);
        buf.extend_from_slice(&self.message_id.to_le_bytes());
        buf.extend_from_slice(&self.fragment_index.to_le_bytes());
        buf.extend_from_slice(&self.fragment_count.to_le_bytes());
        buf.push(if self.multicast { 0 } else { 1 });
        buf.extend_from_slice(&self.hash);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode the body (bytes after the header).
    pub fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        if body.len() < DATA_BODY_FIXED_LEN {
            return Err(ProtocolError::Truncated {
                needed: DATA_HEADER_LEN,
                actual: HEADER_LEN + body.len(),
            });
        }

        let message_id = u16::from_le_bytes([body[0], body[1]]);
        let fragment_index = u16::from_le_bytes([body[2], body[3]]);
        let fragment_count = u16::from_le_bytes([body[4], body[5]]);
        if fragment_count == 0 || fragment_index >= fragment_count {
            return Err(ProtocolError::InvalidFragment {
                index: fragment_index,
                count: fragment_count,
            });
        }

        let multicast = body[6] == 0;
        let mut hash = [0u8; WIRE_HASH_LEN];
        hash.copy_from_slice(&body[7..7 + WIRE_HASH_LEN]);

        Ok(Self {
            message_id,
            fragment_index,
            fragment_count,
            multicast,
            hash,
            payload: body[DATA_BODY_FIXED_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataPacket {
        DataPacket {
            message_id: 0x0102,
            fragment_index: 1,
            fragment_count: 3,
            multicast: false,
            hash: TypeHash::of("nuclearnet").to_wire(),
            payload: vec![0xAA, 0xBB],
        }
    }

    #[test]
    fn test_header_len() {
        assert_eq!(DATA_HEADER_LEN, 32);
    }

    #[test]
    fn test_encode_layout() {
        let bytes = sample().encode();
        assert_eq!(bytes.len(), 34);
        assert_eq!(&bytes[..5], &[0xE2, 0x98, 0xA2, 0x01, 0x02]);
        assert_eq!(&bytes[5..9], &25u32.to_le_bytes());
        assert_eq!(&bytes[9..15], &[0x02, 0x01, 0x01, 0x00, 0x03, 0x00]);
        assert_eq!(bytes[15], 1); // unicast
        assert_eq!(
            &bytes[16..24],
            &[0x71, 0x22, 0x69, 0x11, 0xef, 0x52, 0x89, 0xe4]
        );
        assert_eq!(&bytes[24..32], &[0u8; 8]);
        assert_eq!(&bytes[32..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_multicast_flag() {
        let mut packet = sample();
        packet.multicast = true;
        let bytes = packet.encode();
        assert_eq!(bytes[15], 0);
        let decoded = DataPacket::decode_body(&bytes[HEADER_LEN..]).unwrap();
        assert!(decoded.multicast);
    }

    #[test]
    fn test_decode_body() {
        let packet = sample();
        let bytes = packet.encode();
        let decoded = DataPacket::decode_body(&bytes[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.type_hash(), TypeHash::of("nuclearnet"));
    }

    #[test]
    fn test_empty_payload() {
        let mut packet = sample();
        packet.payload.clear();
        let bytes = packet.encode();
        assert_eq!(bytes.len(), DATA_HEADER_LEN);
        assert!(DataPacket::decode_body(&bytes[HEADER_LEN..])
            .unwrap()
            .payload
            .is_empty());
    }

    #[test]
    fn test_reject_bad_fragment_numbers() {
        let mut packet = sample();
        packet.fragment_index = 3;
        let bytes = packet.encode();
        assert_eq!(
            DataPacket::decode_body(&bytes[HEADER_LEN..]),
            Err(ProtocolError::InvalidFragment { index: 3, count: 3 })
        );

        packet.fragment_index = 0;
        packet.fragment_count = 0;
        let bytes = packet.encode();
        assert!(DataPacket::decode_body(&bytes[HEADER_LEN..]).is_err());
    }

    #[test]
    fn test_reject_short_body() {
        assert!(matches!(
            DataPacket::decode_body(&[0u8; 22]),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}
