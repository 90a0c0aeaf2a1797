// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! NUClearNet wire codec.
//!
//! Pure encode/decode of the packet header and the two packet kinds.
//! Nothing in here touches a socket.
//!
//! ```text
//! Header (all packets):  [0xE2 0x98 0xA2] [version:u8] [kind:u8] [length:u32-LE]
//! ANNOUNCE body:         [tcpPort:u16-LE] [udpPort:u16-LE] [name: UTF-8, NUL-terminated]
//! DATA body:             [messageId:u16-LE] [fragmentIndex:u16-LE] [fragmentCount:u16-LE]
//!                        [wasMulticast:u8] [typeHash:16 bytes] [fragment payload bytes...]
//! ```

pub mod announce;
pub mod data;
pub mod hash;
pub mod header;

pub use announce::AnnouncePacket;
pub use data::{DataPacket, DATA_HEADER_LEN};
pub use hash::{xxh64, TypeHash, WIRE_HASH_LEN};
pub use header::{PacketHeader, PacketKind, HEADER_LEN};

use crate::error::ProtocolError;

/// A decoded packet of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePacket {
    Announce(AnnouncePacket),
    Data(DataPacket),
}

impl WirePacket {
    /// Decode one complete packet.
    ///
    /// The declared length must match the bytes after the header exactly.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let header = PacketHeader::parse(buf)?;
        let body = &buf[HEADER_LEN..];
        if header.length as usize != body.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: header.length as usize,
                actual: body.len(),
            });
        }

        match header.kind {
            PacketKind::Announce => AnnouncePacket::decode_body(body).map(Self::Announce),
            PacketKind::Data => DataPacket::decode_body(body).map(Self::Data),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Announce(packet) => packet.encode(),
            Self::Data(packet) => packet.encode(),
        }
    }
}
