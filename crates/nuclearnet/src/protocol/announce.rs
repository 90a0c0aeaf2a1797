// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ANNOUNCE packet.
//!
//! ```text
//! [header kind=1] [tcpPort: u16 LE] [udpPort: u16 LE] [name: UTF-8] [0x00]
//! ```

use super::header::{PacketHeader, PacketKind, HEADER_LEN};
use crate::error::ProtocolError;

/// Fixed part of the ANNOUNCE body: two ports and the NUL terminator.
const ANNOUNCE_FIXED_LEN: usize = 5;

/// Announcement of an instance's name and listening ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncePacket {
    pub tcp_port: u16,
    pub udp_port: u16,
    pub name: String,
}

impl AnnouncePacket {
    pub fn new(name: impl Into<String>, tcp_port: u16, udp_port: u16) -> Self {
        Self {
            tcp_port,
            udp_port,
            name: name.into(),
        }
    }

    /// Encode header and body.
    pub fn encode(&self) -> Vec<u8> {
        let body_len = ANNOUNCE_FIXED_LEN + self.name.len();
        let mut buf = Vec::with_capacity(HEADER_LEN + body_len);
        PacketHeader::new(PacketKind::Announce, body_len).encode_into(&mut buf);
        buf.extend_from_slice(&self.tcp_port.to_le_bytes());
        buf.extend_from_slice(&self.udp_port.to_le_bytes());
        buf.extend_from_slice(self.name.as_bytes());
        buf.push(0);
        buf
    }

    /// Decode the body (bytes after the header).
    pub fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        if body.len() < ANNOUNCE_FIXED_LEN {
            return Err(ProtocolError::Truncated {
                needed: HEADER_LEN + ANNOUNCE_FIXED_LEN,
                actual: HEADER_LEN + body.len(),
            });
        }

        let tcp_port = u16::from_le_bytes([body[0], body[1]]);
        let udp_port = u16::from_le_bytes([body[2], body[3]]);

        let name_bytes = match body[4..].split_last() {
            Some((0, name)) if !name.contains(&0) => name,
            _ => return Err(ProtocolError::NameNotTerminated),
        };
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| ProtocolError::InvalidUtf8)?
            .to_owned();

        Ok(Self {
            tcp_port,
            udp_port,
            name,
        })
    }
}
