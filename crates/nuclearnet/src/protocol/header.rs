// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed 9-byte packet header.
//!
//! ```text
//! +------+------+------+---------+------+------------------+
//! | 0xE2 | 0x98 | 0xA2 | version | kind | length (u32 LE)  |
//! +------+------+------+---------+------+------------------+
//!   0      1      2      3         4      5..9
//! ```
//!
//! `length` counts the bytes following the header. TCP readers use it to
//! know how much to buffer before a packet is complete.

use crate::config::{MAGIC, PROTOCOL_VERSION};
use crate::error::ProtocolError;

/// Header size in bytes.
pub const HEADER_LEN: usize = 9;

/// Packet kind discriminator (byte 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Announce = 1,
    Data = 2,
}

impl TryFrom<u8> for PacketKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Announce),
            2 => Ok(Self::Data),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketKind,
    /// Bytes following the header.
    pub length: u32,
}

impl PacketHeader {
    pub fn new(kind: PacketKind, length: usize) -> Self {
        Self {
            kind,
            length: length as u32,
        }
    }

    /// Append the header to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&MAGIC);
        buf.push(PROTOCOL_VERSION);
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.length.to_le_bytes());
    }

    /// Parse the header at the start of `buf`.
    ///
    /// Only the first [`HEADER_LEN`] bytes are inspected; the declared length
    /// is not checked against the rest of the buffer.
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                needed: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let magic = [buf[0], buf[1], buf[2]];
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }
        if buf[3] != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(buf[3]));
        }
        let kind = PacketKind::try_from(buf[4])?;
        let length = u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]);

        Ok(Self { kind, length })
    }

    /// Total packet size (header + body).
    pub fn packet_len(&self) -> usize {
        HEADER_LEN + self.length as usize
    }
}
