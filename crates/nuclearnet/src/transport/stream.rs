// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet framing for the TCP byte stream.
//!
//! TCP has no message boundaries. Every NUClearNet packet starts with the
//! 9-byte header whose length field tells how many bytes follow, so the
//! framer buffers until a whole packet is available:
//!
//! ```text
//! +--------------------------------+----------------------+
//! | magic | ver | kind | length LE | length bytes of body |
//! +--------------------------------+----------------------+
//! ```
//!
//! A bad header cannot be skipped (the next boundary is unknown), so header
//! errors are fatal for the connection. Body errors are not the framer's
//! concern: it returns the raw packet and the caller decodes it.

use crate::error::ProtocolError;
use crate::protocol::{PacketHeader, HEADER_LEN};

/// Incremental packet framer for one TCP connection.
#[derive(Debug)]
pub struct PacketFramer {
    /// Received bytes not yet returned as packets
    buffer: Vec<u8>,

    /// Read position in `buffer`
    pos: usize,

    /// Maximum body length (anti-OOM protection)
    max_size: usize,

    /// Statistics: packets framed
    packets_framed: u64,
}

impl PacketFramer {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(16384),
            pos: 0,
            max_size,
            packets_framed: 0,
        }
    }

    /// Append bytes read from the socket.
    pub fn feed(&mut self, data: &[u8]) {
        // Compact once most of the buffer has been consumed
        if self.pos > 0 && self.pos > self.buffer.len() / 2 {
            self.buffer.drain(..self.pos);
            self.pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete packet (header included).
    ///
    /// Returns `Ok(None)` until enough bytes are buffered. Call repeatedly
    /// after each `feed` until it does.
    pub fn next_packet(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let available = &self.buffer[self.pos..];
        if available.len() < HEADER_LEN {
            return Ok(None);
        }

        let header = PacketHeader::parse(available)?;
        if header.length as usize > self.max_size {
            return Err(ProtocolError::FrameTooLarge {
                len: header.length as usize,
                max: self.max_size,
            });
        }

        let total = header.packet_len();
        if available.len() < total {
            return Ok(None);
        }

        let packet = available[..total].to_vec();
        self.pos += total;
        self.packets_framed += 1;
        Ok(Some(packet))
    }

    /// Bytes buffered but not yet framed.
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Whether a packet is partially buffered.
    pub fn is_partial(&self) -> bool {
        self.buffered() > 0
    }

    pub fn packets_framed(&self) -> u64 {
        self.packets_framed
    }
}
