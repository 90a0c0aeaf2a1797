// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sender side: split a payload into DATA packets.

use crate::config::MESSAGE_ID_MODULUS;
use crate::error::{Error, Result};
use crate::protocol::{DataPacket, TypeHash};

/// Splits payloads into `ceil(len / max_fragment)` DATA packets.
#[derive(Debug, Clone, Copy)]
pub struct Fragmenter {
    /// Maximum payload bytes per fragment.
    max_fragment: usize,
}

impl Fragmenter {
    /// Fragmenter for unreliable sends.
    ///
    /// # Arguments
    /// * `max_fragment` - payload bytes per fragment (`mtu - 60` for UDP)
    pub fn new(max_fragment: usize) -> Self {
        Self {
            max_fragment: max_fragment.max(1),
        }
    }

    /// Fragmenter that never splits (reliable sends).
    pub fn unbounded() -> Self {
        Self {
            max_fragment: usize::MAX,
        }
    }

    pub fn max_fragment(&self) -> usize {
        self.max_fragment
    }

    /// Number of packets needed for `len` bytes (at least one).
    pub fn fragment_count(&self, len: usize) -> usize {
        len.div_ceil(self.max_fragment).max(1)
    }

    /// Largest payload this fragmenter can carry in 65535 fragments.
    pub fn max_payload(&self) -> usize {
        self.max_fragment.saturating_mul(u16::MAX as usize)
    }

    /// Split `payload` into DATA packets sharing `message_id`.
    ///
    /// # Returns
    /// Packets with ascending fragment index starting at 0, or
    /// `Error::PayloadTooLarge` when more than 65535 fragments are needed.
    pub fn fragment(
        &self,
        message_id: u16,
        hash: TypeHash,
        payload: &[u8],
        multicast: bool,
    ) -> Result<Vec<DataPacket>> {
        let count = self.fragment_count(payload.len());
        if count > u16::MAX as usize {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload(),
            });
        }

        let hash = hash.to_wire();
        let packet = |index: usize, chunk: &[u8]| DataPacket {
            message_id,
            fragment_index: index as u16,
            fragment_count: count as u16,
            multicast,
            hash,
            payload: chunk.to_vec(),
        };

        if payload.is_empty() {
            return Ok(vec![packet(0, &[])]);
        }

        Ok(payload
            .chunks(self.max_fragment)
            .enumerate()
            .map(|(index, chunk)| packet(index, chunk))
            .collect())
    }
}

/// Per-instance message id source, wrapping modulo 65535.
#[derive(Debug, Default)]
pub struct MessageIdCounter {
    next: u16,
}

impl MessageIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next id.
    pub fn next_id(&mut self) -> u16 {
        let id = self.next;
        self.next = ((u32::from(id) + 1) % MESSAGE_ID_MODULUS) as u16;
        id
    }
}
