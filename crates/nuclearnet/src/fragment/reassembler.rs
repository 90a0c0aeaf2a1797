// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receiver side: rebuild payloads from DATA fragments.
//!
//! Fragment sets are keyed by (sender, message id). A set is delivered and
//! discarded as soon as it holds every index. Sets that stay idle longer
//! than the timeout are dropped by [`Reassembler::sweep`]. When a sender
//! already has the maximum number of partial sets, the one with the oldest
//! last fragment is evicted to make room.
//!
//! All drops are silent: UDP gives no delivery guarantee, so a missing
//! fragment only shows up in [`ReassemblerStats`].

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::config::{DEFAULT_MAX_MESSAGE_SIZE, MAX_PENDING_FRAGMENT_SETS, REASSEMBLY_TIMEOUT};
use crate::protocol::DataPacket;

/// Reassembler configuration.
#[derive(Debug, Clone)]
pub struct ReassemblerConfig {
    /// Maximum partial sets per sender.
    pub max_pending_per_peer: usize,
    /// Idle time after which a partial set is dropped.
    pub timeout: Duration,
    /// Largest reassembled payload.
    pub max_message_size: usize,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            max_pending_per_peer: MAX_PENDING_FRAGMENT_SETS,
            timeout: REASSEMBLY_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// In-progress reassembly of one message.
#[derive(Debug)]
struct FragmentSet {
    expected: u16,
    /// Ordered by fragment index.
    fragments: BTreeMap<u16, Vec<u8>>,
    bytes: usize,
    last_activity: Instant,
}

impl FragmentSet {
    fn new(expected: u16, now: Instant) -> Self {
        Self {
            expected,
            fragments: BTreeMap::new(),
            bytes: 0,
            last_activity: now,
        }
    }

    fn is_complete(&self) -> bool {
        self.fragments.len() == self.expected as usize
    }

    fn concat(self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.bytes);
        for chunk in self.fragments.into_values() {
            payload.extend_from_slice(&chunk);
        }
        payload
    }
}

/// Reassembler statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Fragments received (including single-fragment packets).
    pub fragments_received: u64,
    /// Multi-fragment payloads completed.
    pub payloads_reassembled: u64,
    /// Duplicate fragments ignored.
    pub duplicates_dropped: u64,
    /// Sets dropped after the idle timeout.
    pub sets_timed_out: u64,
    /// Sets evicted by the per-sender bound.
    pub sets_evicted: u64,
    /// Sets restarted because a fragment disagreed on the count.
    pub sets_restarted: u64,
    /// Sets dropped for exceeding the size limit.
    pub oversized_dropped: u64,
    /// Current partial sets.
    pub pending_sets: usize,
}

/// Fragment reassembler, generic over the sender key.
#[derive(Debug)]
pub struct Reassembler<K> {
    config: ReassemblerConfig,
    pending: HashMap<K, HashMap<u16, FragmentSet>>,
    stats: ReassemblerStats,
}

impl<K: Eq + Hash + Clone> Reassembler<K> {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            stats: ReassemblerStats::default(),
        }
    }

    /// Get statistics.
    pub fn stats(&self) -> ReassemblerStats {
        let mut stats = self.stats.clone();
        stats.pending_sets = self.pending_count();
        stats
    }

    /// Feed one fragment from `sender`.
    ///
    /// Returns the complete payload when this fragment finishes a message.
    /// Single-fragment packets are returned immediately.
    pub fn on_fragment(&mut self, sender: &K, packet: DataPacket, now: Instant) -> Option<Vec<u8>> {
        self.stats.fragments_received += 1;

        let DataPacket {
            message_id,
            fragment_index,
            fragment_count,
            payload,
            ..
        } = packet;

        if fragment_count <= 1 {
            return Some(payload);
        }
        if fragment_index >= fragment_count {
            return None;
        }

        let max_pending = self.config.max_pending_per_peer.max(1);
        let sets = self.pending.entry(sender.clone()).or_default();

        if sets
            .get(&message_id)
            .is_some_and(|set| set.expected != fragment_count)
        {
            log::debug!(
                "[frag] message {} changed fragment count to {}, restarting",
                message_id,
                fragment_count
            );
            sets.remove(&message_id);
            self.stats.sets_restarted += 1;
        }

        if !sets.contains_key(&message_id) {
            while sets.len() >= max_pending {
                let oldest = sets
                    .iter()
                    .min_by_key(|(_, set)| set.last_activity)
                    .map(|(id, _)| *id);
                match oldest {
                    Some(id) => {
                        sets.remove(&id);
                        self.stats.sets_evicted += 1;
                        log::debug!("[frag] evicted partial message {}", id);
                    }
                    None => break,
                }
            }
            sets.insert(message_id, FragmentSet::new(fragment_count, now));
        }

        let set = sets.get_mut(&message_id)?;
        set.last_activity = now;

        if set.fragments.contains_key(&fragment_index) {
            self.stats.duplicates_dropped += 1;
            return None;
        }

        set.bytes += payload.len();
        if set.bytes > self.config.max_message_size {
            sets.remove(&message_id);
            self.stats.oversized_dropped += 1;
            log::debug!("[frag] message {} exceeds size limit, dropped", message_id);
            self.prune_sender(sender);
            return None;
        }
        set.fragments.insert(fragment_index, payload);

        if !set.is_complete() {
            return None;
        }

        let set = sets.remove(&message_id)?;
        self.stats.payloads_reassembled += 1;
        self.prune_sender(sender);
        Some(set.concat())
    }

    /// Drop sets idle for at least the timeout. Returns how many were dropped.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let timeout = self.config.timeout;
        let mut dropped = 0;

        self.pending.retain(|_, sets| {
            sets.retain(|_, set| {
                let keep = now.saturating_duration_since(set.last_activity) < timeout;
                if !keep {
                    dropped += 1;
                }
                keep
            });
            !sets.is_empty()
        });

        self.stats.sets_timed_out += dropped as u64;
        dropped
    }

    /// Forget every partial set from `sender`.
    pub fn remove_sender(&mut self, sender: &K) {
        self.pending.remove(sender);
    }

    /// Clear all pending sets.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Number of partial sets across all senders.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(HashMap::len).sum()
    }

    /// Number of partial sets for one sender.
    pub fn pending_for(&self, sender: &K) -> usize {
        self.pending.get(sender).map_or(0, HashMap::len)
    }

    fn prune_sender(&mut self, sender: &K) {
        if self.pending.get(sender).is_some_and(HashMap::is_empty) {
            self.pending.remove(sender);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragmenter;
    use crate::protocol::TypeHash;

    fn reassembler() -> Reassembler<u32> {
        Reassembler::new(ReassemblerConfig::default())
    }

    fn fragments(payload: &[u8], max: usize, id: u16) -> Vec<DataPacket> {
        Fragmenter::new(max)
            .fragment(id, TypeHash::of("t"), payload, false)
            .unwrap()
    }

    fn roundtrip(len: usize, max: usize) {
        let payload: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
        let mut r = reassembler();
        let now = Instant::now();
        let mut out = None;
        for packet in fragments(&payload, max, 7) {
            assert!(out.is_none(), "delivered before last fragment");
            out = r.on_fragment(&1, packet, now);
        }
        assert_eq!(out.as_deref(), Some(payload.as_slice()), "len {}", len);
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn test_roundtrip_boundaries() {
        let cap = 1440;
        for len in [0, 1, cap - 1, cap, cap + 1, 2 * cap, 3 * cap + 17, 65535] {
            roundtrip(len, cap);
        }
    }

    #[test]
    fn test_out_of_order() {
        let payload: Vec<u8> = (0..100).collect();
        let mut packets = fragments(&payload, 10, 3);
        packets.reverse();
        packets.swap(2, 7);

        let mut r = reassembler();
        let now = Instant::now();
        let results: Vec<_> = packets
            .into_iter()
            .filter_map(|p| r.on_fragment(&1, p, now))
            .collect();
        assert_eq!(results, vec![payload]);
    }

    #[test]
    fn test_duplicates_ignored() {
        let packets = fragments(&[1, 2, 3, 4], 2, 0);
        let mut r = reassembler();
        let now = Instant::now();
        assert!(r.on_fragment(&1, packets[0].clone(), now).is_none());
        assert!(r.on_fragment(&1, packets[0].clone(), now).is_none());
        assert_eq!(r.stats().duplicates_dropped, 1);
        assert_eq!(
            r.on_fragment(&1, packets[1].clone(), now),
            Some(vec![1, 2, 3, 4])
        );
    }

    #[test]
    fn test_senders_are_isolated() {
        let a = fragments(b"aaaa", 2, 5);
        let b = fragments(b"bbbb", 2, 5);
        let mut r = reassembler();
        let now = Instant::now();

        assert!(r.on_fragment(&1, a[0].clone(), now).is_none());
        assert!(r.on_fragment(&2, b[1].clone(), now).is_none());
        assert_eq!(r.on_fragment(&1, a[1].clone(), now), Some(b"aaaa".to_vec()));
        assert_eq!(r.on_fragment(&2, b[0].clone(), now), Some(b"bbbb".to_vec()));
    }

    #[test]
    fn test_timeout_sweep() {
        let packets = fragments(&[0u8; 30], 10, 1);
        let mut r = reassembler();
        let start = Instant::now();
        r.on_fragment(&1, packets[0].clone(), start);

        assert_eq!(r.sweep(start + Duration::from_secs(4)), 0);
        assert_eq!(r.pending_count(), 1);
        assert_eq!(r.sweep(start + Duration::from_secs(5)), 1);
        assert_eq!(r.pending_count(), 0);
        assert_eq!(r.stats().sets_timed_out, 1);

        // the rest of the set now starts a fresh, incomplete set
        assert!(r
            .on_fragment(&1, packets[1].clone(), start + Duration::from_secs(6))
            .is_none());
    }

    #[test]
    fn test_activity_extends_timeout() {
        let packets = fragments(&[0u8; 30], 10, 1);
        let mut r = reassembler();
        let start = Instant::now();
        r.on_fragment(&1, packets[0].clone(), start);
        r.on_fragment(&1, packets[1].clone(), start + Duration::from_secs(4));
        assert_eq!(r.sweep(start + Duration::from_secs(6)), 0);
    }

    #[test]
    fn test_evicts_least_recently_active() {
        let mut r: Reassembler<u32> = Reassembler::new(ReassemblerConfig {
            max_pending_per_peer: 2,
            ..Default::default()
        });
        let start = Instant::now();
        let first = fragments(&[1u8; 4], 2, 1);
        let second = fragments(&[2u8; 4], 2, 2);
        let third = fragments(&[3u8; 4], 2, 3);

        r.on_fragment(&9, first[0].clone(), start);
        r.on_fragment(&9, second[0].clone(), start + Duration::from_millis(10));
        r.on_fragment(&9, third[0].clone(), start + Duration::from_millis(20));

        assert_eq!(r.pending_for(&9), 2);
        assert_eq!(r.stats().sets_evicted, 1);

        // message 1 was evicted, its second half starts over
        assert!(r
            .on_fragment(&9, first[1].clone(), start + Duration::from_millis(30))
            .is_none());
        // message 2 lost to message 1's restart (oldest activity)
        assert_eq!(r.stats().sets_evicted, 2);
        assert_eq!(
            r.on_fragment(&9, third[1].clone(), start + Duration::from_millis(40)),
            Some(vec![3u8; 4])
        );
    }

    #[test]
    fn test_count_change_restarts_set() {
        let mut r = reassembler();
        let now = Instant::now();
        let old = fragments(&[0u8; 30], 10, 4);
        let new = fragments(&[5u8; 4], 2, 4);

        r.on_fragment(&1, old[0].clone(), now);
        r.on_fragment(&1, new[0].clone(), now);
        assert_eq!(r.stats().sets_restarted, 1);
        assert_eq!(r.on_fragment(&1, new[1].clone(), now), Some(vec![5u8; 4]));
    }

    #[test]
    fn test_oversized_dropped() {
        let mut r: Reassembler<u32> = Reassembler::new(ReassemblerConfig {
            max_message_size: 15,
            ..Default::default()
        });
        let now = Instant::now();
        let packets = fragments(&[0u8; 20], 10, 1);
        assert!(r.on_fragment(&1, packets[0].clone(), now).is_none());
        assert!(r.on_fragment(&1, packets[1].clone(), now).is_none());
        assert_eq!(r.stats().oversized_dropped, 1);
        assert_eq!(r.pending_count(), 0);
    }

    #[test]
    fn test_remove_sender() {
        let mut r = reassembler();
        let packets = fragments(&[0u8; 30], 10, 1);
        r.on_fragment(&1, packets[0].clone(), Instant::now());
        r.remove_sender(&1);
        assert_eq!(r.pending_count(), 0);
    }
}
