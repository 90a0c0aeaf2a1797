// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network counters.
//!
//! Written by the I/O thread with relaxed atomics, read from any thread
//! through [`NetworkStats::snapshot`].
//!
//! # Example
//!
//! ```
//! use nuclearnet::transport::NetworkStats;
//!
//! let stats = NetworkStats::new();
//! stats.record_peer_joined();
//! stats.record_datagram_sent(1024);
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.active_peers, 1);
//! assert_eq!(snapshot.bytes_sent, 1024);
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::fragment::ReassemblerStats;

/// Live counters for one network instance.
#[derive(Debug)]
pub struct NetworkStats {
    // Peers
    active_peers: AtomicUsize,
    peers_joined: AtomicU64,
    peers_left: AtomicU64,

    // Connections
    connections_established: AtomicU64,
    connections_failed: AtomicU64,

    // Traffic
    announces_sent: AtomicU64,
    announces_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_delivered: AtomicU64,
    datagrams_sent: AtomicU64,
    datagrams_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,

    // Errors and drops
    malformed_packets: AtomicU64,
    unknown_sender_packets: AtomicU64,
    send_errors: AtomicU64,

    // Reassembly (copied from the reassembler on each tick)
    fragment_sets_timed_out: AtomicU64,
    fragment_sets_evicted: AtomicU64,
    fragments_pending: AtomicUsize,

    start_time: Instant,
}

impl NetworkStats {
    pub fn new() -> Self {
        Self {
            active_peers: AtomicUsize::new(0),
            peers_joined: AtomicU64::new(0),
            peers_left: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connections_failed: AtomicU64::new(0),
            announces_sent: AtomicU64::new(0),
            announces_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            datagrams_sent: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            malformed_packets: AtomicU64::new(0),
            unknown_sender_packets: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            fragment_sets_timed_out: AtomicU64::new(0),
            fragment_sets_evicted: AtomicU64::new(0),
            fragments_pending: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_peer_joined(&self) {
        self.peers_joined.fetch_add(1, Ordering::Relaxed);
        self.active_peers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_left(&self) {
        self.peers_left.fetch_add(1, Ordering::Relaxed);
        // Saturating: never wraps below zero
        let _ = self
            .active_peers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn record_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_failed(&self) {
        self.connections_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_announce_sent(&self) {
        self.announces_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_announce_received(&self) {
        self.announces_received.fetch_add(1, Ordering::Relaxed);
    }

    /// One `send` call accepted by the I/O thread.
    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// One complete payload handed to the application.
    pub fn record_message_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_datagram_sent(&self, bytes: usize) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_datagram_received(&self, bytes: usize) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_stream_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_stream_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_sender(&self) {
        self.unknown_sender_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirror the reassembler's counters.
    pub fn update_reassembly(&self, stats: &ReassemblerStats) {
        self.fragment_sets_timed_out
            .store(stats.sets_timed_out, Ordering::Relaxed);
        self.fragment_sets_evicted
            .store(stats.sets_evicted, Ordering::Relaxed);
        self.fragments_pending
            .store(stats.pending_sets, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> NetworkStatsSnapshot {
        NetworkStatsSnapshot {
            active_peers: self.active_peers.load(Ordering::Relaxed),
            peers_joined: self.peers_joined.load(Ordering::Relaxed),
            peers_left: self.peers_left.load(Ordering::Relaxed),
            connections_established: self.connections_established.load(Ordering::Relaxed),
            connections_failed: self.connections_failed.load(Ordering::Relaxed),
            announces_sent: self.announces_sent.load(Ordering::Relaxed),
            announces_received: self.announces_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            unknown_sender_packets: self.unknown_sender_packets.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            fragment_sets_timed_out: self.fragment_sets_timed_out.load(Ordering::Relaxed),
            fragment_sets_evicted: self.fragment_sets_evicted.load(Ordering::Relaxed),
            fragment_sets_pending: self.fragments_pending.load(Ordering::Relaxed),
            uptime: self.start_time.elapsed(),
        }
    }
}

impl Default for NetworkStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of [`NetworkStats`] at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStatsSnapshot {
    pub active_peers: usize,
    pub peers_joined: u64,
    pub peers_left: u64,
    pub connections_established: u64,
    pub connections_failed: u64,
    pub announces_sent: u64,
    pub announces_received: u64,
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub malformed_packets: u64,
    pub unknown_sender_packets: u64,
    pub send_errors: u64,
    pub fragment_sets_timed_out: u64,
    pub fragment_sets_evicted: u64,
    pub fragment_sets_pending: usize,
    pub uptime: Duration,
}

impl std::fmt::Display for NetworkStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "peers={} (+{}/-{}) sent={} delivered={} bytes tx={} rx={} malformed={} dropped_sets={}",
            self.active_peers,
            self.peers_joined,
            self.peers_left,
            self.messages_sent,
            self.messages_delivered,
            self.bytes_sent,
            self.bytes_received,
            self.malformed_packets,
            self.fragment_sets_timed_out + self.fragment_sets_evicted,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_counters() {
        let stats = NetworkStats::new();
        stats.record_peer_joined();
        stats.record_peer_joined();
        stats.record_peer_left();
        stats.record_peer_left();
        stats.record_peer_left();

        let snap = stats.snapshot();
        assert_eq!(snap.active_peers, 0);
        assert_eq!(snap.peers_joined, 2);
        assert_eq!(snap.peers_left, 3);
    }

    #[test]
    fn test_byte_counters() {
        let stats = NetworkStats::new();
        stats.record_datagram_sent(100);
        stats.record_stream_sent(50);
        stats.record_datagram_received(10);
        stats.record_stream_received(5);

        let snap = stats.snapshot();
        assert_eq!(snap.datagrams_sent, 1);
        assert_eq!(snap.bytes_sent, 150);
        assert_eq!(snap.datagrams_received, 1);
        assert_eq!(snap.bytes_received, 15);
    }

    #[test]
    fn test_reassembly_mirror() {
        let stats = NetworkStats::new();
        let r = ReassemblerStats {
            sets_timed_out: 3,
            sets_evicted: 2,
            pending_sets: 1,
            ..Default::default()
        };
        stats.update_reassembly(&r);

        let snap = stats.snapshot();
        assert_eq!(snap.fragment_sets_timed_out, 3);
        assert_eq!(snap.fragment_sets_evicted, 2);
        assert_eq!(snap.fragment_sets_pending, 1);
        assert!(snap.to_string().contains("dropped_sets=5"));
    }
}
