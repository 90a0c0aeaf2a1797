// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Known peers and their indexes.
//!
//! The canonical map is keyed by (address, UDP port), the unique transport
//! identity of a peer. Secondary indexes by name and by TCP connection are
//! updated in the same call as the canonical map, so a removal never leaves
//! a stale entry behind.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Identifier of a TCP connection owned by the I/O thread.
pub type ConnectionId = u64;

/// Unique transport identity of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub address: IpAddr,
    pub udp_port: u16,
}

impl PeerKey {
    pub fn new(address: IpAddr, udp_port: u16) -> Self {
        Self { address, udp_port }
    }

    pub fn from_socket(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

/// Public view of a peer, passed to join/leave listeners and packets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerInfo {
    pub name: String,
    pub address: IpAddr,
    pub tcp_port: u16,
    pub udp_port: u16,
}

impl PeerInfo {
    pub fn key(&self) -> PeerKey {
        PeerKey::new(self.address, self.udp_port)
    }

    /// Unicast UDP destination of this peer.
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.udp_port)
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} (tcp {}, udp {})",
            self.name, self.address, self.tcp_port, self.udp_port
        )
    }
}

/// This instance's own identity, used to ignore self announcements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub name: String,
    pub tcp_port: u16,
    pub udp_port: u16,
}

impl LocalIdentity {
    pub fn matches(&self, name: &str, tcp_port: u16, udp_port: u16) -> bool {
        self.name == name && self.tcp_port == tcp_port && self.udp_port == udp_port
    }
}

/// Outcome of [`PeerTable::register_peer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// A new peer joined.
    Joined(PeerInfo),
    /// The announcement was our own.
    SelfAnnounce,
    /// The transport identity or the connection already belongs to a peer.
    AlreadyKnown,
}

#[derive(Debug)]
struct PeerEntry {
    info: PeerInfo,
    connection: ConnectionId,
}

/// Table of peers with a completed TCP handshake.
#[derive(Debug)]
pub struct PeerTable {
    local: LocalIdentity,
    peers: HashMap<PeerKey, PeerEntry>,
    by_name: HashMap<String, Vec<PeerKey>>,
    by_connection: HashMap<ConnectionId, PeerKey>,
}

impl PeerTable {
    pub fn new(local: LocalIdentity) -> Self {
        Self {
            local,
            peers: HashMap::new(),
            by_name: HashMap::new(),
            by_connection: HashMap::new(),
        }
    }

    pub fn local(&self) -> &LocalIdentity {
        &self.local
    }

    /// Whether an announcement describes this instance.
    pub fn is_self(&self, name: &str, tcp_port: u16, udp_port: u16) -> bool {
        self.local.matches(name, tcp_port, udp_port)
    }

    /// Record a peer whose ANNOUNCE arrived over `connection`.
    ///
    /// # Arguments
    /// * `address` - remote IP of the TCP connection
    /// * `tcp_port`, `udp_port`, `name` - fields of the ANNOUNCE
    /// * `connection` - the TCP connection that carried it
    pub fn register_peer(
        &mut self,
        address: IpAddr,
        tcp_port: u16,
        udp_port: u16,
        name: &str,
        connection: ConnectionId,
    ) -> Registration {
        if self.is_self(name, tcp_port, udp_port) {
            return Registration::SelfAnnounce;
        }

        let key = PeerKey::new(address, udp_port);
        if self.peers.contains_key(&key) || self.by_connection.contains_key(&connection) {
            return Registration::AlreadyKnown;
        }

        let info = PeerInfo {
            name: name.to_owned(),
            address,
            tcp_port,
            udp_port,
        };

        self.by_name.entry(info.name.clone()).or_default().push(key);
        self.by_connection.insert(connection, key);
        self.peers.insert(
            key,
            PeerEntry {
                info: info.clone(),
                connection,
            },
        );

        log::debug!("[peers] joined {}", info);
        Registration::Joined(info)
    }

    /// Peer with this (address, UDP port).
    pub fn lookup_by_transport(&self, address: IpAddr, udp_port: u16) -> Option<&PeerInfo> {
        self.peers
            .get(&PeerKey::new(address, udp_port))
            .map(|entry| &entry.info)
    }

    /// Peer owning a TCP connection.
    pub fn lookup_by_connection(&self, connection: ConnectionId) -> Option<&PeerInfo> {
        self.by_connection
            .get(&connection)
            .and_then(|key| self.peers.get(key))
            .map(|entry| &entry.info)
    }

    /// Every peer using `name` (names are not unique).
    pub fn lookup_by_name(&self, name: &str) -> Vec<&PeerInfo> {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|key| self.peers.get(key))
            .map(|entry| &entry.info)
            .collect()
    }

    /// TCP connection of a peer.
    pub fn connection_of(&self, key: &PeerKey) -> Option<ConnectionId> {
        self.peers.get(key).map(|entry| entry.connection)
    }

    /// Remove a peer from every index.
    ///
    /// Returns the peer and its connection so the caller can close the
    /// connection and raise the leave event.
    pub fn remove_peer(&mut self, key: &PeerKey) -> Option<(PeerInfo, ConnectionId)> {
        let entry = self.peers.remove(key)?;

        self.by_connection.remove(&entry.connection);
        if let Some(keys) = self.by_name.get_mut(&entry.info.name) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.by_name.remove(&entry.info.name);
            }
        }

        log::debug!("[peers] left {}", entry.info);
        Some((entry.info, entry.connection))
    }

    /// Remove the peer owning `connection`, if any.
    pub fn remove_by_connection(&mut self, connection: ConnectionId) -> Option<PeerInfo> {
        let key = *self.by_connection.get(&connection)?;
        self.remove_peer(&key).map(|(info, _)| info)
    }

    /// Snapshot of all peers, sorted by name then transport.
    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.peers.values().map(|e| e.info.clone()).collect();
        peers.sort_by(|a, b| {
            (&a.name, a.address, a.udp_port).cmp(&(&b.name, b.address, b.udp_port))
        });
        peers
    }

    /// Remove every peer, returning them with their connections.
    pub fn clear(&mut self) -> Vec<(PeerInfo, ConnectionId)> {
        self.by_name.clear();
        self.by_connection.clear();
        self.peers
            .drain()
            .map(|(_, entry)| (entry.info, entry.connection))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let indexed_by_name: usize = self.by_name.values().map(Vec::len).sum();
        assert_eq!(indexed_by_name, self.peers.len());
        assert_eq!(self.by_connection.len(), self.peers.len());
        for (key, entry) in &self.peers {
            assert_eq!(self.by_connection.get(&entry.connection), Some(key));
            assert!(self.by_name[&entry.info.name].contains(key));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn table() -> PeerTable {
        PeerTable::new(LocalIdentity {
            name: "me".into(),
            tcp_port: 1000,
            udp_port: 1001,
        })
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut t = table();
        let reg = t.register_peer(ip(2), 2000, 2001, "camera", 7);
        let info = match reg {
            Registration::Joined(info) => info,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(info.name, "camera");

        assert_eq!(t.lookup_by_transport(ip(2), 2001), Some(&info));
        assert_eq!(t.lookup_by_transport(ip(2), 2000), None);
        assert_eq!(t.lookup_by_connection(7), Some(&info));
        assert_eq!(t.lookup_by_name("camera"), vec![&info]);
        assert_eq!(t.connection_of(&info.key()), Some(7));
        t.assert_consistent();
    }

    #[test]
    fn test_self_announce_ignored() {
        let mut t = table();
        assert_eq!(
            t.register_peer(ip(1), 1000, 1001, "me", 1),
            Registration::SelfAnnounce
        );
        // same name, different ports is another instance
        assert!(matches!(
            t.register_peer(ip(1), 1002, 1003, "me", 2),
            Registration::Joined(_)
        ));
    }

    #[test]
    fn test_duplicate_transport_rejected() {
        let mut t = table();
        t.register_peer(ip(2), 2000, 2001, "a", 1);
        assert_eq!(
            t.register_peer(ip(2), 2100, 2001, "b", 2),
            Registration::AlreadyKnown
        );
        assert_eq!(
            t.register_peer(ip(3), 2000, 2001, "c", 1),
            Registration::AlreadyKnown
        );
        assert_eq!(t.len(), 1);
        t.assert_consistent();
    }

    #[test]
    fn test_shared_names() {
        let mut t = table();
        t.register_peer(ip(2), 2000, 2001, "sensor", 1);
        t.register_peer(ip(3), 2000, 2001, "sensor", 2);
        t.register_peer(ip(4), 2000, 2001, "other", 3);
        assert_eq!(t.lookup_by_name("sensor").len(), 2);

        t.remove_peer(&PeerKey::new(ip(2), 2001));
        let remaining = t.lookup_by_name("sensor");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].address, ip(3));
        t.assert_consistent();
    }

    #[test]
    fn test_remove_clears_every_index() {
        let mut t = table();
        t.register_peer(ip(2), 2000, 2001, "a", 5);
        let (info, conn) = t.remove_peer(&PeerKey::new(ip(2), 2001)).unwrap();
        assert_eq!(info.name, "a");
        assert_eq!(conn, 5);
        assert!(t.is_empty());
        assert!(t.lookup_by_name("a").is_empty());
        assert!(t.lookup_by_connection(5).is_none());
        assert!(t.remove_peer(&info.key()).is_none());
        t.assert_consistent();

        // transport identity can be reused after removal
        assert!(matches!(
            t.register_peer(ip(2), 2000, 2001, "a", 6),
            Registration::Joined(_)
        ));
    }

    #[test]
    fn test_remove_by_connection() {
        let mut t = table();
        t.register_peer(ip(2), 2000, 2001, "a", 5);
        assert!(t.remove_by_connection(4).is_none());
        assert_eq!(t.remove_by_connection(5).map(|p| p.name), Some("a".into()));
        t.assert_consistent();
    }

    #[test]
    fn test_clear_returns_everything() {
        let mut t = table();
        t.register_peer(ip(2), 2000, 2001, "a", 1);
        t.register_peer(ip(3), 2000, 2001, "b", 2);
        let mut removed = t.clear();
        removed.sort_by_key(|(_, conn)| *conn);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].0.name, "a");
        assert!(t.is_empty());
        t.assert_consistent();
    }

    #[test]
    fn test_peers_sorted() {
        let mut t = table();
        t.register_peer(ip(3), 2000, 2001, "b", 1);
        t.register_peer(ip(2), 2000, 2001, "a", 2);
        let names: Vec<_> = t.peers().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
