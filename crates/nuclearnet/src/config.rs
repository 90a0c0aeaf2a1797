// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! NUClearNet configuration: wire constants and per-instance settings.
//!
//! All protocol constants live here so the codec, the transport and the
//! tests agree on a single value.
//!
//! # Example
//!
//! ```
//! use nuclearnet::config::NetworkConfig;
//!
//! let config = NetworkConfig::new("camera")
//!     .port(17447)
//!     .mtu(9000);
//! assert_eq!(config.udp_fragment_capacity(), 9000 - 60);
//! ```

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{Error, Result};

// =======================================================================
// Wire constants
// =======================================================================

/// Magic prefix carried by every packet (UTF-8 for U+2622).
pub const MAGIC: [u8; 3] = [0xE2, 0x98, 0xA2];

/// Protocol version written into byte 3 of every packet.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Seed for the type-name hash.
pub const HASH_SEED: u64 = 0x4e55_436c;

/// IPv4 header overhead assumed when sizing UDP fragments.
pub const IP_HEADER_LEN: usize = 20;

/// UDP header overhead.
pub const UDP_HEADER_LEN: usize = 8;

/// Message ids wrap at this value (the counter never produces 65535).
pub const MESSAGE_ID_MODULUS: u32 = 65535;

// =======================================================================
// Defaults
// =======================================================================

/// Default multicast group used for announcements and multicast data.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 226, 152, 162);

/// Default multicast port.
pub const DEFAULT_PORT: u16 = 7447;

/// Default MTU used to size unreliable fragments.
pub const DEFAULT_MTU: u16 = 1500;

/// Interval between two multicast announcements.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);

/// Idle time after which a partial fragment set is dropped.
pub const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum concurrent partial fragment sets per peer.
pub const MAX_PENDING_FRAGMENT_SETS: usize = 16;

/// Largest message accepted from a TCP stream or a reassembled fragment set (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Time an unannounced TCP connection may stay open.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Multicast TTL for announcements and multicast data.
pub const DEFAULT_MULTICAST_TTL: u32 = 128;

/// Environment override for the multicast interface (IPv4 address).
pub const ENV_MULTICAST_IF: &str = "NUCLEARNET_MULTICAST_IF";

/// Environment switch enabling SO_REUSEPORT on the multicast socket (`1`).
pub const ENV_REUSEPORT: &str = "NUCLEARNET_REUSEPORT";

// =======================================================================
// Per-instance configuration
// =======================================================================

/// Settings for one network instance, passed to `NUClearNet::connect`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    // === Identity ===
    /// Name announced to other peers (not required to be unique)
    pub name: String,

    // === Multicast ===
    /// Multicast group for announcements and untargeted unreliable data
    pub group: Ipv4Addr,

    /// Multicast port
    pub port: u16,

    /// Interface used to join the group and send multicast (None = auto-detect)
    pub multicast_interface: Option<Ipv4Addr>,

    /// Multicast TTL
    pub multicast_ttl: u32,

    // === Fragmentation ===
    /// MTU used to size unreliable fragments
    pub mtu: u16,

    /// Idle timeout for partial fragment sets
    pub reassembly_timeout: Duration,

    /// Maximum concurrent partial fragment sets per peer
    pub max_pending_fragment_sets: usize,

    /// Largest accepted message (anti-OOM protection)
    pub max_message_size: usize,

    // === Timing ===
    /// Interval between announcements
    pub announce_interval: Duration,

    // === TCP ===
    /// Enable TCP_NODELAY on peer connections
    pub nodelay: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            group: DEFAULT_MULTICAST_GROUP,
            port: DEFAULT_PORT,
            multicast_interface: None,
            multicast_ttl: DEFAULT_MULTICAST_TTL,
            mtu: DEFAULT_MTU,
            reassembly_timeout: REASSEMBLY_TIMEOUT,
            max_pending_fragment_sets: MAX_PENDING_FRAGMENT_SETS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            announce_interval: ANNOUNCE_INTERVAL,
            nodelay: true,
        }
    }
}

impl NetworkConfig {
    /// Create a configuration with defaults and the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the multicast group.
    pub fn group(mut self, group: Ipv4Addr) -> Self {
        self.group = group;
        self
    }

    /// Set the multicast port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the MTU.
    pub fn mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Pin the multicast interface.
    pub fn multicast_interface(mut self, iface: Ipv4Addr) -> Self {
        self.multicast_interface = Some(iface);
        self
    }

    /// Set the multicast TTL.
    pub fn multicast_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = ttl;
        self
    }

    /// Set the announce interval.
    pub fn announce_interval(mut self, interval: Duration) -> Self {
        self.announce_interval = interval;
        self
    }

    /// Set the reassembly idle timeout.
    pub fn reassembly_timeout(mut self, timeout: Duration) -> Self {
        self.reassembly_timeout = timeout;
        self
    }

    /// Set the per-peer bound on partial fragment sets.
    pub fn max_pending_fragment_sets(mut self, max: usize) -> Self {
        self.max_pending_fragment_sets = max;
        self
    }

    /// Set the largest accepted message size.
    pub fn max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Payload bytes carried by one unreliable fragment.
    ///
    /// `mtu - IP header - UDP header - DATA header`, 1440 for the default MTU.
    pub fn udp_fragment_capacity(&self) -> usize {
        (self.mtu as usize).saturating_sub(
            IP_HEADER_LEN + UDP_HEADER_LEN + crate::protocol::DATA_HEADER_LEN,
        )
    }

    /// Check the configuration before binding any socket.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('\0') {
            return Err(Error::InvalidName(self.name.clone()));
        }
        if !self.group.is_multicast() {
            return Err(Error::InvalidConfig(format!(
                "{} is not a multicast address",
                self.group
            )));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("multicast port must not be 0".into()));
        }
        if self.udp_fragment_capacity() == 0 {
            return Err(Error::InvalidConfig(format!(
                "mtu {} leaves no room for fragment payload",
                self.mtu
            )));
        }
        if self.announce_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "announce interval must be positive".into(),
            ));
        }
        if self.max_pending_fragment_sets == 0 {
            return Err(Error::InvalidConfig(
                "max_pending_fragment_sets must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
