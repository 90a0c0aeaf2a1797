// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # NUClearNet - peer discovery and typed messaging for local clusters
//!
//! Every participant multicasts a small ANNOUNCE packet, opens one TCP
//! connection to each peer it hears, and exchanges typed binary messages
//! either reliably over that connection or unreliably as (fragmented) UDP
//! datagrams. Messages are routed by a 64-bit hash of their type name.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nuclearnet::{NUClearNet, NetworkConfig, Result, SendOptions};
//!
//! fn main() -> Result<()> {
//!     let net = NUClearNet::new();
//!
//!     net.on_join(|peer| println!("{} joined from {}", peer.name, peer.address))?;
//!     net.subscribe("sensors.Temperature", |packet| {
//!         println!("{} bytes from {}", packet.payload.len(), packet.peer.name);
//!     })?;
//!
//!     net.connect(NetworkConfig::new("thermostat"))?;
//!
//!     // Best-effort to everyone, then reliable to one peer by name
//!     net.send(SendOptions::new("sensors.Temperature", 21.5f32.to_le_bytes().to_vec()))?;
//!     net.send(
//!         SendOptions::new("sensors.Temperature", vec![0; 4])
//!             .target("logger")
//!             .reliable(true),
//!     )?;
//!
//!     net.disconnect()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                         NUClearNet (network)                        |
//! |   connect / disconnect / send / subscribe / on_join / destroy       |
//! +---------------------------------------------------------------------+
//! |                          engine::Hub                                |
//! |   SubscriptionRegistry (hash -> subscribers) | catch-all listeners  |
//! +---------------------------------------------------------------------+
//! |                       transport::IoThread                           |
//! |   multicast announce | TCP handshake + framing | UDP datagrams      |
//! +---------------------------------------------------------------------+
//! |   discovery::PeerTable | fragment::{Fragmenter, Reassembler}        |
//! +---------------------------------------------------------------------+
//! |                 protocol (header, ANNOUNCE, DATA, hash)             |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`network`] - the [`NUClearNet`] instance (start here)
//! - [`protocol`] - wire format
//! - [`fragment`] - UDP fragmentation and reassembly
//! - [`discovery`] - peer table
//! - [`engine`] - subscriber routing
//! - [`transport`] - sockets and the I/O thread
//! - [`config`] - constants and [`NetworkConfig`]

pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod network;
pub mod protocol;
pub mod transport;

pub use config::NetworkConfig;
pub use discovery::{LocalIdentity, PeerInfo};
pub use engine::{ListenerId, NetworkListener, Packet, Subscriber, SubscriptionId};
pub use error::{Error, ProtocolError, Result};
pub use network::{MessageType, NUClearNet, SendOptions};
pub use protocol::TypeHash;
pub use transport::NetworkStatsSnapshot;
