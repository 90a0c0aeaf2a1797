// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer discovery state.
//!
//! Peers are discovered by multicast ANNOUNCE and confirmed by an ANNOUNCE
//! over TCP; only confirmed peers enter the [`PeerTable`].

mod peer_table;

pub use peer_table::{
    ConnectionId, LocalIdentity, PeerInfo, PeerKey, PeerTable, Registration,
};
