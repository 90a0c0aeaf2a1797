// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sockets and the I/O thread.
//!
//! - [`udp`] / [`multicast`]: socket setup and group membership
//! - [`stream`]: packet framing over TCP
//! - [`io_thread`]: the event loop owning every socket
//! - [`stats`]: counters exposed through `NUClearNet::stats`

pub mod io_thread;
pub mod multicast;
pub mod stats;
pub mod stream;
pub mod udp;

pub use io_thread::{initiates_handshake, IoCommand, IoThread, IoThreadHandle, Outbound};
pub use stats::{NetworkStats, NetworkStatsSnapshot};
pub use stream::PacketFramer;
pub use udp::UdpSockets;
