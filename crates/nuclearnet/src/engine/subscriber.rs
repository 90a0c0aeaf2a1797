// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Listener traits and closure wrappers.

use crate::discovery::PeerInfo;
use crate::protocol::TypeHash;

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sender.
    pub peer: PeerInfo,
    /// Type name, when some local subscriber registered this hash.
    pub type_name: Option<String>,
    /// Routing hash from the wire.
    pub hash: TypeHash,
    /// Complete (reassembled) payload.
    pub payload: Vec<u8>,
    /// Arrived over TCP.
    pub reliable: bool,
}

/// Subscriber for one message type.
///
/// # Thread Safety
/// Implementations must be Send + Sync: packets are delivered from the
/// network I/O thread while the application may register or remove
/// subscribers concurrently.
pub trait Subscriber: Send + Sync {
    /// Called for each message of the subscribed type.
    fn on_packet(&self, packet: &Packet);
}

/// Observer of the whole network: peers and every message.
///
/// All methods default to no-ops so implementors override what they need.
pub trait NetworkListener: Send + Sync {
    /// A peer completed the TCP handshake.
    fn on_join(&self, _peer: &PeerInfo) {}

    /// A peer's TCP connection closed.
    fn on_leave(&self, _peer: &PeerInfo) {}

    /// Any message, typed or not (catch-all).
    fn on_packet(&self, _packet: &Packet) {}
}

/// Callback-based subscriber wrapper.
///
/// # Examples
/// ```
/// use nuclearnet::engine::{CallbackSubscriber, Packet, Subscriber};
///
/// let sub = CallbackSubscriber::new(|packet: &Packet| {
///     println!("{} bytes from {}", packet.payload.len(), packet.peer.name);
/// });
/// # let _ = &sub as &dyn Subscriber;
/// ```
pub struct CallbackSubscriber<F>
where
    F: Fn(&Packet) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackSubscriber<F>
where
    F: Fn(&Packet) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> Subscriber for CallbackSubscriber<F>
where
    F: Fn(&Packet) + Send + Sync,
{
    fn on_packet(&self, packet: &Packet) {
        (self.callback)(packet);
    }
}

/// Peer lifecycle event kind, for [`PeerCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    Join,
    Leave,
}

/// Closure invoked on join or leave.
pub struct PeerCallback<F>
where
    F: Fn(&PeerInfo) + Send + Sync,
{
    event: PeerEvent,
    callback: F,
}

impl<F> PeerCallback<F>
where
    F: Fn(&PeerInfo) + Send + Sync,
{
    pub fn new(event: PeerEvent, callback: F) -> Self {
        Self { event, callback }
    }
}

impl<F> NetworkListener for PeerCallback<F>
where
    F: Fn(&PeerInfo) + Send + Sync,
{
    fn on_join(&self, peer: &PeerInfo) {
        if self.event == PeerEvent::Join {
            (self.callback)(peer);
        }
    }

    fn on_leave(&self, peer: &PeerInfo) {
        if self.event == PeerEvent::Leave {
            (self.callback)(peer);
        }
    }
}

/// Closure invoked for every message (catch-all).
pub struct PacketCallback<F>
where
    F: Fn(&Packet) + Send + Sync,
{
    callback: F,
}

impl<F> PacketCallback<F>
where
    F: Fn(&Packet) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> NetworkListener for PacketCallback<F>
where
    F: Fn(&Packet) + Send + Sync,
{
    fn on_packet(&self, packet: &Packet) {
        (self.callback)(packet);
    }
}
