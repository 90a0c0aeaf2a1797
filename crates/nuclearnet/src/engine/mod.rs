// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routing and dispatch of received messages.
//!
//! - [`SubscriptionRegistry`]: type hash -> typed subscribers
//! - [`Hub`]: fans events out to subscribers and catch-all listeners

mod hub;
mod registry;
mod subscriber;

pub use hub::{Hub, ListenerId};
pub use registry::{SubscriptionId, SubscriptionRegistry};
pub use subscriber::{
    CallbackSubscriber, NetworkListener, Packet, PacketCallback, PeerCallback, PeerEvent,
    Subscriber,
};
