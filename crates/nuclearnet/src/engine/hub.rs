// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch hub shared by the application and the I/O thread.
//!
//! The application registers subscribers and listeners; the I/O thread
//! reports joins, leaves and complete payloads. Locks are only held while
//! taking a snapshot of the interested callbacks, never while calling them,
//! so a callback may subscribe or unsubscribe without deadlocking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::registry::{SubscriptionId, SubscriptionRegistry};
use super::subscriber::{NetworkListener, Packet, Subscriber};
use crate::discovery::PeerInfo;
use crate::protocol::TypeHash;

/// Handle returned by `add_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Routes network events to registered callbacks.
#[derive(Default)]
pub struct Hub {
    registry: RwLock<SubscriptionRegistry>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn NetworkListener>)>>,
    next_listener: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, type_name: &str, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        self.registry.write().subscribe(type_name, subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.write().unsubscribe(id)
    }

    pub fn add_listener(&self, listener: Arc<dyn NetworkListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Type name registered for `hash`, if any.
    pub fn type_name(&self, hash: TypeHash) -> Option<String> {
        self.registry.read().type_name(hash).map(str::to_owned)
    }

    /// Drop every subscriber and listener.
    pub fn clear(&self) {
        *self.registry.write() = SubscriptionRegistry::new();
        self.listeners.write().clear();
    }

    pub fn notify_join(&self, peer: &PeerInfo) {
        for listener in self.listener_snapshot() {
            guarded("join", || listener.on_join(peer));
        }
    }

    pub fn notify_leave(&self, peer: &PeerInfo) {
        for listener in self.listener_snapshot() {
            guarded("leave", || listener.on_leave(peer));
        }
    }

    /// Deliver a complete payload to catch-all listeners, then to typed subscribers.
    pub fn deliver(&self, peer: PeerInfo, hash: TypeHash, payload: Vec<u8>, reliable: bool) {
        let (type_name, subscribers) = {
            let registry = self.registry.read();
            (
                registry.type_name(hash).map(str::to_owned),
                registry.subscribers(hash),
            )
        };
        let listeners = self.listener_snapshot();

        let packet = Packet {
            peer,
            type_name,
            hash,
            payload,
            reliable,
        };

        for listener in listeners {
            guarded("packet", || listener.on_packet(&packet));
        }
        for subscriber in subscribers {
            guarded("packet", || subscriber.on_packet(&packet));
        }
    }

    fn listener_snapshot(&self) -> Vec<Arc<dyn NetworkListener>> {
        self.listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

/// A panicking callback must not take the I/O thread down with it.
fn guarded(what: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::warn!("[hub] {} callback panicked", what);
    }
}
