// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription registry: type hash -> subscribers.
//!
//! An entry (and with it the hash -> type name mapping) exists exactly while
//! at least one subscriber is registered for the type.

use std::collections::HashMap;
use std::sync::Arc;

use super::subscriber::Subscriber;
use crate::protocol::TypeHash;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct TypeEntry {
    type_name: String,
    subscribers: Vec<(SubscriptionId, Arc<dyn Subscriber>)>,
}

/// Registry of typed subscribers.
#[derive(Default)]
pub struct SubscriptionRegistry {
    by_hash: HashMap<TypeHash, TypeEntry>,
    by_id: HashMap<SubscriptionId, TypeHash>,
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` for `type_name`.
    pub fn subscribe(&mut self, type_name: &str, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let hash = TypeHash::of(type_name);
        let entry = self.by_hash.entry(hash).or_insert_with(|| {
            log::debug!("[registry] routing enabled for {} ({})", type_name, hash);
            TypeEntry {
                type_name: type_name.to_owned(),
                subscribers: Vec::new(),
            }
        });
        entry.subscribers.push((id, subscriber));
        self.by_id.insert(id, hash);
        id
    }

    /// Remove a subscription. Returns false if it was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(hash) = self.by_id.remove(&id) else {
            return false;
        };

        if let Some(entry) = self.by_hash.get_mut(&hash) {
            entry.subscribers.retain(|(sub_id, _)| *sub_id != id);
            if entry.subscribers.is_empty() {
                log::debug!("[registry] routing disabled for {}", entry.type_name);
                self.by_hash.remove(&hash);
            }
        }
        true
    }

    /// Type name registered for `hash`.
    pub fn type_name(&self, hash: TypeHash) -> Option<&str> {
        self.by_hash.get(&hash).map(|entry| entry.type_name.as_str())
    }

    /// Snapshot of the subscribers for `hash`.
    pub fn subscribers(&self, hash: TypeHash) -> Vec<Arc<dyn Subscriber>> {
        self.by_hash
            .get(&hash)
            .map(|entry| entry.subscribers.iter().map(|(_, s)| Arc::clone(s)).collect())
            .unwrap_or_default()
    }

    pub fn is_routed(&self, hash: TypeHash) -> bool {
        self.by_hash.contains_key(&hash)
    }

    /// Number of routed types.
    pub fn type_count(&self) -> usize {
        self.by_hash.len()
    }

    /// Number of subscriptions across all types.
    pub fn subscription_count(&self) -> usize {
        self.by_id.len()
    }
}
