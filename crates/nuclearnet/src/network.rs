// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The `NUClearNet` instance handle.
//!
//! An instance is `Idle` until [`NUClearNet::connect`], `Active` while its
//! I/O thread runs, back to `Idle` after [`NUClearNet::disconnect`], and
//! `Destroyed` for good after [`NUClearNet::destroy`]. Subscribers and
//! listeners belong to the instance, not to a connection, so they survive
//! reconnects.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::NetworkConfig;
use crate::discovery::{LocalIdentity, PeerInfo};
use crate::engine::{
    CallbackSubscriber, Hub, ListenerId, NetworkListener, Packet, PacketCallback, PeerCallback,
    PeerEvent, Subscriber, SubscriptionId,
};
use crate::error::{Error, Result};
use crate::protocol::TypeHash;
use crate::transport::{IoThread, IoThreadHandle, NetworkStatsSnapshot, Outbound};

/// Message type of an outgoing message: a name, or a hash computed earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Name(String),
    Hash(TypeHash),
}

impl MessageType {
    pub fn hash(&self) -> TypeHash {
        match self {
            Self::Name(name) => TypeHash::of(name),
            Self::Hash(hash) => *hash,
        }
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for MessageType {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<TypeHash> for MessageType {
    fn from(hash: TypeHash) -> Self {
        Self::Hash(hash)
    }
}

/// Arguments of [`NUClearNet::send`].
///
/// # Examples
/// ```
/// use nuclearnet::SendOptions;
///
/// let opts = SendOptions::new("message.Ping", b"hello".to_vec())
///     .target("camera")
///     .reliable(true);
/// assert_eq!(opts.target.as_deref(), Some("camera"));
/// ```
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
    /// Peer name; every peer when `None`
    pub target: Option<String>,
    pub reliable: bool,
}

impl SendOptions {
    /// Unreliable, untargeted message.
    pub fn new(message_type: impl Into<MessageType>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            message_type: message_type.into(),
            payload: payload.into(),
            target: None,
            reliable: false,
        }
    }

    pub fn target(mut self, name: impl Into<String>) -> Self {
        self.target = Some(name.into());
        self
    }

    pub fn reliable(mut self, reliable: bool) -> Self {
        self.reliable = reliable;
        self
    }
}

enum State {
    Idle,
    Active(IoThreadHandle),
    Destroyed,
}

/// One participant of a NUClearNet network.
///
/// All methods take `&self`; the instance can be shared between threads
/// behind an `Arc`. Callbacks run on the network I/O thread and may call
/// back into the instance.
///
/// # Examples
/// ```no_run
/// use nuclearnet::{NUClearNet, NetworkConfig, SendOptions};
///
/// let net = NUClearNet::new();
/// net.on_join(|peer| println!("{} joined", peer.name))?;
/// net.subscribe("message.Ping", |packet| {
///     println!("{} bytes from {}", packet.payload.len(), packet.peer.name);
/// })?;
///
/// net.connect(NetworkConfig::new("robot"))?;
/// net.send(SendOptions::new("message.Ping", b"hi".to_vec()).reliable(true))?;
/// net.disconnect()?;
/// # Ok::<(), nuclearnet::Error>(())
/// ```
pub struct NUClearNet {
    hub: Arc<Hub>,
    state: Mutex<State>,
    options: Mutex<Option<NetworkConfig>>,
}

impl NUClearNet {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Hub::new()),
            state: Mutex::new(State::Idle),
            options: Mutex::new(None),
        }
    }

    /// Join the network described by `config`.
    ///
    /// Connecting again tears the current connection down first (every
    /// peer leaves) and binds fresh sockets.
    pub fn connect(&self, config: NetworkConfig) -> Result<()> {
        config.validate()?;

        // Stop the previous session outside the lock: its leave callbacks may
        // call back into this instance.
        if let Some(mut previous) = self.take_active()? {
            log::debug!("[net] reconnecting, stopping previous session");
            previous.shutdown()?;
        }

        let handle = IoThread::spawn(config.clone(), Arc::clone(&self.hub))?;
        log::info!(
            "[net] connected as '{}' (tcp={}, udp={})",
            config.name,
            handle.local().tcp_port,
            handle.local().udp_port
        );

        let replaced = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Idle) {
                State::Destroyed => {
                    *state = State::Destroyed;
                    drop(state);
                    let mut handle = handle;
                    handle.shutdown()?;
                    return Err(Error::Destroyed);
                }
                State::Active(other) => {
                    *state = State::Active(handle);
                    Some(other)
                }
                State::Idle => {
                    *state = State::Active(handle);
                    None
                }
            }
        };
        *self.options.lock() = Some(config);

        // A concurrent connect won the race; its session is superseded
        if let Some(mut other) = replaced {
            other.shutdown()?;
        }
        Ok(())
    }

    /// Leave the network. Every peer leaves; subscribers stay registered.
    ///
    /// Does nothing when not connected.
    pub fn disconnect(&self) -> Result<()> {
        if let Some(mut handle) = self.take_active()? {
            handle.shutdown()?;
            log::info!("[net] disconnected");
        }
        Ok(())
    }

    /// Send a message.
    pub fn send(&self, options: SendOptions) -> Result<()> {
        let state = self.state.lock();
        match &*state {
            State::Active(handle) => handle.send(Outbound {
                hash: options.message_type.hash(),
                payload: options.payload,
                target: options.target,
                reliable: options.reliable,
            }),
            State::Idle => Err(Error::NotConnected),
            State::Destroyed => Err(Error::Destroyed),
        }
    }

    /// Routing hash of a type name.
    pub fn hash(&self, type_name: &str) -> Result<TypeHash> {
        self.ensure_alive()?;
        Ok(TypeHash::of(type_name))
    }

    /// Call `callback` for every message of `type_name`.
    pub fn subscribe<F>(&self, type_name: &str, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        self.add_subscriber(type_name, Arc::new(CallbackSubscriber::new(callback)))
    }

    pub fn add_subscriber(
        &self,
        type_name: &str,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<SubscriptionId> {
        self.ensure_alive()?;
        Ok(self.hub.subscribe(type_name, subscriber))
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.hub.unsubscribe(id))
    }

    pub fn on_join<F>(&self, callback: F) -> Result<ListenerId>
    where
        F: Fn(&PeerInfo) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(PeerCallback::new(PeerEvent::Join, callback)))
    }

    pub fn on_leave<F>(&self, callback: F) -> Result<ListenerId>
    where
        F: Fn(&PeerInfo) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(PeerCallback::new(PeerEvent::Leave, callback)))
    }

    /// Catch-all: `callback` sees every message, typed or not.
    pub fn on_packet<F>(&self, callback: F) -> Result<ListenerId>
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(PacketCallback::new(callback)))
    }

    pub fn add_listener(&self, listener: Arc<dyn NetworkListener>) -> Result<ListenerId> {
        self.ensure_alive()?;
        Ok(self.hub.add_listener(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.hub.remove_listener(id))
    }

    /// Joined peers; empty when not connected.
    pub fn peers(&self) -> Result<Vec<PeerInfo>> {
        match &*self.state.lock() {
            State::Active(handle) => Ok(handle.peers()),
            State::Idle => Ok(Vec::new()),
            State::Destroyed => Err(Error::Destroyed),
        }
    }

    /// Name and ports announced by the current session.
    pub fn local_identity(&self) -> Result<Option<LocalIdentity>> {
        match &*self.state.lock() {
            State::Active(handle) => Ok(Some(handle.local().clone())),
            State::Idle => Ok(None),
            State::Destroyed => Err(Error::Destroyed),
        }
    }

    /// Options of the last `connect`.
    pub fn options(&self) -> Result<Option<NetworkConfig>> {
        self.ensure_alive()?;
        Ok(self.options.lock().clone())
    }

    /// Counters of the current session; zeroed when not connected.
    pub fn stats(&self) -> Result<NetworkStatsSnapshot> {
        match &*self.state.lock() {
            State::Active(handle) => Ok(handle.stats().snapshot()),
            State::Idle => Ok(NetworkStatsSnapshot::default()),
            State::Destroyed => Err(Error::Destroyed),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(&*self.state.lock(), State::Active(handle) if handle.is_running())
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(&*self.state.lock(), State::Destroyed)
    }

    /// Disconnect and release every callback. The instance is unusable afterwards.
    pub fn destroy(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.state.lock(), State::Destroyed);
        match previous {
            State::Destroyed => return Err(Error::Destroyed),
            State::Active(mut handle) => handle.shutdown()?,
            State::Idle => {}
        }
        self.hub.clear();
        *self.options.lock() = None;
        log::debug!("[net] destroyed");
        Ok(())
    }

    /// Move the active handle out, leaving `Idle`.
    fn take_active(&self) -> Result<Option<IoThreadHandle>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, State::Idle) {
            State::Active(handle) => Ok(Some(handle)),
            State::Idle => Ok(None),
            State::Destroyed => {
                *state = State::Destroyed;
                Err(Error::Destroyed)
            }
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }
        Ok(())
    }
}

impl Default for NUClearNet {
    fn default() -> Self {
        Self::new()
    }
}
