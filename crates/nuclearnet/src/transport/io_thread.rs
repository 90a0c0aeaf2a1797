// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network I/O thread.
//!
//! One thread per connected instance owns every socket and drives them with
//! a mio event loop. The application talks to it through a command channel
//! plus a [`Waker`]; the thread reports back through the [`Hub`].
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                        IoThread                             |
//! |  +-------------------------------------------------------+  |
//! |  |                     mio::Poll                         |  |
//! |  |  - TCP listener (peers connecting to us)              |  |
//! |  |  - TCP streams (handshake + reliable DATA)            |  |
//! |  |  - multicast UDP (ANNOUNCE + multicast DATA)          |  |
//! |  |  - unicast UDP (targeted DATA, all outbound datagrams)|  |
//! |  |  - Waker (commands from the application)              |  |
//! |  +-------------------------------------------------------+  |
//! |         |                     |                     |       |
//! |         v                     v                     v       |
//! |  +-------------+    +------------------+    +------------+  |
//! |  | PeerTable   |    |   Reassembler    |    |  announce  |  |
//! |  | join/leave  |    |  UDP fragments   |    |  + sweep   |  |
//! |  +-------------+    +------------------+    +------------+  |
//! |         |                     |                             |
//! |         v                     v                             |
//! |  +-------------------------------------------------------+  |
//! |  |                 Hub -> application callbacks          |  |
//! |  +-------------------------------------------------------+  |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Handshake
//!
//! Every instance multicasts its ANNOUNCE each interval. On hearing an
//! unknown peer, only the side with the smaller `(name, tcp, udp)` key
//! connects, so each pair ends up with exactly one TCP connection. Both
//! sides then send their ANNOUNCE over it; the peer joins when that
//! ANNOUNCE arrives and leaves when the connection closes.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use mio::net::{TcpListener, TcpStream, UdpSocket};
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::RwLock;

use super::stats::NetworkStats;
use super::stream::PacketFramer;
use super::udp::UdpSockets;
use crate::config::{NetworkConfig, HANDSHAKE_TIMEOUT};
use crate::discovery::{
    ConnectionId, LocalIdentity, PeerInfo, PeerKey, PeerTable, Registration,
};
use crate::engine::Hub;
use crate::error::{Error, Result};
use crate::fragment::{Fragmenter, MessageIdCounter, Reassembler, ReassemblerConfig};
use crate::protocol::data::DATA_BODY_FIXED_LEN;
use crate::protocol::{AnnouncePacket, DataPacket, TypeHash, WirePacket};

// ============================================================================
// Constants
// ============================================================================

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);
const UNICAST_TOKEN: Token = Token(2);
const MULTICAST_TOKEN: Token = Token(3);

/// Starting token for TCP connections
const CONNECTION_TOKEN_START: usize = 4;

/// Maximum events to process per poll
const MAX_EVENTS: usize = 128;

/// Largest UDP datagram
const MAX_DATAGRAM: usize = 65536;

/// TCP read chunk
const READ_CHUNK: usize = 64 * 1024;

// ============================================================================
// Commands
// ============================================================================

/// A message handed to the I/O thread for sending.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub hash: TypeHash,
    pub payload: Vec<u8>,
    /// Peer name, or every peer when `None`
    pub target: Option<String>,
    /// TCP when true, UDP otherwise
    pub reliable: bool,
}

/// Commands sent to the I/O thread.
#[derive(Debug)]
pub enum IoCommand {
    Send(Outbound),
    Shutdown,
}

// ============================================================================
// I/O Thread Handle
// ============================================================================

/// Handle owned by the application side of a connected instance.
pub struct IoThreadHandle {
    cmd_tx: Sender<IoCommand>,
    waker: Arc<Waker>,
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    local: LocalIdentity,
    peers: Arc<RwLock<PeerTable>>,
    stats: Arc<NetworkStats>,
    max_reliable_payload: usize,
    max_unreliable_payload: usize,
}

impl IoThreadHandle {
    /// Queue a message for sending.
    ///
    /// Size limits are checked here so the caller gets the error; delivery
    /// itself is asynchronous.
    pub fn send(&self, message: Outbound) -> Result<()> {
        let max = if message.reliable {
            self.max_reliable_payload
        } else {
            self.max_unreliable_payload
        };
        if message.payload.len() > max {
            return Err(Error::PayloadTooLarge {
                len: message.payload.len(),
                max,
            });
        }

        self.cmd_tx
            .send(IoCommand::Send(message))
            .map_err(|_| Error::ChannelClosed)?;
        self.waker.wake()?;
        Ok(())
    }

    /// Name and ports this instance announces.
    pub fn local(&self) -> &LocalIdentity {
        &self.local
    }

    /// Snapshot of the joined peers.
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().peers()
    }

    pub fn stats(&self) -> &Arc<NetworkStats> {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the I/O thread and wait for it.
    ///
    /// Every joined peer gets a leave event before this returns, except
    /// when called from a callback running on the I/O thread itself: the
    /// loop then stops after the current event.
    pub fn shutdown(&mut self) -> io::Result<()> {
        let _ = self.cmd_tx.send(IoCommand::Shutdown);
        let _ = self.waker.wake();

        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                return Ok(());
            }
            handle
                .join()
                .map_err(|_| io::Error::other("I/O thread panicked"))?;
        }

        Ok(())
    }
}

impl Drop for IoThreadHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

// ============================================================================
// I/O Thread
// ============================================================================

/// I/O thread state and runner.
pub struct IoThread {
    config: NetworkConfig,
    poll: Poll,
    listener: TcpListener,
    unicast: UdpSocket,
    multicast: UdpSocket,
    group_addr: SocketAddr,

    /// TCP connections by token
    connections: HashMap<Token, Connection>,

    /// Outbound connects still waiting for the peer's ANNOUNCE
    pending: HashMap<PeerKey, Token>,

    next_token: usize,
    cmd_rx: Receiver<IoCommand>,
    peers: Arc<RwLock<PeerTable>>,
    hub: Arc<Hub>,
    reassembler: Reassembler<PeerKey>,
    fragmenter: Fragmenter,
    message_ids: MessageIdCounter,

    /// Encoded ANNOUNCE, sent on multicast and on every new connection
    announce: Vec<u8>,

    stats: Arc<NetworkStats>,
    running: Arc<AtomicBool>,
    recv_buf: Vec<u8>,
    read_buf: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    /// Outbound connect in progress
    Connecting,
    Connected,
}

/// Per-connection state.
struct Connection {
    stream: TcpStream,
    remote_addr: SocketAddr,
    state: ConnectionState,
    framer: PacketFramer,
    send_queue: Vec<u8>,
    send_offset: usize,
    /// Set for connections we initiated
    handshake_key: Option<PeerKey>,
    opened_at: Instant,
}

impl Connection {
    fn new(
        stream: TcpStream,
        remote_addr: SocketAddr,
        state: ConnectionState,
        handshake_key: Option<PeerKey>,
        max_message_size: usize,
    ) -> Self {
        Self {
            stream,
            remote_addr,
            state,
            framer: PacketFramer::new(max_message_size),
            send_queue: Vec::new(),
            send_offset: 0,
            handshake_key,
            opened_at: Instant::now(),
        }
    }
}

/// Whether we open the TCP connection to `remote`.
///
/// The smaller `(name, tcp_port, udp_port)` key initiates.
pub fn initiates_handshake(local: &LocalIdentity, remote: &AnnouncePacket) -> bool {
    (local.name.as_str(), local.tcp_port, local.udp_port)
        < (remote.name.as_str(), remote.tcp_port, remote.udp_port)
}

impl IoThread {
    /// Bind every socket and build the thread state.
    pub fn new(config: NetworkConfig, hub: Arc<Hub>) -> io::Result<(Self, IoThreadHandle)> {
        let poll = Poll::new()?;

        let mut listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], 0)))?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let sockets = UdpSockets::bind(&config)?;
        let mut unicast = UdpSocket::from_std(sockets.unicast);
        let mut multicast = UdpSocket::from_std(sockets.multicast);
        poll.registry()
            .register(&mut unicast, UNICAST_TOKEN, Interest::READABLE)?;
        poll.registry()
            .register(&mut multicast, MULTICAST_TOKEN, Interest::READABLE)?;

        let local = LocalIdentity {
            name: config.name.clone(),
            tcp_port: listener.local_addr()?.port(),
            udp_port: unicast.local_addr()?.port(),
        };
        let announce = AnnouncePacket::new(local.name.clone(), local.tcp_port, local.udp_port).encode();
        let peers = Arc::new(RwLock::new(PeerTable::new(local.clone())));

        let fragmenter = Fragmenter::new(config.udp_fragment_capacity());
        let reassembler = Reassembler::new(ReassemblerConfig {
            max_pending_per_peer: config.max_pending_fragment_sets,
            timeout: config.reassembly_timeout,
            max_message_size: config.max_message_size,
        });

        let (cmd_tx, cmd_rx) = unbounded();
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(NetworkStats::new());

        let handle = IoThreadHandle {
            cmd_tx,
            waker,
            thread_handle: None,
            running: Arc::clone(&running),
            local,
            peers: Arc::clone(&peers),
            stats: Arc::clone(&stats),
            max_reliable_payload: config.max_message_size.saturating_sub(DATA_BODY_FIXED_LEN),
            max_unreliable_payload: fragmenter.max_payload().min(config.max_message_size),
        };

        let group_addr = SocketAddr::V4(SocketAddrV4::new(config.group, config.port));
        let io_thread = Self {
            config,
            poll,
            listener,
            unicast,
            multicast,
            group_addr,
            connections: HashMap::new(),
            pending: HashMap::new(),
            next_token: CONNECTION_TOKEN_START,
            cmd_rx,
            peers,
            hub,
            reassembler,
            fragmenter,
            message_ids: MessageIdCounter::new(),
            announce,
            stats,
            running,
            recv_buf: vec![0u8; MAX_DATAGRAM],
            read_buf: vec![0u8; READ_CHUNK],
        };

        Ok((io_thread, handle))
    }

    /// Spawn the I/O thread.
    pub fn spawn(config: NetworkConfig, hub: Arc<Hub>) -> io::Result<IoThreadHandle> {
        let (io_thread, mut handle) = Self::new(config, hub)?;

        let thread_handle = thread::Builder::new()
            .name("nuclearnet-io".to_string())
            .spawn(move || {
                io_thread.run();
            })?;

        handle.thread_handle = Some(thread_handle);
        Ok(handle)
    }

    /// Run the event loop until shutdown.
    pub fn run(mut self) {
        log::info!(
            "[io] '{}' up: tcp={} udp={} group={}",
            self.config.name,
            self.listener.local_addr().map(|a| a.port()).unwrap_or(0),
            self.unicast.local_addr().map(|a| a.port()).unwrap_or(0),
            self.group_addr
        );

        let mut events = Events::with_capacity(MAX_EVENTS);
        self.send_announce();
        let mut next_tick = Instant::now() + self.config.announce_interval;

        while self.running.load(Ordering::Relaxed) {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            if let Err(e) = self.poll.poll(&mut events, Some(timeout)) {
                if e.kind() != io::ErrorKind::Interrupted {
                    log::warn!("[io] poll error: {}", e);
                }
                continue;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.handle_accept(),
                    WAKER_TOKEN => self.handle_commands(),
                    UNICAST_TOKEN | MULTICAST_TOKEN => self.handle_datagrams(event.token()),
                    token => {
                        if event.is_writable() {
                            self.handle_writable(token);
                        }
                        if event.is_readable() {
                            self.handle_readable(token);
                        }
                    }
                }
            }

            let now = Instant::now();
            if now >= next_tick {
                self.tick(now);
                next_tick = now + self.config.announce_interval;
            }
        }

        self.teardown();
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    fn tick(&mut self, now: Instant) {
        self.send_announce();

        let dropped = self.reassembler.sweep(now);
        if dropped > 0 {
            log::debug!("[udp] dropped {} stale fragment sets", dropped);
        }
        self.stats.update_reassembly(&self.reassembler.stats());

        self.expire_handshakes(now);
    }

    fn send_announce(&self) {
        self.send_datagram(&self.announce, self.group_addr);
        self.stats.record_announce_sent();
    }

    /// Close connections whose peer never announced itself.
    fn expire_handshakes(&mut self, now: Instant) {
        let expired: Vec<Token> = {
            let peers = self.peers.read();
            self.connections
                .iter()
                .filter(|(token, conn)| {
                    now.duration_since(conn.opened_at) > HANDSHAKE_TIMEOUT
                        && peers.lookup_by_connection(token.0 as ConnectionId).is_none()
                })
                .map(|(token, _)| *token)
                .collect()
        };

        for token in expired {
            self.close_connection(token, "handshake timed out");
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn handle_commands(&mut self) {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(IoCommand::Send(message)) => self.handle_send(message),
                Ok(IoCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::Relaxed);
                    return;
                }
                Err(TryRecvError::Empty) => return,
            }
        }
    }

    fn handle_send(&mut self, message: Outbound) {
        let Outbound {
            hash,
            payload,
            target,
            reliable,
        } = message;

        let message_id = self.message_ids.next_id();
        let multicast = target.is_none();
        self.stats.record_message_sent();

        if reliable {
            let packet = DataPacket {
                message_id,
                fragment_index: 0,
                fragment_count: 1,
                multicast,
                hash: hash.to_wire(),
                payload,
            }
            .encode();

            let tokens = self.reliable_targets(target.as_deref());
            if tokens.is_empty() {
                log::debug!("[tcp] no peer for {:?}, message {} dropped", target, message_id);
            }
            for token in tokens {
                if let Some(conn) = self.connections.get_mut(&token) {
                    conn.send_queue.extend_from_slice(&packet);
                }
                self.try_flush(token);
            }
            return;
        }

        let fragments = match self.fragmenter.fragment(message_id, hash, &payload, multicast) {
            Ok(fragments) => fragments,
            Err(e) => {
                log::warn!("[udp] cannot fragment message {}: {}", message_id, e);
                return;
            }
        };

        let destinations: Vec<SocketAddr> = match target.as_deref() {
            None => vec![self.group_addr],
            Some(name) => self
                .peers
                .read()
                .lookup_by_name(name)
                .into_iter()
                .map(PeerInfo::udp_addr)
                .collect(),
        };
        if destinations.is_empty() {
            log::debug!("[udp] no peer for {:?}, message {} dropped", target, message_id);
            return;
        }

        for fragment in &fragments {
            let bytes = fragment.encode();
            for dest in &destinations {
                self.send_datagram(&bytes, *dest);
            }
        }
    }

    /// Connections carrying reliable traffic for `target`.
    fn reliable_targets(&self, target: Option<&str>) -> Vec<Token> {
        let peers = self.peers.read();
        let keys: Vec<PeerKey> = match target {
            Some(name) => peers.lookup_by_name(name).into_iter().map(PeerInfo::key).collect(),
            None => peers.peers().iter().map(PeerInfo::key).collect(),
        };
        keys.iter()
            .filter_map(|key| peers.connection_of(key))
            .map(|conn| Token(conn as usize))
            .collect()
    }

    fn send_datagram(&self, bytes: &[u8], dest: SocketAddr) {
        match self.unicast.send_to(bytes, dest) {
            Ok(n) => self.stats.record_datagram_sent(n),
            Err(e) => {
                self.stats.record_send_error();
                log::debug!("[udp] send to {} failed: {}", dest, e);
            }
        }
    }

    // ------------------------------------------------------------------------
    // UDP
    // ------------------------------------------------------------------------

    fn handle_datagrams(&mut self, token: Token) {
        loop {
            let socket = if token == MULTICAST_TOKEN {
                &self.multicast
            } else {
                &self.unicast
            };
            let (len, src) = match socket.recv_from(&mut self.recv_buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("[udp] recv error: {}", e);
                    return;
                }
            };
            self.stats.record_datagram_received(len);

            match WirePacket::decode(&self.recv_buf[..len]) {
                Ok(WirePacket::Announce(announce)) => self.on_udp_announce(announce, src),
                Ok(WirePacket::Data(data)) => self.on_udp_data(data, src),
                Err(e) => {
                    self.stats.record_malformed();
                    log::debug!("[udp] dropping datagram from {}: {}", src, e);
                }
            }
        }
    }

    fn on_udp_announce(&mut self, announce: AnnouncePacket, src: SocketAddr) {
        self.stats.record_announce_received();
        let key = PeerKey::new(src.ip(), announce.udp_port);

        {
            let peers = self.peers.read();
            if peers.is_self(&announce.name, announce.tcp_port, announce.udp_port) {
                return;
            }
            if peers.lookup_by_transport(key.address, key.udp_port).is_some() {
                return;
            }
            if !initiates_handshake(peers.local(), &announce) {
                return;
            }
        }
        if self.pending.contains_key(&key) {
            return;
        }

        log::debug!("[tcp] discovered '{}' at {}, connecting", announce.name, src.ip());
        self.connect(SocketAddr::new(src.ip(), announce.tcp_port), key);
    }

    fn on_udp_data(&mut self, data: DataPacket, src: SocketAddr) {
        let peer = self
            .peers
            .read()
            .lookup_by_transport(src.ip(), src.port())
            .cloned();

        match peer {
            Some(peer) => self.deliver(peer, data, false),
            // Includes our own multicast looping back
            None => self.stats.record_unknown_sender(),
        }
    }

    fn deliver(&mut self, peer: PeerInfo, data: DataPacket, reliable: bool) {
        let hash = data.type_hash();
        if let Some(payload) = self.reassembler.on_fragment(&peer.key(), data, Instant::now()) {
            self.stats.record_message_delivered();
            self.hub.deliver(peer, hash, payload, reliable);
        }
    }

    // ------------------------------------------------------------------------
    // TCP
    // ------------------------------------------------------------------------

    fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    fn connect(&mut self, addr: SocketAddr, key: PeerKey) {
        let mut stream = match TcpStream::connect(addr) {
            Ok(stream) => stream,
            Err(e) => {
                self.stats.record_connection_failed();
                log::debug!("[tcp] connect to {} failed: {}", addr, e);
                return;
            }
        };

        let token = self.next_token();
        if let Err(e) = self.poll.registry().register(
            &mut stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        ) {
            log::warn!("[tcp] failed to register connection to {}: {}", addr, e);
            return;
        }

        self.connections.insert(
            token,
            Connection::new(
                stream,
                addr,
                ConnectionState::Connecting,
                Some(key),
                self.config.max_message_size,
            ),
        );
        self.pending.insert(key, token);
    }

    fn handle_accept(&mut self) {
        loop {
            let (mut stream, remote_addr) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("[tcp] accept error: {}", e);
                    return;
                }
            };

            let token = self.next_token();
            if let Err(e) = self.poll.registry().register(
                &mut stream,
                token,
                Interest::READABLE | Interest::WRITABLE,
            ) {
                log::warn!("[tcp] failed to register connection from {}: {}", remote_addr, e);
                continue;
            }
            let _ = stream.set_nodelay(self.config.nodelay);

            let mut conn = Connection::new(
                stream,
                remote_addr,
                ConnectionState::Connected,
                None,
                self.config.max_message_size,
            );
            conn.send_queue.extend_from_slice(&self.announce);
            self.connections.insert(token, conn);
            self.stats.record_connection_established();
            log::debug!("[tcp] accepted {}", remote_addr);

            self.try_flush(token);
        }
    }

    fn handle_writable(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        if conn.state == ConnectionState::Connecting {
            match conn.stream.take_error() {
                Ok(None) => {}
                Ok(Some(e)) | Err(e) => {
                    self.stats.record_connection_failed();
                    self.close_connection(token, &format!("connect failed: {}", e));
                    return;
                }
            }
            match conn.stream.peer_addr() {
                Ok(_) => {}
                // Spurious wakeup, still connecting
                Err(e) if e.kind() == io::ErrorKind::NotConnected => return,
                Err(e) => {
                    self.stats.record_connection_failed();
                    self.close_connection(token, &format!("connect failed: {}", e));
                    return;
                }
            }

            conn.state = ConnectionState::Connected;
            let _ = conn.stream.set_nodelay(self.config.nodelay);
            conn.send_queue.extend_from_slice(&self.announce);
            self.stats.record_connection_established();
            log::debug!("[tcp] connected to {}", conn.remote_addr);
        }

        self.try_flush(token);
    }

    fn handle_readable(&mut self, token: Token) {
        let mut packets = Vec::new();
        let mut close_reason = None;

        {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };

            loop {
                match conn.stream.read(&mut self.read_buf) {
                    Ok(0) => {
                        close_reason = Some("closed by peer".to_string());
                        break;
                    }
                    Ok(n) => {
                        self.stats.record_stream_received(n);
                        conn.framer.feed(&self.read_buf[..n]);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        close_reason = Some(format!("read error: {}", e));
                        break;
                    }
                }
            }

            loop {
                match conn.framer.next_packet() {
                    Ok(Some(packet)) => packets.push(packet),
                    Ok(None) => break,
                    Err(e) => {
                        self.stats.record_malformed();
                        close_reason = Some(format!("framing error: {}", e));
                        break;
                    }
                }
            }
        }

        for packet in packets {
            self.on_stream_packet(token, &packet);
        }
        if let Some(reason) = close_reason {
            self.close_connection(token, &reason);
        }
    }

    fn on_stream_packet(&mut self, token: Token, bytes: &[u8]) {
        // An earlier packet may have closed the connection
        if !self.connections.contains_key(&token) {
            return;
        }

        match WirePacket::decode(bytes) {
            Ok(WirePacket::Announce(announce)) => self.on_stream_announce(token, announce),
            Ok(WirePacket::Data(data)) => {
                let peer = self
                    .peers
                    .read()
                    .lookup_by_connection(token.0 as ConnectionId)
                    .cloned();
                match peer {
                    Some(peer) => self.deliver(peer, data, true),
                    None => {
                        self.stats.record_unknown_sender();
                        log::debug!("[tcp] DATA before ANNOUNCE, dropped");
                    }
                }
            }
            Err(e) => {
                self.stats.record_malformed();
                log::debug!("[tcp] dropping packet: {}", e);
            }
        }
    }

    fn on_stream_announce(&mut self, token: Token, announce: AnnouncePacket) {
        let connection = token.0 as ConnectionId;
        let Some((remote, handshake_key)) = self
            .connections
            .get(&token)
            .map(|conn| (conn.remote_addr, conn.handshake_key))
        else {
            return;
        };

        let registration = self.peers.write().register_peer(
            remote.ip(),
            announce.tcp_port,
            announce.udp_port,
            &announce.name,
            connection,
        );

        match registration {
            Registration::Joined(peer) => {
                if let Some(key) = handshake_key {
                    self.pending.remove(&key);
                }
                self.stats.record_peer_joined();
                log::info!("[peers] {} joined", peer);
                self.hub.notify_join(&peer);
            }
            Registration::SelfAnnounce => self.close_connection(token, "connected to self"),
            Registration::AlreadyKnown => {
                // A repeated ANNOUNCE on the owning connection is harmless
                if self.peers.read().lookup_by_connection(connection).is_none() {
                    self.close_connection(token, "peer already connected");
                }
            }
        }
    }

    fn try_flush(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if conn.state != ConnectionState::Connected || conn.send_queue.is_empty() {
            return;
        }

        while conn.send_offset < conn.send_queue.len() {
            match conn.stream.write(&conn.send_queue[conn.send_offset..]) {
                Ok(0) => {
                    self.close_connection(token, "write returned 0");
                    return;
                }
                Ok(n) => {
                    conn.send_offset += n;
                    self.stats.record_stream_sent(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.stats.record_send_error();
                    self.close_connection(token, &format!("write error: {}", e));
                    return;
                }
            }
        }

        conn.send_queue.clear();
        conn.send_offset = 0;
    }

    /// Close a connection; its peer, if any, leaves.
    fn close_connection(&mut self, token: Token, reason: &str) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        let _ = self.poll.registry().deregister(&mut conn.stream);

        if let Some(key) = conn.handshake_key {
            if self.pending.get(&key) == Some(&token) {
                self.pending.remove(&key);
            }
        }

        let departed = self
            .peers
            .write()
            .remove_by_connection(token.0 as ConnectionId);
        match departed {
            Some(peer) => {
                log::info!("[peers] {} left ({})", peer, reason);
                self.reassembler.remove_sender(&peer.key());
                self.stats.record_peer_left();
                self.hub.notify_leave(&peer);
            }
            None => log::debug!("[tcp] closed {} ({})", conn.remote_addr, reason),
        }
    }

    /// Close everything; every peer leaves.
    fn teardown(&mut self) {
        for (_, mut conn) in self.connections.drain() {
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
        self.pending.clear();
        self.reassembler.clear();

        let departed = self.peers.write().clear();
        for (peer, _) in departed {
            self.stats.record_peer_left();
            self.hub.notify_leave(&peer);
        }

        self.running.store(false, Ordering::Relaxed);
        log::info!("[io] '{}' stopped", self.config.name);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn local(name: &str, tcp: u16, udp: u16) -> LocalIdentity {
        LocalIdentity {
            name: name.into(),
            tcp_port: tcp,
            udp_port: udp,
        }
    }

    #[test]
    fn test_exactly_one_side_initiates() {
        let a = local("alpha", 4000, 5000);
        let b = local("beta", 3000, 6000);
        let a_announce = AnnouncePacket::new("alpha", 4000, 5000);
        let b_announce = AnnouncePacket::new("beta", 3000, 6000);

        assert!(initiates_handshake(&a, &b_announce));
        assert!(!initiates_handshake(&b, &a_announce));
    }

    #[test]
    fn test_same_name_breaks_tie_on_ports() {
        let a = local("node", 4000, 5000);
        let b = local("node", 4000, 5001);
        assert!(initiates_handshake(&a, &AnnouncePacket::new("node", 4000, 5001)));
        assert!(!initiates_handshake(&b, &AnnouncePacket::new("node", 4000, 5000)));
    }

    #[test]
    fn test_spawn_and_shutdown() {
        let config = NetworkConfig::new("io-test")
            .port(17392)
            .multicast_interface(Ipv4Addr::LOCALHOST);
        let mut handle = IoThread::spawn(config, Arc::new(Hub::new())).unwrap();

        assert!(handle.is_running());
        assert_ne!(handle.local().tcp_port, 0);
        assert_ne!(handle.local().udp_port, 0);
        assert!(handle.peers().is_empty());

        handle.shutdown().unwrap();
        assert!(!handle.is_running());
        assert!(handle.stats().snapshot().announces_sent >= 1);
    }

    #[test]
    fn test_payload_limits_checked_before_queueing() {
        let config = NetworkConfig::new("io-limits")
            .port(17393)
            .mtu(1500)
            .multicast_interface(Ipv4Addr::LOCALHOST);
        let handle = IoThread::spawn(config, Arc::new(Hub::new())).unwrap();

        let too_big = Outbound {
            hash: TypeHash::of("big"),
            payload: vec![0; crate::config::DEFAULT_MAX_MESSAGE_SIZE + 1],
            target: None,
            reliable: false,
        };
        assert!(matches!(
            handle.send(too_big),
            Err(Error::PayloadTooLarge { .. })
        ));

        let fine = Outbound {
            hash: TypeHash::of("small"),
            payload: vec![0; 64],
            target: None,
            reliable: true,
        };
        assert!(handle.send(fine).is_ok());
    }
}
