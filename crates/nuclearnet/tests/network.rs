// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::needless_pass_by_value)] // Test functions

//! End-to-end tests over loopback multicast.
//!
//! Every test runs its instances on a private announce port with the
//! multicast interface pinned to 127.0.0.1, so tests run in parallel
//! without hearing each other.

use nuclearnet::{Error, NUClearNet, NetworkConfig, Packet, SendOptions};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

fn config(name: &str, port: u16) -> NetworkConfig {
    NetworkConfig::new(name)
        .port(port)
        .multicast_interface(Ipv4Addr::LOCALHOST)
        .announce_interval(Duration::from_millis(100))
}

fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if done() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("timed out waiting for {}", what);
}

/// One instance plus everything its callbacks observed.
struct Node {
    net: NUClearNet,
    joined: Arc<Mutex<Vec<String>>>,
    left: Arc<Mutex<Vec<String>>>,
    packets: Arc<Mutex<Vec<Packet>>>,
}

impl Node {
    fn start(name: &str, port: u16) -> Self {
        let _ = env_logger::try_init();

        let net = NUClearNet::new();
        let joined = Arc::new(Mutex::new(Vec::new()));
        let left = Arc::new(Mutex::new(Vec::new()));
        let packets = Arc::new(Mutex::new(Vec::new()));

        let j = Arc::clone(&joined);
        net.on_join(move |peer| j.lock().push(peer.name.clone()))
            .expect("on_join");
        let l = Arc::clone(&left);
        net.on_leave(move |peer| l.lock().push(peer.name.clone()))
            .expect("on_leave");
        let p = Arc::clone(&packets);
        net.on_packet(move |packet| p.lock().push(packet.clone()))
            .expect("on_packet");

        net.connect(config(name, port)).expect("connect");

        Self {
            net,
            joined,
            left,
            packets,
        }
    }

    fn has_joined(&self, name: &str) -> bool {
        self.joined.lock().iter().any(|n| n == name)
    }

    fn has_left(&self, name: &str) -> bool {
        self.left.lock().iter().any(|n| n == name)
    }

    fn packets_from(&self, name: &str) -> Vec<Packet> {
        self.packets
            .lock()
            .iter()
            .filter(|p| p.peer.name == name)
            .cloned()
            .collect()
    }
}

fn wait_mesh(nodes: &[(&str, &Node)]) {
    for (name, node) in nodes {
        for (other, _) in nodes {
            if other != name {
                wait_for(&format!("{} to see {}", name, other), || node.has_joined(other));
            }
        }
    }
}

#[test]
fn peers_join_both_ways() {
    let a = Node::start("join-a", 17450);
    let b = Node::start("join-b", 17450);
    wait_mesh(&[("join-a", &a), ("join-b", &b)]);

    // Several announce rounds later there is still exactly one join each
    thread::sleep(Duration::from_millis(500));
    assert_eq!(*a.joined.lock(), vec!["join-b".to_string()]);
    assert_eq!(*b.joined.lock(), vec!["join-a".to_string()]);

    let peers = a.net.peers().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].name, "join-b");
    assert_eq!(peers[0].address, IpAddr::from(Ipv4Addr::LOCALHOST));
    let b_local = b.net.local_identity().unwrap().unwrap();
    assert_eq!(peers[0].tcp_port, b_local.tcp_port);
    assert_eq!(peers[0].udp_port, b_local.udp_port);
}

#[test]
fn disconnect_raises_leave() {
    let a = Node::start("leave-a", 17451);
    let b = Node::start("leave-b", 17451);
    wait_mesh(&[("leave-a", &a), ("leave-b", &b)]);

    b.net.disconnect().unwrap();
    assert!(!b.net.is_connected());

    // The disconnecting side reports its peers leaving before returning
    assert!(b.has_left("leave-a"));
    wait_for("a to see b leave", || a.has_left("leave-b"));
    assert!(a.net.peers().unwrap().is_empty());
    assert!(b.net.peers().unwrap().is_empty());
}

#[test]
fn reconnect_rejoins() {
    let a = Node::start("rejoin-a", 17452);
    let b = Node::start("rejoin-b", 17452);
    wait_mesh(&[("rejoin-a", &a), ("rejoin-b", &b)]);

    b.net.connect(config("rejoin-b", 17452)).unwrap();
    assert!(b.net.is_connected());
    assert!(b.has_left("rejoin-a"));

    wait_for("a to see b leave", || a.has_left("rejoin-b"));
    wait_for("a to see b again", || a.joined.lock().len() == 2);
    wait_for("a to list b", || a.net.peers().unwrap().len() == 1);
}

#[test]
fn reliable_targeted_send_reaches_only_target() {
    let a = Node::start("rel-a", 17453);
    let b = Node::start("rel-b", 17453);
    let c = Node::start("rel-c", 17453);
    wait_mesh(&[("rel-a", &a), ("rel-b", &b), ("rel-c", &c)]);

    let typed = Arc::new(Mutex::new(Vec::new()));
    let t = Arc::clone(&typed);
    b.net
        .subscribe("test.Reliable", move |packet| t.lock().push(packet.clone()))
        .unwrap();

    a.net
        .send(
            SendOptions::new("test.Reliable", b"hello".to_vec())
                .target("rel-b")
                .reliable(true),
        )
        .unwrap();

    wait_for("b to receive", || !typed.lock().is_empty());
    thread::sleep(Duration::from_millis(300));

    let typed = typed.lock();
    assert_eq!(typed.len(), 1);
    assert_eq!(typed[0].payload, b"hello");
    assert_eq!(typed[0].peer.name, "rel-a");
    assert!(typed[0].reliable);
    assert_eq!(typed[0].type_name.as_deref(), Some("test.Reliable"));

    // The catch-all saw it too, exactly once
    assert_eq!(b.packets_from("rel-a").len(), 1);
    assert!(c.packets_from("rel-a").is_empty());
}

#[test]
fn reliable_broadcast_reaches_every_peer_in_order() {
    let a = Node::start("order-a", 17454);
    let b = Node::start("order-b", 17454);
    let c = Node::start("order-c", 17454);
    wait_mesh(&[("order-a", &a), ("order-b", &b), ("order-c", &c)]);

    for i in 0u32..50 {
        a.net
            .send(SendOptions::new("test.Seq", i.to_le_bytes().to_vec()).reliable(true))
            .unwrap();
    }

    for node in [&b, &c] {
        wait_for("50 messages", || node.packets_from("order-a").len() == 50);
        let seqs: Vec<u32> = node
            .packets_from("order-a")
            .iter()
            .map(|p| u32::from_le_bytes([p.payload[0], p.payload[1], p.payload[2], p.payload[3]]))
            .collect();
        assert_eq!(seqs, (0..50).collect::<Vec<_>>());
        // Nobody subscribed, so the type name is unknown
        assert!(node.packets_from("order-a").iter().all(|p| p.type_name.is_none()));
    }
}

#[test]
fn unreliable_multicast_reaches_every_peer() {
    let a = Node::start("mc-a", 17455);
    let b = Node::start("mc-b", 17455);
    let c = Node::start("mc-c", 17455);
    wait_mesh(&[("mc-a", &a), ("mc-b", &b), ("mc-c", &c)]);

    // UDP is lossy: keep sending until both have one
    wait_for("multicast delivery", || {
        a.net
            .send(SendOptions::new("test.Multicast", b"everyone".to_vec()))
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        !b.packets_from("mc-a").is_empty() && !c.packets_from("mc-a").is_empty()
    });

    for node in [&b, &c] {
        let packet = &node.packets_from("mc-a")[0];
        assert_eq!(packet.payload, b"everyone");
        assert!(!packet.reliable);
    }
    // Our own multicast loops back but is never delivered to ourselves
    assert!(a.packets_from("mc-a").is_empty());
}

#[test]
fn large_unreliable_targeted_payload_is_reassembled() {
    let a = Node::start("big-a", 17456);
    let b = Node::start("big-b", 17456);
    let c = Node::start("big-c", 17456);
    wait_mesh(&[("big-a", &a), ("big-b", &b), ("big-c", &c)]);

    let payload: Vec<u8> = (0..65535).map(|_| fastrand::u8(..)).collect();

    wait_for("large payload", || {
        a.net
            .send(SendOptions::new("test.Large", payload.clone()).target("big-b"))
            .unwrap();
        thread::sleep(Duration::from_millis(100));
        !b.packets_from("big-a").is_empty()
    });

    let received = &b.packets_from("big-a")[0];
    assert_eq!(received.payload.len(), 65535);
    assert_eq!(received.payload, payload);
    assert!(!received.reliable);
    assert!(c.packets_from("big-a").is_empty());
}

#[test]
fn unsubscribe_stops_typed_delivery() {
    let a = Node::start("unsub-a", 17457);
    let b = Node::start("unsub-b", 17457);
    wait_mesh(&[("unsub-a", &a), ("unsub-b", &b)]);

    let typed = Arc::new(Mutex::new(0usize));
    let t = Arc::clone(&typed);
    let id = b
        .net
        .subscribe("test.Unsub", move |_| *t.lock() += 1)
        .unwrap();

    let send = || {
        a.net
            .send(SendOptions::new("test.Unsub", vec![1]).reliable(true))
            .unwrap();
    };

    send();
    wait_for("first message", || *typed.lock() == 1);

    assert!(b.net.unsubscribe(id).unwrap());
    send();
    wait_for("second message on catch-all", || b.packets_from("unsub-a").len() == 2);
    assert_eq!(*typed.lock(), 1);
    assert!(b.packets_from("unsub-a")[1].type_name.is_none());
}

#[test]
fn send_requires_connection() {
    let net = NUClearNet::new();
    assert!(matches!(
        net.send(SendOptions::new("t", vec![1])),
        Err(Error::NotConnected)
    ));

    net.connect(config("idle", 17458)).unwrap();
    assert!(net.is_connected());
    net.disconnect().unwrap();
    assert!(matches!(
        net.send(SendOptions::new("t", vec![1])),
        Err(Error::NotConnected)
    ));
}

#[test]
fn destroy_disconnects_and_rejects_everything() {
    let a = Node::start("destroy-a", 17459);
    let b = Node::start("destroy-b", 17459);
    wait_mesh(&[("destroy-a", &a), ("destroy-b", &b)]);

    b.net.destroy().unwrap();
    wait_for("a to see b leave", || a.has_left("destroy-b"));

    assert!(!b.net.is_connected());
    assert!(matches!(
        b.net.send(SendOptions::new("t", vec![])),
        Err(Error::Destroyed)
    ));
    assert!(matches!(
        b.net.connect(config("destroy-b", 17459)),
        Err(Error::Destroyed)
    ));
    assert!(matches!(b.net.peers(), Err(Error::Destroyed)));
    assert!(matches!(b.net.hash("t"), Err(Error::Destroyed)));
}
