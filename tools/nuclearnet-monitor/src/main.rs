// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! nuclearnet-monitor - watch a NUClearNet network
//!
//! Joins the network under its own name, prints peers as they join and
//! leave and every message it receives. Can also publish a test message
//! periodically.

use chrono::Local;
use clap::Parser;
use colored::*;
use nuclearnet::{NUClearNet, NetworkConfig, Packet, PeerInfo, SendOptions};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Watch NUClearNet peers and messages
#[derive(Parser, Debug)]
#[command(name = "nuclearnet-monitor")]
#[command(version = "0.1.0")]
#[command(about = "Watch NUClearNet peers and messages")]
struct Args {
    /// Name announced to the network
    #[arg(long, default_value = "nuclearnet-monitor")]
    name: String,

    /// Announce multicast group
    #[arg(short, long, default_value = "239.226.152.162")]
    group: Ipv4Addr,

    /// Announce port
    #[arg(short, long, default_value = "7447")]
    port: u16,

    /// Link MTU used to size UDP fragments
    #[arg(long, default_value = "1500")]
    mtu: u16,

    /// Interface address for multicast (default: all interfaces)
    #[arg(short, long)]
    interface: Option<Ipv4Addr>,

    /// Type names to resolve in the output (hashes are shown otherwise)
    #[arg(short = 't', long = "type")]
    types: Vec<String>,

    /// Publish this message type periodically
    #[arg(long)]
    send: Option<String>,

    /// Payload for --send
    #[arg(long, default_value = "ping")]
    payload: String,

    /// Peer name for --send (default: everyone)
    #[arg(long)]
    target: Option<String>,

    /// Use TCP for --send
    #[arg(long)]
    reliable: bool,

    /// Interval between --send messages in milliseconds
    #[arg(long, default_value = "1000")]
    interval: u64,

    /// Hex dump every payload
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Quiet mode - only output events, no headers or summary
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn main() {
    let _ = env_logger::try_init();
    let args = Args::parse();

    if args.no_color || !is_tty() {
        colored::control::set_override(false);
    }

    if let Err(e) = run_monitor(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_monitor(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let net = NUClearNet::new();
    let received = Arc::new(AtomicU64::new(0));

    net.on_join(|peer| print_peer_event(peer, true))?;
    net.on_leave(|peer| print_peer_event(peer, false))?;

    // Subscriptions only make the type names resolvable; printing happens in the catch-all
    for type_name in &args.types {
        net.subscribe(type_name, |_| {})?;
    }

    let verbose = args.verbose;
    let counter = Arc::clone(&received);
    net.on_packet(move |packet| {
        let seq = counter.fetch_add(1, Ordering::Relaxed) + 1;
        print_packet(packet, seq, verbose);
    })?;

    let mut config = NetworkConfig::new(args.name.clone())
        .group(args.group)
        .port(args.port)
        .mtu(args.mtu);
    if let Some(iface) = args.interface {
        config = config.multicast_interface(iface);
    }
    net.connect(config)?;

    if !args.quiet {
        print_header(args, &net)?;
    }

    let interval = Duration::from_millis(args.interval.max(1));
    let mut next_send = Instant::now();
    let mut sent = 0u64;

    while running.load(Ordering::SeqCst) {
        if let Some(message_type) = &args.send {
            if Instant::now() >= next_send {
                let mut opts = SendOptions::new(message_type.as_str(), args.payload.as_bytes().to_vec())
                    .reliable(args.reliable);
                if let Some(target) = &args.target {
                    opts = opts.target(target.clone());
                }
                match net.send(opts) {
                    Ok(()) => sent += 1,
                    Err(e) => eprintln!("{}: {}", "Warning".yellow(), e),
                }
                next_send = Instant::now() + interval;
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    let stats = net.stats()?;
    net.disconnect()?;

    if !args.quiet {
        eprintln!();
        eprintln!(
            "{} received {} message(s), sent {}",
            "---".dimmed(),
            received.load(Ordering::Relaxed),
            sent
        );
        eprintln!("{} {}", "---".dimmed(), stats);
    }

    Ok(())
}

fn print_header(args: &Args, net: &NUClearNet) -> Result<(), Box<dyn std::error::Error>> {
    let local = net.local_identity()?;
    let (tcp, udp) = local.map(|l| (l.tcp_port, l.udp_port)).unwrap_or((0, 0));
    eprintln!(
        "{} {} {} on {}:{} (tcp={}, udp={})",
        ">>>".green().bold(),
        "Monitoring as".bold(),
        args.name.cyan(),
        args.group,
        args.port,
        tcp,
        udp
    );
    eprintln!("{}", "Press Ctrl+C to stop".dimmed());
    eprintln!();
    Ok(())
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

fn print_peer_event(peer: &PeerInfo, joined: bool) {
    let tag = if joined {
        "JOIN ".green().bold()
    } else {
        "LEAVE".red().bold()
    };
    println!(
        "{} {} {} {}:{} (udp {})",
        format!("[{}]", timestamp()).dimmed(),
        tag,
        peer.name.cyan(),
        peer.address,
        peer.tcp_port,
        peer.udp_port
    );
}

fn print_packet(packet: &Packet, seq: u64, verbose: bool) {
    let type_label = match &packet.type_name {
        Some(name) => name.yellow().to_string(),
        None => packet.hash.to_string(),
    };
    let transport = if packet.reliable { "tcp" } else { "udp" };
    println!(
        "{} {} {} from {} via {} ({} bytes)",
        format!("[{}]", timestamp()).dimmed(),
        format!("#{}", seq).yellow(),
        type_label,
        packet.peer.name.cyan(),
        transport,
        packet.payload.len()
    );

    if verbose {
        print_hex_dump(&packet.payload);
    }
}

fn print_hex_dump(data: &[u8]) {
    for (i, chunk) in data.chunks(16).enumerate() {
        print!("  {:04x}  ", i * 16);

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                print!(" ");
            }
            print!("{:02x} ", byte);
        }

        for j in chunk.len()..16 {
            if j == 8 {
                print!(" ");
            }
            print!("   ");
        }

        print!(" |");
        for byte in chunk {
            print!(
                "{}",
                if (0x20..0x7f).contains(byte) {
                    *byte as char
                } else {
                    '.'
                }
            );
        }
        println!("|");
    }
}

fn is_tty() -> bool {
    #[cfg(unix)]
    unsafe {
        libc::isatty(libc::STDOUT_FILENO) != 0
    }
    #[cfg(not(unix))]
    true
}
