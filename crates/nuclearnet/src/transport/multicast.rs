// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast group membership and interface discovery.

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use crate::config::ENV_MULTICAST_IF;

/// Interfaces to join the announce group on.
///
/// Order of precedence: the configured interface, then the
/// `NUCLEARNET_MULTICAST_IF` environment variable, then every non-loopback
/// IPv4 interface of the host. May be empty.
pub fn multicast_interfaces(configured: Option<Ipv4Addr>) -> Vec<Ipv4Addr> {
    if let Some(addr) = configured {
        return vec![addr];
    }

    if let Ok(var) = std::env::var(ENV_MULTICAST_IF) {
        match var.parse::<Ipv4Addr>() {
            Ok(addr) => {
                log::debug!("[udp] using {} override: {}", ENV_MULTICAST_IF, addr);
                return vec![addr];
            }
            Err(_) => {
                log::warn!("[udp] ignoring invalid {}='{}'", ENV_MULTICAST_IF, var);
            }
        }
    }

    discover_interfaces()
}

/// Non-loopback IPv4 interfaces via `local_ip_address`.
fn discover_interfaces() -> Vec<Ipv4Addr> {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(ifs) => ifs,
        Err(e) => {
            log::debug!("[udp] failed to list network interfaces: {}", e);
            return Vec::new();
        }
    };

    let mut addrs: Vec<Ipv4Addr> = interfaces
        .into_iter()
        .filter_map(|(_name, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
            _ => None,
        })
        .collect();
    addrs.sort();
    addrs.dedup();

    log::debug!("[udp] discovered {} non-loopback interfaces", addrs.len());
    addrs
}

/// Join `group` on every interface in `interfaces`.
///
/// Returns the interface outbound multicast should leave from. With no
/// interfaces the kernel's default route is tried, then loopback, so a
/// host with no network still discovers local peers.
pub fn join_group(socket: &UdpSocket, group: Ipv4Addr, interfaces: &[Ipv4Addr]) -> io::Result<Ipv4Addr> {
    if interfaces.is_empty() {
        return match socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
            Ok(()) => {
                log::debug!("[udp] joined {} on default interface", group);
                Ok(Ipv4Addr::UNSPECIFIED)
            }
            Err(e) => {
                log::debug!("[udp] join {} on default interface failed: {}, using loopback", group, e);
                socket.join_multicast_v4(&group, &Ipv4Addr::LOCALHOST)?;
                Ok(Ipv4Addr::LOCALHOST)
            }
        };
    }

    let mut joined = Vec::with_capacity(interfaces.len());
    let mut last_err = None;
    for iface in interfaces {
        match socket.join_multicast_v4(&group, iface) {
            Ok(()) => {
                log::debug!("[udp] joined {} on {}", group, iface);
                joined.push(*iface);
            }
            Err(e) if e.raw_os_error() == Some(98) => {
                // EADDRINUSE: already joined on the same physical NIC
                log::debug!("[udp] {} already joined on {}", group, iface);
                joined.push(*iface);
            }
            Err(e) => {
                log::debug!("[udp] join {} on {} failed (non-fatal): {}", group, iface, e);
                last_err = Some(e);
            }
        }
    }

    match (joined.first(), last_err) {
        (Some(iface), _) => Ok(*iface),
        (None, Some(e)) => Err(e),
        (None, None) => Ok(Ipv4Addr::UNSPECIFIED),
    }
}
