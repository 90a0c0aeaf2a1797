// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP socket construction.
//!
//! Two sockets per instance:
//! - the multicast socket, bound to the well-known port and joined to the
//!   announce group, receives ANNOUNCE packets and multicast DATA
//! - the unicast socket, bound to an ephemeral port (the advertised UDP
//!   port), sends everything and receives targeted DATA

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use super::multicast::{join_group, multicast_interfaces};
use crate::config::{NetworkConfig, ENV_REUSEPORT};

/// Kernel buffer size requested for both sockets.
const SOCKET_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Bound UDP sockets for one active instance.
#[derive(Debug)]
pub struct UdpSockets {
    pub unicast: UdpSocket,
    pub multicast: UdpSocket,
    /// Interface outbound multicast leaves from
    pub interface: Ipv4Addr,
}

impl UdpSockets {
    /// Bind and configure both sockets, non-blocking.
    pub fn bind(config: &NetworkConfig) -> io::Result<Self> {
        let interfaces = multicast_interfaces(config.multicast_interface);
        let multicast = bind_multicast(config.port)?;
        let interface = join_group(&multicast, config.group, &interfaces)?;
        multicast.set_multicast_loop_v4(true)?;

        let unicast = bind_unicast(interface, config.multicast_ttl)?;

        log::debug!(
            "[udp] multicast {}:{} via {}, unicast port {}",
            config.group,
            config.port,
            interface,
            unicast.local_addr()?.port()
        );

        Ok(Self {
            unicast,
            multicast,
            interface,
        })
    }
}

/// Socket on `0.0.0.0:port` shared with other local instances.
fn bind_multicast(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    // SO_REUSEPORT must be set by every process sharing the port, so it is opt-in
    #[cfg(unix)]
    if reuseport_enabled() {
        set_reuseport(&socket)?;
        log::info!("[udp] SO_REUSEPORT enabled via {}=1", ENV_REUSEPORT);
    }

    if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE) {
        log::debug!("[udp] recv buffer size not applied: {}", e);
    }

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&SocketAddr::V4(addr).into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Ephemeral-port socket used for every outbound datagram.
fn bind_unicast(interface: Ipv4Addr, ttl: u32) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    if let Err(e) = socket.set_send_buffer_size(SOCKET_BUFFER_SIZE) {
        log::debug!("[udp] send buffer size not applied: {}", e);
    }
    if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE) {
        log::debug!("[udp] recv buffer size not applied: {}", e);
    }

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&SocketAddr::V4(addr).into())?;

    if !interface.is_unspecified() {
        socket.set_multicast_if_v4(&interface)?;
    }
    socket.set_multicast_loop_v4(true)?;
    socket.set_multicast_ttl_v4(ttl)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn reuseport_enabled() -> bool {
    std::env::var(ENV_REUSEPORT)
        .map(|v| v == "1")
        .unwrap_or(false)
}

#[cfg(unix)]
fn set_reuseport(socket: &Socket) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = socket.as_raw_fd();
    let optval: libc::c_int = 1;
    // SAFETY: setsockopt FFI with valid fd, standard socket option, and correctly sized optval pointer
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEPORT,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
