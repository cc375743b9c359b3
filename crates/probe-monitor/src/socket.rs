//! Multicast UDP socket setup (spec §4.G init), grounded in the
//! `socket2`-based receivers in the retrieval pack's MPEG-TS/multicast
//! tooling: bind, set a floor on the receive buffer, join the group,
//! hand the fd to tokio.

use std::net::{Ipv4Addr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::{MonitorError, Result};

/// Bind `:port`, set `SO_RCVBUF` to at least `min_rcvbuf`, join
/// `multicast_group`, and hand the socket to tokio in non-blocking mode.
pub fn bind_multicast(
    multicast_group: Ipv4Addr,
    port: u16,
    min_rcvbuf: usize,
) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(MonitorError::SocketBind)?;
    socket.set_reuse_address(true).map_err(MonitorError::SocketBind)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&bind_addr.into()).map_err(MonitorError::SocketBind)?;

    if let Ok(current) = socket.recv_buffer_size()
        && current < min_rcvbuf
    {
        // Best-effort: some environments cap this below the request; the
        // socket remains usable either way (spec §4.G init just says
        // "set RCVBUF >= 4 MiB", not that it must succeed).
        let _ = socket.set_recv_buffer_size(min_rcvbuf);
    }

    socket
        .join_multicast_v4(&multicast_group, &Ipv4Addr::UNSPECIFIED)
        .map_err(MonitorError::MulticastJoin)?;

    socket.set_nonblocking(true).map_err(MonitorError::SocketBind)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(MonitorError::SocketBind)
}
