//! # Transport Layer Module
//!
//! This module defines the `TransportLayer` trait, which abstracts the UDP transport
//! used by the membership protocol, and the helper that joins the multicast group
//! used for discovery announcements.
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::{Error, Result};

/// The `TransportLayer` trait abstracts the network transport layer.
#[async_trait]
pub trait TransportLayer: Send + Sync + 'static {
    /// Receives a datagram into the provided buffer, returning its length and sender.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// Sends data to the specified target address.
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize>;

    /// Retrieves the local address that the socket is bound to.
    fn local_addr(&self) -> Result<String>;
}

#[async_trait]
impl TransportLayer for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.recv_from(buf).await?)
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        Ok(self.send_to(buf, target).await?)
    }

    fn local_addr(&self) -> Result<String> {
        let addr = self.local_addr()?;
        Ok(addr.to_string())
    }
}

/// Binds a socket on the group's port and joins the multicast `group` on all interfaces.
///
/// The port is bound with address and port reuse so every node on a host can
/// listen to the same group.
pub async fn bind_multicast(group: SocketAddrV4) -> Result<UdpSocket> {
    let socket = bind_reusable(group.port()).map_err(|e| Error::Transport {
        message: format!("failed to bind multicast port {}: {e}", group.port()),
        location: snafu::location!(),
    })?;

    socket
        .join_multicast_v4(*group.ip(), Ipv4Addr::UNSPECIFIED)
        .map_err(|e| Error::Transport {
            message: format!("failed to join multicast group {group}: {e}"),
            location: snafu::location!(),
        })?;

    Ok(socket)
}

fn bind_reusable(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).into())?;

    UdpSocket::from_std(socket.into())
}

/// The IPv4 address of a datagram sender; IPv6 senders map to `0.0.0.0` unless v4-mapped.
pub(crate) fn origin_ipv4(addr: &SocketAddr) -> Ipv4Addr {
    match addr {
        SocketAddr::V4(addr) => *addr.ip(),
        SocketAddr::V6(addr) => addr.ip().to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
    }
}
