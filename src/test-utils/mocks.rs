use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use snafu::location;
use tokio::sync::{mpsc, Mutex};

use crate::core::codec::{decode, MessageKind};
use crate::core::member::Member;
use crate::core::transport::TransportLayer;
use crate::error::{Error, Result};

type Datagram = (Vec<u8>, SocketAddr);

/// A transport that records every transmitted datagram and replays queued inbound ones.
#[derive(Clone, Debug)]
pub(crate) struct MockUdpSocket {
    transmitted: Arc<Mutex<Vec<Datagram>>>,
    unreachable: Arc<Mutex<HashSet<SocketAddr>>>,
    inbound_tx: mpsc::UnboundedSender<Datagram>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<Datagram>>>,
}

impl MockUdpSocket {
    pub(crate) fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Self {
            transmitted: Arc::new(Mutex::new(Vec::new())),
            unreachable: Arc::new(Mutex::new(HashSet::new())),
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
        }
    }

    /// Raw datagrams sent so far, with their targets.
    pub(crate) async fn transmitted(&self) -> Vec<Datagram> {
        let tx = self.transmitted.lock().await;
        (*tx).clone()
    }

    /// Decoded messages sent so far, with their targets.
    pub(crate) async fn transmitted_messages(&self) -> Vec<(MessageKind, Member, SocketAddr)> {
        self.transmitted()
            .await
            .into_iter()
            .filter_map(|(buf, target)| {
                decode(&buf, Ipv4Addr::UNSPECIFIED)
                    .ok()
                    .map(|(member, kind)| (kind, member, target))
            })
            .collect()
    }

    /// Decoded messages of `kind` sent so far, with their targets.
    pub(crate) async fn transmitted_of(&self, kind: MessageKind) -> Vec<(Member, SocketAddr)> {
        self.transmitted_messages()
            .await
            .into_iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, member, target)| (member, target))
            .collect()
    }

    /// Makes every send to `target` fail.
    pub(crate) async fn set_unreachable(&self, target: SocketAddr) {
        self.unreachable.lock().await.insert(target);
    }

    /// Queues a datagram to be returned by the next `recv_from`.
    pub(crate) fn push_inbound(&self, buf: Vec<u8>, from: SocketAddr) {
        let _ = self.inbound_tx.send((buf, from));
    }
}

#[async_trait]
impl TransportLayer for MockUdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let mut rx = self.inbound_rx.lock().await;
        let (datagram, from) = rx.recv().await.ok_or_else(|| Error::Internal {
            message: "inbound queue closed".to_string(),
            location: location!(),
        })?;

        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);

        Ok((len, from))
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        if self.unreachable.lock().await.contains(&target) {
            return Err(Error::Io {
                message: format!("{target} is unreachable"),
                location: location!(),
            });
        }

        let mut tx = self.transmitted.lock().await;
        tx.push((buf.to_vec(), target));

        Ok(buf.len())
    }

    fn local_addr(&self) -> Result<String> {
        Ok("MockUdpSocket".to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use crate::{
        core::{
            codec::{encode, MessageKind},
            member::Member,
            transport::TransportLayer,
        },
        test_utils::mocks::MockUdpSocket,
    };

    fn create_member() -> Member {
        Member::new("NODE_A", "host", Ipv4Addr::LOCALHOST, "7777")
    }

    #[tokio::test]
    async fn test_mock_udp_socket_send_to() {
        let socket = MockUdpSocket::new();
        let target: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let buf = encode(MessageKind::Hello, &create_member());

        socket.send_to(&buf, target).await.unwrap();

        let result = socket.transmitted_of(MessageKind::Hello).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0.identifier(), "NODE_A@host");
        assert_eq!(result[0].1, target);
    }

    #[tokio::test]
    async fn test_mock_udp_socket_unreachable() {
        let socket = MockUdpSocket::new();
        let target: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        socket.set_unreachable(target).await;

        assert!(socket.send_to(b"data", target).await.is_err());
        assert!(socket.transmitted().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_udp_socket_recv_from() {
        let socket = MockUdpSocket::new();
        let from: SocketAddr = "127.0.0.1:8082".parse().unwrap();
        socket.push_inbound(b"datagram".to_vec(), from);

        let mut buf = [0u8; 64];
        let (len, origin) = socket.recv_from(&mut buf).await.unwrap();

        assert_eq!(&buf[..len], b"datagram");
        assert_eq!(origin, from);
    }
}
