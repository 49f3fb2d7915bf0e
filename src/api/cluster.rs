use std::sync::Arc;
use std::time::Duration;

use snafu::location;
use tokio::net::UdpSocket;
use tokio::sync::broadcast::{self, Receiver};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::detection::MemberStatus;
use crate::core::event::MembershipEvent;
use crate::core::member::{LocalIdentity, Member};
use crate::core::membership::MembershipDirectory;
use crate::core::node::BoomNode;
use crate::core::transport::bind_multicast;
use crate::error::{Error, Result};
use crate::init_tracing;

use super::config::BoomConfig;

const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A handle to a running node of the cluster.
#[derive(Debug)]
pub struct BoomCluster {
    node: Arc<BoomNode<UdpSocket>>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BoomCluster {
    /// Binds the unicast socket on `identity`'s listen address and tries to join the
    /// multicast group.
    ///
    /// Failing to bind the unicast socket is fatal. Without multicast the node still
    /// works with its known peers. A listen port of `0` is replaced by the port the
    /// socket was actually bound to.
    pub async fn try_new(identity: LocalIdentity, config: BoomConfig) -> Result<Self> {
        let socket = UdpSocket::bind(identity.listen_addr())
            .await
            .map_err(|e| Error::Transport {
                message: format!("failed to bind {}: {e}", identity.listen_addr()),
                location: location!(),
            })?;
        let identity = identity.with_port(socket.local_addr()?.port());

        let multicast = match bind_multicast(config.multicast_group()).await {
            Ok(multicast) => Some(multicast),
            Err(e) => {
                tracing::warn!("[{}] {}", identity.identifier(), e);
                None
            }
        };

        let (tx, _) = broadcast::channel::<MembershipEvent>(config.channel_capacity());
        let node = Arc::new(BoomNode::new(identity, socket, multicast, config, tx));

        Ok(Self {
            node,
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// The identifier of the local node, `name@hostname`.
    pub fn addr(&self) -> &str {
        self.node.addr()
    }

    pub fn identity(&self) -> &LocalIdentity {
        self.node.identity()
    }

    pub fn config(&self) -> &BoomConfig {
        self.node.config()
    }

    pub fn subscribe(&self) -> Receiver<MembershipEvent> {
        self.node.subscribe()
    }

    pub fn membership(&self) -> &MembershipDirectory {
        self.node.membership()
    }

    /// Members currently on the FailList.
    pub fn suspects(&self) -> Vec<Member> {
        self.node.suspects()
    }

    pub async fn status(&self, identifier: &str) -> MemberStatus {
        self.node.status(identifier).await
    }

    /// The token every protocol task observes. Cancelling it stops the node without
    /// notifying its peers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Starts every protocol task. Calling it on a running node has no effect.
    pub async fn run(&self) {
        init_tracing();

        let mut handles = self.handles.lock().await;
        if !handles.is_empty() || self.cancel.is_cancelled() {
            return;
        }

        tracing::info!("[{}] starting BoomNode...", self.node.addr());
        handles.extend(self.node.run(&self.cancel));
    }

    /// Stops all protocol tasks and waits for them to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            match tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("[{}] task failed: {}", self.node.addr(), e),
                Err(_) => tracing::warn!("[{}] task did not stop in time", self.node.addr()),
            }
        }
    }

    /// Leaves the cluster: stops the node, then sends a Goodbye to every known
    /// member. Returns the number of members notified.
    pub async fn leave(&self) -> usize {
        tracing::info!("[{}] leaving the cluster...", self.node.addr());
        self.shutdown().await;
        self.node.notify_members_of_leaving().await
    }
}
