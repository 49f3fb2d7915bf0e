use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::config::{BoomConfig, DEFAULT_BUFFER_SIZE};

use super::codec::{decode, encode, MessageKind};
use super::detection::{FailureDetector, MemberStatus};
use super::event::MembershipEvent;
use super::member::{LocalIdentity, Member};
use super::membership::{MembershipDirectory, Upsert};
use super::transport::{origin_ipv4, TransportLayer};
use super::utils::fan_out;

/// Senders feeding decoded members from the receive loops to the event handler.
#[derive(Clone, Debug)]
pub(crate) struct EventSenders {
    hello: mpsc::Sender<Member>,
    multicast_hello: mpsc::Sender<Member>,
    goodbye: mpsc::Sender<Member>,
    heartbeat_request: mpsc::Sender<Member>,
    heartbeat_response: mpsc::Sender<Member>,
    failure_detected: mpsc::Sender<Member>,
}

impl EventSenders {
    async fn send(&self, kind: MessageKind, member: Member) -> bool {
        let tx = match kind {
            MessageKind::Hello => &self.hello,
            MessageKind::Goodbye => &self.goodbye,
            MessageKind::HeartbeatRequest => &self.heartbeat_request,
            MessageKind::HeartbeatResponse => &self.heartbeat_response,
            MessageKind::MemberFailureDetected => &self.failure_detected,
        };
        tx.send(member).await.is_ok()
    }
}

#[derive(Debug)]
pub(crate) struct EventReceivers {
    hello: mpsc::Receiver<Member>,
    multicast_hello: mpsc::Receiver<Member>,
    goodbye: mpsc::Receiver<Member>,
    heartbeat_request: mpsc::Receiver<Member>,
    heartbeat_response: mpsc::Receiver<Member>,
    failure_detected: mpsc::Receiver<Member>,
}

pub(crate) fn event_channels(capacity: usize) -> (EventSenders, EventReceivers) {
    let (hello_tx, hello_rx) = mpsc::channel(capacity);
    let (multicast_hello_tx, multicast_hello_rx) = mpsc::channel(capacity);
    let (goodbye_tx, goodbye_rx) = mpsc::channel(capacity);
    let (heartbeat_request_tx, heartbeat_request_rx) = mpsc::channel(capacity);
    let (heartbeat_response_tx, heartbeat_response_rx) = mpsc::channel(capacity);
    let (failure_detected_tx, failure_detected_rx) = mpsc::channel(capacity);

    (
        EventSenders {
            hello: hello_tx,
            multicast_hello: multicast_hello_tx,
            goodbye: goodbye_tx,
            heartbeat_request: heartbeat_request_tx,
            heartbeat_response: heartbeat_response_tx,
            failure_detected: failure_detected_tx,
        },
        EventReceivers {
            hello: hello_rx,
            multicast_hello: multicast_hello_rx,
            goodbye: goodbye_rx,
            heartbeat_request: heartbeat_request_rx,
            heartbeat_response: heartbeat_response_rx,
            failure_detected: failure_detected_rx,
        },
    )
}

/// The protocol dispatcher of a single node.
///
/// Owns the sockets, the local logical clock and the shared membership state,
/// and drives every long-running protocol task.
#[derive(Debug)]
pub struct BoomNode<T: TransportLayer> {
    addr: String,
    identity: LocalIdentity,
    config: Arc<BoomConfig>,
    socket: Arc<T>,
    multicast: Option<Arc<T>>,
    clock: AtomicU64,
    membership: Arc<MembershipDirectory>,
    detector: FailureDetector<T>,
    tx: broadcast::Sender<MembershipEvent>,
}

impl<T: TransportLayer> BoomNode<T> {
    pub(crate) fn new(
        identity: LocalIdentity,
        socket: T,
        multicast: Option<T>,
        config: BoomConfig,
        tx: broadcast::Sender<MembershipEvent>,
    ) -> Self {
        let addr = identity.identifier();
        let socket = Arc::new(socket);
        let config = Arc::new(config);
        let membership = Arc::new(MembershipDirectory::new(&addr));
        let detector = FailureDetector::new(
            &addr,
            socket.clone(),
            config.clone(),
            membership.clone(),
            tx.clone(),
        );

        Self {
            addr,
            identity,
            config,
            socket,
            multicast: multicast.map(Arc::new),
            clock: AtomicU64::new(0),
            membership,
            detector,
            tx,
        }
    }

    /// The identifier of this node, `name@hostname`.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn config(&self) -> &BoomConfig {
        &self.config
    }

    pub fn membership(&self) -> &MembershipDirectory {
        &self.membership
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.tx.subscribe()
    }

    pub fn clock(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    pub async fn status(&self, identifier: &str) -> MemberStatus {
        self.detector.status(identifier).await
    }

    /// Members currently suspected to have failed.
    pub fn suspects(&self) -> Vec<Member> {
        self.detector.suspects()
    }

    /// Identifiers of the members probed with heartbeats.
    pub async fn shortlist(&self) -> Vec<String> {
        self.detector
            .shortlist()
            .members()
            .await
            .iter()
            .map(Member::identifier)
            .collect()
    }

    /// The record this node currently advertises about itself.
    pub fn local_member(&self) -> Member {
        self.identity.to_member(self.clock())
    }

    fn is_self(&self, member: &Member) -> bool {
        member.identifier() == self.addr
    }

    /// Spawns every long-running protocol task. All of them exit once `cancel` fires.
    pub(crate) fn run(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let (senders, receivers) = event_channels(self.config.channel_capacity());
        let mut handles = Vec::new();

        let node = self.clone();
        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            node.run_event_handler(receivers, &token).await;
        }));

        let node = self.clone();
        let token = cancel.clone();
        let tx = senders.clone();
        handles.push(tokio::spawn(async move {
            node.run_unicast_listener(&tx, &token).await;
        }));

        if let Some(multicast) = self.multicast.clone() {
            let node = self.clone();
            let token = cancel.clone();
            let tx = senders.clone();
            handles.push(tokio::spawn(async move {
                node.run_multicast_listener(&*multicast, &tx, &token).await;
            }));
        } else {
            tracing::warn!(
                "[{}] not listening for multicast announcements",
                &self.addr
            );
        }

        let node = self.clone();
        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            every("announce", node.config.announce_interval(), &token, || node.announce()).await;
        }));

        let node = self.clone();
        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            every("heartbeat", node.config.heartbeat_interval(), &token, || {
                node.heartbeat_round()
            })
            .await;
        }));

        let node = self.clone();
        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            every("cleanup", node.config.cleanup_interval(), &token, || node.cleanup()).await;
        }));

        handles
    }

    pub(crate) async fn run_unicast_listener(
        &self,
        senders: &EventSenders,
        cancel: &CancellationToken,
    ) {
        tracing::info!(
            "[{}] listening on {} for membership messages",
            &self.addr,
            self.socket.local_addr().unwrap_or_default()
        );

        loop {
            let mut buf = [0u8; DEFAULT_BUFFER_SIZE];

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, origin)) => {
                        if !self.dispatch(&buf[..len], origin, senders).await {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("[{}] error while receiving message: {}", &self.addr, e);
                        break;
                    }
                }
            }
        }

        tracing::info!("[{}] closing unicast listener", &self.addr);
    }

    pub(crate) async fn run_multicast_listener(
        &self,
        socket: &T,
        senders: &EventSenders,
        cancel: &CancellationToken,
    ) {
        tracing::info!(
            "[{}] listening for announcements on {}",
            &self.addr,
            self.config.multicast_group()
        );

        loop {
            let mut buf = [0u8; DEFAULT_BUFFER_SIZE];

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = socket.recv_from(&mut buf) => match result {
                    Ok((len, origin)) => {
                        if !self.dispatch_multicast(&buf[..len], origin, senders).await {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            "[{}] error while receiving announcement: {}",
                            &self.addr,
                            e
                        );
                        break;
                    }
                }
            }
        }

        tracing::info!("[{}] closing multicast listener", &self.addr);
    }

    /// Decodes a unicast datagram and routes it by kind. Returns `false` once the
    /// event handler is gone.
    async fn dispatch(&self, buf: &[u8], origin: SocketAddr, senders: &EventSenders) -> bool {
        match decode(buf, origin_ipv4(&origin)) {
            Ok((member, kind)) => {
                tracing::debug!(
                    "[{}] received {:?} from {} ({})",
                    &self.addr,
                    kind,
                    member.identifier(),
                    origin
                );
                senders.send(kind, member).await
            }
            Err(e) => {
                tracing::warn!("[{}] dropping message from {}: {}", &self.addr, origin, e);
                true
            }
        }
    }

    async fn dispatch_multicast(
        &self,
        buf: &[u8],
        origin: SocketAddr,
        senders: &EventSenders,
    ) -> bool {
        match decode(buf, origin_ipv4(&origin)) {
            Ok((member, MessageKind::Hello)) => senders.multicast_hello.send(member).await.is_ok(),
            Ok((member, kind)) => {
                tracing::warn!(
                    "[{}] dropping {:?} from {} sent to the multicast group",
                    &self.addr,
                    kind,
                    member.identifier()
                );
                true
            }
            Err(e) => {
                tracing::warn!("[{}] dropping announcement from {}: {}", &self.addr, origin, e);
                true
            }
        }
    }

    pub(crate) async fn run_event_handler(
        &self,
        mut receivers: EventReceivers,
        cancel: &CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(member) = receivers.hello.recv() => self.handle_hello(member),
                Some(member) = receivers.multicast_hello.recv() => {
                    self.handle_multicast_hello(member)
                }
                Some(member) = receivers.goodbye.recv() => self.handle_goodbye(member).await,
                Some(member) = receivers.heartbeat_request.recv() => {
                    self.handle_heartbeat_request(member).await
                }
                Some(member) = receivers.heartbeat_response.recv() => {
                    self.handle_heartbeat_response(member)
                }
                Some(member) = receivers.failure_detected.recv() => {
                    self.handle_failure_detected(member).await
                }
                else => break,
            }
        }

        tracing::info!("[{}] closing event handler", &self.addr);
    }

    fn accept(&self, member: Member, source: &str) {
        let identifier = member.identifier();
        let origin = member.origin_address;

        match self.membership.upsert(member) {
            Upsert::Joined => {
                tracing::info!(
                    "[{}] {} from new member {} ({})",
                    &self.addr,
                    source,
                    &identifier,
                    origin
                );
                let _ = self
                    .tx
                    .send(MembershipEvent::new_member_joined(&self.addr, &identifier));
            }
            Upsert::Refreshed { gap } => {
                tracing::debug!(
                    "[{}] {} from known member {}, first message since {:?}",
                    &self.addr,
                    source,
                    &identifier,
                    gap
                );
            }
            Upsert::Ignored => {}
        }
    }

    pub(crate) fn handle_hello(&self, member: Member) {
        self.accept(member, "Hello");
    }

    pub(crate) fn handle_multicast_hello(&self, member: Member) {
        self.accept(member, "multicast Hello");
    }

    pub(crate) async fn handle_goodbye(&self, member: Member) {
        let identifier = member.identifier();
        let known = self.membership.contains(&identifier)
            || self.detector.status(&identifier).await != MemberStatus::Unmonitored;
        if self.is_self(&member) || !known {
            tracing::debug!("[{}] ignoring Goodbye from {}", &self.addr, &identifier);
            return;
        }

        tracing::info!(
            "[{}] Goodbye from {} ({}), removing from membership",
            &self.addr,
            &identifier,
            member.address
        );
        self.membership.remove(&identifier);
        self.detector.forget(&identifier).await;
        let _ = self
            .tx
            .send(MembershipEvent::new_member_left(&self.addr, &identifier));
    }

    pub(crate) async fn handle_heartbeat_request(&self, member: Member) {
        if self.is_self(&member) {
            return;
        }

        self.accept(member.clone(), "HeartbeatRequest");
        self.detector
            .handle_heartbeat_request(member, &self.local_member())
            .await;
    }

    pub(crate) fn handle_heartbeat_response(&self, member: Member) {
        if self.is_self(&member) {
            return;
        }

        if self.detector.handle_heartbeat_response(&member) {
            self.membership.touch(&member.identifier());
        }
    }

    pub(crate) async fn handle_failure_detected(&self, member: Member) {
        if self.is_self(&member) {
            tracing::debug!("[{}] a peer suspects us, ignoring", &self.addr);
            return;
        }

        self.detector
            .handle_failure_detected(member, &self.local_member())
            .await;
    }

    /// Sends the local Hello to the multicast group and every known peer.
    pub(crate) async fn announce(&self) {
        let buf = encode(MessageKind::Hello, &self.local_member());
        let group = SocketAddr::V4(self.config.multicast_group());

        let targets = std::iter::once(group).chain(self.config.known_peers().iter().copied());
        for target in targets {
            if let Err(e) = self.socket.send_to(&buf, target).await {
                tracing::warn!("[{}] failed to announce to {}: {}", &self.addr, target, e);
            }
        }
    }

    /// Advances the logical clock and probes the Shortlist.
    pub(crate) async fn heartbeat_round(&self) {
        let clock = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let local = self.identity.to_member(clock);

        let sent = self.detector.heartbeat_tick(&local).await;
        tracing::debug!(
            "[{}] heartbeat round {} sent {} requests",
            &self.addr,
            clock,
            sent
        );
    }

    /// Evicts members that have been silent for too long and resolves the FailList.
    pub(crate) async fn cleanup(&self) {
        let expired = self
            .membership
            .remove_stale(self.config.member_ttl(), Instant::now());

        for member in expired {
            let identifier = member.identifier();
            tracing::info!(
                "[{}] removing {} because it did not check in recently",
                &self.addr,
                &identifier
            );
            let _ = self
                .tx
                .send(MembershipEvent::new_member_expired(&self.addr, &identifier));
        }

        self.detector.reconcile_fail_list().await;
        self.detector.prune_trackers().await;
    }

    /// Sends a Goodbye to every known member, bounded by the configured leave timeout.
    pub(crate) async fn notify_members_of_leaving(&self) -> usize {
        let members = self.membership.list();
        tracing::info!(
            "[{}] notifying {} members of leaving",
            &self.addr,
            members.len()
        );

        let local = self.local_member();
        let goodbye = fan_out(
            &self.addr,
            &self.socket,
            MessageKind::Goodbye,
            &local,
            members,
        );

        match tokio::time::timeout(self.config.leave_timeout(), goodbye).await {
            Ok(sent) => sent,
            Err(_) => {
                tracing::warn!("[{}] timed out notifying members of leaving", &self.addr);
                0
            }
        }
    }
}

/// Runs `f` on every tick of `period` until `cancel` fires.
async fn every<F, Fut>(name: &str, period: Duration, cancel: &CancellationToken, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => f().await,
        }
    }

    tracing::debug!("{} task has closed", name);
}

#[cfg(test)]
mod tests {
    use std::{net::Ipv4Addr, sync::Arc, time::Duration};

    use tokio::sync::broadcast;
    use tokio_util::sync::CancellationToken;

    use crate::{
        api::config::BoomConfig,
        core::{
            codec::{encode, MessageKind},
            detection::MemberStatus,
            event::MembershipEvent,
            member::{LocalIdentity, Member},
        },
        test_utils::mocks::MockUdpSocket,
    };

    use super::BoomNode;

    fn create_node(config: BoomConfig) -> BoomNode<MockUdpSocket> {
        let identity = LocalIdentity::new("NODE_B", "host", Ipv4Addr::LOCALHOST).with_port(8081);
        let (tx, _) = broadcast::channel(32);
        BoomNode::new(identity, MockUdpSocket::new(), None, config, tx)
    }

    fn create_member(name: &str, port: u16) -> Member {
        Member::new(name, "host", Ipv4Addr::LOCALHOST, port.to_string())
    }

    #[tokio::test]
    async fn test_node_self_suppression() {
        let node = create_node(BoomConfig::new());
        let myself = create_member("NODE_B", 8081);

        node.handle_hello(myself.clone());
        node.handle_multicast_hello(myself.clone());
        node.handle_heartbeat_request(myself.clone()).await;
        node.handle_failure_detected(myself.clone()).await;
        node.handle_goodbye(myself).await;

        assert!(node.membership().is_empty());
        assert!(node.shortlist().await.is_empty());
        assert!(node.suspects().is_empty());
        assert!(node.socket.transmitted().await.is_empty());
    }

    #[tokio::test]
    async fn test_node_hello_twice_only_refreshes() {
        let node = create_node(BoomConfig::new());
        let mut rx = node.subscribe();

        node.handle_hello(create_member("NODE_A", 8080));
        node.handle_multicast_hello(create_member("NODE_A", 8080).with_clock(4));

        assert_eq!(node.membership().len(), 1);
        assert_eq!(node.membership().get("NODE_A@host").unwrap().clock, 4);
        assert!(matches!(rx.try_recv().unwrap(), MembershipEvent::MemberJoined(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_node_goodbye() {
        let node = create_node(BoomConfig::new());
        let mut rx = node.subscribe();
        let node_a = create_member("NODE_A", 8080);
        node.handle_hello(node_a.clone());
        node.heartbeat_round().await;
        assert_eq!(node.shortlist().await, vec!["NODE_A@host".to_string()]);

        node.handle_goodbye(create_member("NODE_UNKNOWN", 9000)).await;
        assert_eq!(node.membership().len(), 1);

        node.handle_goodbye(node_a).await;
        assert!(node.membership().is_empty());
        assert!(node.shortlist().await.is_empty());

        assert!(matches!(rx.try_recv().unwrap(), MembershipEvent::MemberJoined(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            MembershipEvent::MemberLeft(e) if e.member == "NODE_A@host"
        ));
    }

    #[tokio::test]
    async fn test_node_goodbye_churn_leaves_no_trackers() {
        let node = create_node(BoomConfig::new());

        for i in 0..100 {
            let member = create_member(&format!("NODE_{i}"), 9000 + i);
            node.handle_hello(member.clone());
            node.heartbeat_round().await;
            assert!(node.detector.tracker(&member.identifier()).is_some());
            node.handle_goodbye(member).await;
        }

        assert!(node.membership().is_empty());
        assert!(node.shortlist().await.is_empty());
        assert_eq!(node.detector.prune_trackers().await, 0);
        assert!(node.detector.tracker("NODE_99@host").is_none());
    }

    #[tokio::test]
    async fn test_node_goodbye_from_suspected_member() {
        let node = create_node(BoomConfig::new());
        let mut rx = node.subscribe();
        let node_a = create_member("NODE_A", 8080);
        node.handle_hello(node_a.clone());

        for _ in 0..6 {
            node.heartbeat_round().await;
        }
        assert_eq!(node.status("NODE_A@host").await, MemberStatus::Suspected);
        assert!(!node.membership().contains("NODE_A@host"));

        node.handle_goodbye(node_a).await;
        node.cleanup().await;

        assert!(node.suspects().is_empty());
        assert!(node.shortlist().await.is_empty());
        assert_eq!(node.status("NODE_A@host").await, MemberStatus::Unmonitored);

        let events: Vec<MembershipEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.iter().any(|e| matches!(
            e,
            MembershipEvent::MemberLeft(c) if c.member == "NODE_A@host"
        )));
        assert!(!events
            .iter()
            .any(|e| matches!(e, MembershipEvent::MemberFailed(_))));
    }

    #[tokio::test]
    async fn test_node_heartbeat_request_is_answered() {
        let node = create_node(BoomConfig::new());

        node.handle_heartbeat_request(create_member("NODE_A", 8080).with_clock(3))
            .await;

        assert!(node.membership().contains("NODE_A@host"));
        assert_eq!(node.shortlist().await, vec!["NODE_A@host".to_string()]);

        let responses = node
            .socket
            .transmitted_of(MessageKind::HeartbeatResponse)
            .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].0.identifier(), "NODE_B@host");
        assert_eq!(responses[0].1.port(), 8080);
    }

    #[tokio::test]
    async fn test_node_heartbeat_round_advances_clock() {
        let node = create_node(BoomConfig::new());
        node.handle_hello(create_member("NODE_A", 8080));

        node.heartbeat_round().await;
        node.heartbeat_round().await;

        assert_eq!(node.clock(), 2);
        let requests = node.socket.transmitted_of(MessageKind::HeartbeatRequest).await;
        let clocks: Vec<u64> = requests.iter().map(|(m, _)| m.clock).collect();
        assert_eq!(clocks, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_node_cleanup_evicts_stale_members() {
        let config = BoomConfig::builder()
            .with_member_ttl(Duration::from_millis(20))
            .build();
        let node = create_node(config);
        let mut rx = node.subscribe();
        node.handle_hello(create_member("NODE_A", 8080));

        node.cleanup().await;
        assert_eq!(node.membership().len(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        node.handle_hello(create_member("NODE_C", 8082));
        node.cleanup().await;

        let members = node.membership().list();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].identifier(), "NODE_C@host");

        let events: Vec<MembershipEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.iter().any(|e| matches!(
            e,
            MembershipEvent::MemberExpired(c) if c.member == "NODE_A@host"
        )));
    }

    #[tokio::test]
    async fn test_node_failure_scenario() {
        let node = create_node(BoomConfig::new());
        let node_a = create_member("NODE_A", 8080);
        let node_c = create_member("NODE_C", 8082);

        node.handle_multicast_hello(node_a.clone());
        assert!(node.membership().get("NODE_A@host").unwrap().last_seen.is_some());
        assert_eq!(node.status("NODE_A@host").await, MemberStatus::Unmonitored);
        assert!(node
            .socket
            .transmitted_of(MessageKind::HeartbeatRequest)
            .await
            .is_empty());

        node.handle_hello(node_c.clone());

        for _ in 0..5 {
            node.heartbeat_round().await;
            node.handle_heartbeat_response(node_c.clone());
        }
        assert_eq!(node.status("NODE_A@host").await, MemberStatus::Probing);
        assert!(node
            .socket
            .transmitted_of(MessageKind::MemberFailureDetected)
            .await
            .is_empty());

        node.heartbeat_round().await;

        let failures = node
            .socket
            .transmitted_of(MessageKind::MemberFailureDetected)
            .await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.identifier(), "NODE_A@host");
        assert_eq!(failures[0].1.port(), 8082);
        assert_eq!(node.status("NODE_A@host").await, MemberStatus::Suspected);
        let suspects = node.suspects();
        assert_eq!(suspects.len(), 1);
        assert_eq!(suspects[0].identifier(), "NODE_A@host");

        node.cleanup().await;
        assert!(node.suspects().is_empty());
        assert!(!node.membership().contains("NODE_A@host"));
        assert_eq!(node.status("NODE_A@host").await, MemberStatus::Unmonitored);
        assert!(node.membership().contains("NODE_C@host"));
    }

    #[tokio::test]
    async fn test_node_notify_members_of_leaving() {
        let node = create_node(BoomConfig::new());
        let node_a = create_member("NODE_A", 8080);
        let node_c = create_member("NODE_C", 8082);
        node.socket.set_unreachable(node_a.socket_addr().unwrap()).await;
        node.handle_hello(node_a);
        node.handle_hello(node_c);

        let sent = node.notify_members_of_leaving().await;

        assert_eq!(sent, 1);
        let goodbyes = node.socket.transmitted_of(MessageKind::Goodbye).await;
        assert_eq!(goodbyes.len(), 1);
        assert_eq!(goodbyes[0].0.identifier(), "NODE_B@host");
        assert_eq!(goodbyes[0].1.port(), 8082);
    }

    #[tokio::test]
    async fn test_node_announce() {
        let config = BoomConfig::builder()
            .with_known_peers(["127.0.0.1:9000".parse::<std::net::SocketAddr>().unwrap()])
            .build();
        let node = create_node(config);

        node.announce().await;

        let hellos = node.socket.transmitted_of(MessageKind::Hello).await;
        let targets: Vec<String> = hellos.iter().map(|(_, t)| t.to_string()).collect();
        assert_eq!(targets, vec!["230.0.0.0:7791", "127.0.0.1:9000"]);
    }

    #[tokio::test]
    async fn test_node_run_dispatches_and_stops() {
        let multicast = MockUdpSocket::new();
        let config = BoomConfig::builder()
            .with_announce_interval(Duration::from_secs(60))
            .with_heartbeat_interval(Duration::from_secs(60))
            .with_cleanup_interval(Duration::from_secs(60))
            .build();
        let identity = LocalIdentity::new("NODE_B", "host", Ipv4Addr::LOCALHOST).with_port(8081);
        let (tx, _) = broadcast::channel(32);
        let node = Arc::new(BoomNode::new(
            identity,
            MockUdpSocket::new(),
            Some(multicast.clone()),
            config,
            tx,
        ));
        let mut rx = node.subscribe();
        let cancel = CancellationToken::new();
        let handles = node.run(&cancel);

        let origin = "127.0.0.1:8080".parse().unwrap();
        node.socket.push_inbound(vec![0x7f; 3], origin);
        node.socket
            .push_inbound(encode(MessageKind::Hello, &create_member("NODE_A", 8080)), origin);
        multicast.push_inbound(
            encode(MessageKind::Goodbye, &create_member("NODE_C", 8082)),
            origin,
        );
        multicast.push_inbound(
            encode(MessageKind::Hello, &create_member("NODE_D", 8083)),
            origin,
        );

        let mut joined = Vec::new();
        while joined.len() < 2 {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if let MembershipEvent::MemberJoined(e) = event {
                joined.push(e.member);
            }
        }
        joined.sort();
        assert_eq!(joined, vec!["NODE_A@host", "NODE_D@host"]);
        assert_eq!(
            node.membership()
                .get("NODE_A@host")
                .unwrap()
                .origin_address,
            Ipv4Addr::LOCALHOST
        );

        cancel.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
