use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Default multicast group used for discovery announcements.
pub const DEFAULT_MULTICAST_GROUP: SocketAddrV4 =
    SocketAddrV4::new(Ipv4Addr::new(230, 0, 0, 0), 7791);

/// Default interval between each Hello announced to the multicast group.
const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval between heartbeat rounds.
/// Each round sends a HeartbeatRequest to every Shortlist member and advances the logical clock.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Default interval between cleanup sweeps of the directory and the FailList.
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

/// Default time after which a silent member is removed from the directory.
const DEFAULT_MEMBER_TTL: Duration = Duration::from_secs(40);

/// Default capacity of the Shortlist.
const DEFAULT_MAX_SHORTLIST_SIZE: usize = 5;

/// Default number of unanswered heartbeat requests before a member is suspected.
const DEFAULT_MISSED_HEARTBEAT_THRESHOLD: u32 = 5;

/// Default upper bound on the goodbye fan-out when leaving.
const DEFAULT_LEAVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default capacity of each internal event channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Lower bound for every periodic task interval.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// The buffer size for receiving new messages. Defaults to 1024 bytes.
pub(crate) const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Who receives a MemberFailureDetected message when a member is suspected.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FailurePropagation {
    /// Every other member of the Shortlist.
    #[default]
    Shortlist,
    /// Every other member of the directory.
    Directory,
}

/// Builder for creating a [`BoomConfig`] with customized settings for a membership node.
#[derive(Clone, Debug)]
pub struct BoomConfigBuilder {
    /// The multicast group Hello announcements are sent to and received from.
    multicast_group: SocketAddrV4,
    /// Addresses that additionally receive every announcement via unicast.
    known_peers: Vec<SocketAddr>,
    /// The duration between consecutive multicast announcements.
    announce_interval: Duration,
    /// The duration between consecutive heartbeat rounds.
    heartbeat_interval: Duration,
    /// The duration between consecutive cleanup sweeps.
    cleanup_interval: Duration,
    /// How long a member may stay silent before it is removed.
    member_ttl: Duration,
    /// The maximum number of members probed with heartbeats.
    max_shortlist_size: usize,
    /// Unanswered heartbeat requests tolerated before a member is suspected.
    missed_heartbeat_threshold: u32,
    /// Who is told about a suspected member.
    failure_propagation: FailurePropagation,
    /// The maximum duration spent notifying members when leaving.
    leave_timeout: Duration,
    /// The capacity of each internal event channel.
    channel_capacity: usize,
}

impl BoomConfigBuilder {
    /// Creates a new [`BoomConfigBuilder`] with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the builder and returns a fully constructed [`BoomConfig`].
    pub fn build(self) -> BoomConfig {
        BoomConfig {
            multicast_group: self.multicast_group,
            known_peers: self.known_peers,
            announce_interval: self.announce_interval.max(MIN_INTERVAL),
            heartbeat_interval: self.heartbeat_interval.max(MIN_INTERVAL),
            cleanup_interval: self.cleanup_interval.max(MIN_INTERVAL),
            member_ttl: self.member_ttl,
            max_shortlist_size: self.max_shortlist_size,
            missed_heartbeat_threshold: self.missed_heartbeat_threshold,
            failure_propagation: self.failure_propagation,
            leave_timeout: self.leave_timeout,
            channel_capacity: self.channel_capacity.max(1),
        }
    }

    /// Sets the multicast group used for discovery.
    pub fn with_multicast_group(mut self, multicast_group: SocketAddrV4) -> Self {
        self.multicast_group = multicast_group;
        self
    }

    /// Sets the peers that receive every announcement via unicast.
    pub fn with_known_peers<T>(mut self, known_peers: T) -> Self
    where
        T: IntoIterator,
        T::Item: Into<SocketAddr>,
    {
        self.known_peers = known_peers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the interval between each multicast announcement.
    pub fn with_announce_interval(mut self, announce_interval: Duration) -> Self {
        self.announce_interval = announce_interval;
        self
    }

    /// Sets the interval between heartbeat rounds.
    pub fn with_heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    /// Sets the interval between cleanup sweeps.
    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }

    /// Sets how long a member may stay silent before it is removed.
    pub fn with_member_ttl(mut self, member_ttl: Duration) -> Self {
        self.member_ttl = member_ttl;
        self
    }

    /// Sets the capacity of the Shortlist.
    pub fn with_max_shortlist_size(mut self, max_shortlist_size: usize) -> Self {
        self.max_shortlist_size = max_shortlist_size;
        self
    }

    /// Sets the number of unanswered heartbeat requests before a member is suspected.
    pub fn with_missed_heartbeat_threshold(mut self, missed_heartbeat_threshold: u32) -> Self {
        self.missed_heartbeat_threshold = missed_heartbeat_threshold;
        self
    }

    /// Sets who is told about a suspected member.
    pub fn with_failure_propagation(mut self, failure_propagation: FailurePropagation) -> Self {
        self.failure_propagation = failure_propagation;
        self
    }

    /// Sets the upper bound on notifying members when leaving.
    pub fn with_leave_timeout(mut self, leave_timeout: Duration) -> Self {
        self.leave_timeout = leave_timeout;
        self
    }

    /// Sets the capacity of each internal event channel.
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }
}

impl Default for BoomConfigBuilder {
    fn default() -> Self {
        Self {
            multicast_group: DEFAULT_MULTICAST_GROUP,
            known_peers: vec![],
            announce_interval: DEFAULT_ANNOUNCE_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            member_ttl: DEFAULT_MEMBER_TTL,
            max_shortlist_size: DEFAULT_MAX_SHORTLIST_SIZE,
            missed_heartbeat_threshold: DEFAULT_MISSED_HEARTBEAT_THRESHOLD,
            failure_propagation: FailurePropagation::default(),
            leave_timeout: DEFAULT_LEAVE_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Configuration for a membership node: intervals, thresholds and discovery settings.
#[derive(Clone, Debug)]
pub struct BoomConfig {
    multicast_group: SocketAddrV4,
    known_peers: Vec<SocketAddr>,
    announce_interval: Duration,
    heartbeat_interval: Duration,
    cleanup_interval: Duration,
    member_ttl: Duration,
    max_shortlist_size: usize,
    missed_heartbeat_threshold: u32,
    failure_propagation: FailurePropagation,
    leave_timeout: Duration,
    channel_capacity: usize,
}

impl BoomConfig {
    /// Creates a new [`BoomConfig`] with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new [`BoomConfigBuilder`] to construct a [`BoomConfig`].
    pub fn builder() -> BoomConfigBuilder {
        BoomConfigBuilder::new()
    }

    pub fn multicast_group(&self) -> SocketAddrV4 {
        self.multicast_group
    }

    pub fn known_peers(&self) -> &[SocketAddr] {
        &self.known_peers
    }

    pub fn announce_interval(&self) -> Duration {
        self.announce_interval
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    pub fn member_ttl(&self) -> Duration {
        self.member_ttl
    }

    pub fn max_shortlist_size(&self) -> usize {
        self.max_shortlist_size
    }

    pub fn missed_heartbeat_threshold(&self) -> u32 {
        self.missed_heartbeat_threshold
    }

    pub fn failure_propagation(&self) -> FailurePropagation {
        self.failure_propagation
    }

    pub fn leave_timeout(&self) -> Duration {
        self.leave_timeout
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }
}

impl Default for BoomConfig {
    fn default() -> Self {
        BoomConfigBuilder::new().build()
    }
}
