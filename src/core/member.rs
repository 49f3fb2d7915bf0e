use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use tokio::time::Instant;

use crate::error::Result;

/// Default port the unicast membership server listens on.
pub const DEFAULT_LISTEN_PORT: u16 = 7777;

/// A peer's self-reported identity and address, as carried by every membership message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    /// Member name, at most 12 bytes on the wire.
    pub name: String,
    /// Hostname of the member, at most 12 bytes on the wire.
    pub hostname: String,
    /// The address the datagram was physically received from. Never used for routing.
    pub origin_address: Ipv4Addr,
    /// The address the member claims to listen on.
    pub address: Ipv4Addr,
    /// The port the member claims to listen on, string encoded.
    pub port: String,
    /// The member's logical clock at the time it sent the message.
    pub clock: u64,
    /// Set whenever a message from this member is accepted into the directory.
    pub last_seen: Option<Instant>,
}

impl Member {
    pub fn new(
        name: impl Into<String>,
        hostname: impl Into<String>,
        address: Ipv4Addr,
        port: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            origin_address: Ipv4Addr::UNSPECIFIED,
            address,
            port: port.into(),
            clock: 0,
            last_seen: None,
        }
    }

    /// Sets the logical clock carried by this record.
    pub fn with_clock(mut self, clock: u64) -> Self {
        self.clock = clock;
        self
    }

    /// The unique key of a member: `name@hostname`.
    pub fn identifier(&self) -> String {
        format!("{}@{}", self.name, self.hostname)
    }

    /// Resolves the self-reported `address:port` this member should be messaged on.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let port = self.port.parse::<u16>()?;
        Ok(SocketAddr::V4(SocketAddrV4::new(self.address, port)))
    }
}

/// The identity of the local node, supplied once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalIdentity {
    pub name: String,
    pub hostname: String,
    pub self_address: Ipv4Addr,
    pub listen_port: u16,
}

impl LocalIdentity {
    pub fn new(
        name: impl Into<String>,
        hostname: impl Into<String>,
        self_address: Ipv4Addr,
    ) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            self_address,
            listen_port: DEFAULT_LISTEN_PORT,
        }
    }

    pub fn with_port(mut self, listen_port: u16) -> Self {
        self.listen_port = listen_port;
        self
    }

    pub fn identifier(&self) -> String {
        format!("{}@{}", self.name, self.hostname)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.self_address, self.listen_port))
    }

    /// Builds the record this node advertises about itself, stamped with `clock`.
    pub fn to_member(&self, clock: u64) -> Member {
        Member::new(
            &self.name,
            &self.hostname,
            self.self_address,
            self.listen_port.to_string(),
        )
        .with_clock(clock)
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use super::{LocalIdentity, Member, DEFAULT_LISTEN_PORT};

    #[test]
    fn test_member_identifier() {
        let member = Member::new("MySelf", "localhost", Ipv4Addr::LOCALHOST, "7777");
        assert_eq!(member.identifier(), "MySelf@localhost");
    }

    #[test]
    fn test_member_socket_addr() {
        let member = Member::new("node", "host", Ipv4Addr::new(10, 0, 0, 3), "37160");
        let expected: SocketAddr = "10.0.0.3:37160".parse().unwrap();
        assert_eq!(member.socket_addr().unwrap(), expected);

        let member = Member::new("node", "host", Ipv4Addr::new(10, 0, 0, 3), "port");
        assert!(member.socket_addr().is_err());
    }

    #[test]
    fn test_local_identity_to_member() {
        let identity = LocalIdentity::new("MySelf", "localhost", Ipv4Addr::LOCALHOST);
        assert_eq!(identity.listen_port, DEFAULT_LISTEN_PORT);

        let member = identity.with_port(9000).to_member(42);
        assert_eq!(member.identifier(), "MySelf@localhost");
        assert_eq!(member.port, "9000");
        assert_eq!(member.clock, 42);
        assert_eq!(member.address, Ipv4Addr::LOCALHOST);
    }
}
