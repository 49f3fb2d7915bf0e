//! # Wire Codec
//!
//! Every membership message is a single prefix byte followed by a fixed-width
//! field layout. All kinds share the same layout:
//!
//! | field    | width | encoding                        |
//! |----------|-------|---------------------------------|
//! | prefix   | 1     | [`MessageKind`]                 |
//! | name     | 12    | zero-padded, truncated          |
//! | hostname | 12    | zero-padded, truncated          |
//! | address  | 4     | raw IPv4 octets                 |
//! | port     | 6     | ASCII decimal, zero-padded      |
//! | clock    | 8     | `u64` little-endian             |
//!
//! String fields longer than their width are silently truncated.
use std::net::Ipv4Addr;

use snafu::location;

use crate::error::{Error, Result};

use super::member::Member;

const PREFIX_SIZE: usize = 1;
const NAME_SIZE: usize = 12;
const HOSTNAME_SIZE: usize = 12;
const ADDRESS_SIZE: usize = 4;
const PORT_SIZE: usize = 6;
const CLOCK_SIZE: usize = 8;

/// The kind of a membership message, identified by its one byte prefix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    Goodbye,
    HeartbeatRequest,
    HeartbeatResponse,
    MemberFailureDetected,
}

impl MessageKind {
    pub const fn prefix(&self) -> u8 {
        match self {
            MessageKind::Hello => 0x01,
            MessageKind::Goodbye => 0x02,
            MessageKind::HeartbeatRequest => 0x10,
            MessageKind::HeartbeatResponse => 0x11,
            MessageKind::MemberFailureDetected => 0x20,
        }
    }

    pub(crate) fn layout(&self) -> &'static [FieldCodec] {
        &MEMBER_LAYOUT
    }

    /// The exact size of an encoded message of this kind.
    pub fn header_size(&self) -> usize {
        PREFIX_SIZE + self.layout().iter().map(|f| f.width).sum::<usize>()
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = Error;

    fn try_from(prefix: u8) -> Result<Self> {
        match prefix {
            0x01 => Ok(MessageKind::Hello),
            0x02 => Ok(MessageKind::Goodbye),
            0x10 => Ok(MessageKind::HeartbeatRequest),
            0x11 => Ok(MessageKind::HeartbeatResponse),
            0x20 => Ok(MessageKind::MemberFailureDetected),
            prefix => Err(Error::UnknownMessageKind {
                prefix,
                location: location!(),
            }),
        }
    }
}

/// A fixed-width field with its encode and decode functions.
pub(crate) struct FieldCodec {
    width: usize,
    encode: fn(&Member, &mut [u8]),
    decode: fn(&[u8], &mut Member),
}

const MEMBER_LAYOUT: [FieldCodec; 5] = [
    FieldCodec {
        width: NAME_SIZE,
        encode: |m, buf| put_str(&m.name, buf),
        decode: |buf, m| m.name = get_str(buf),
    },
    FieldCodec {
        width: HOSTNAME_SIZE,
        encode: |m, buf| put_str(&m.hostname, buf),
        decode: |buf, m| m.hostname = get_str(buf),
    },
    FieldCodec {
        width: ADDRESS_SIZE,
        encode: |m, buf| buf.copy_from_slice(&m.address.octets()),
        decode: |buf, m| m.address = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]),
    },
    FieldCodec {
        width: PORT_SIZE,
        encode: |m, buf| put_str(&m.port, buf),
        decode: |buf, m| m.port = get_str(buf),
    },
    FieldCodec {
        width: CLOCK_SIZE,
        encode: |m, buf| buf.copy_from_slice(&m.clock.to_le_bytes()),
        decode: |buf, m| {
            let mut bytes = [0u8; CLOCK_SIZE];
            bytes.copy_from_slice(buf);
            m.clock = u64::from_le_bytes(bytes);
        },
    },
];

fn put_str(value: &str, buf: &mut [u8]) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(buf.len());
    buf[..len].copy_from_slice(&bytes[..len]);
}

fn get_str(buf: &[u8]) -> String {
    let end = buf.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Encodes `member` as a message of the given `kind`.
pub fn encode(kind: MessageKind, member: &Member) -> Vec<u8> {
    let mut buf = vec![0u8; kind.header_size()];
    buf[0] = kind.prefix();

    let mut cursor = PREFIX_SIZE;
    for field in kind.layout() {
        (field.encode)(member, &mut buf[cursor..cursor + field.width]);
        cursor += field.width;
    }

    buf
}

/// Decodes a message received from `origin`.
///
/// The returned member carries `origin` as its origin address, separate from
/// the address embedded in the payload.
pub fn decode(buf: &[u8], origin: Ipv4Addr) -> Result<(Member, MessageKind)> {
    let prefix = *buf.first().ok_or_else(|| Error::TruncatedMessage {
        expected: PREFIX_SIZE,
        actual: 0,
        location: location!(),
    })?;
    let kind = MessageKind::try_from(prefix)?;

    let expected = kind.header_size();
    if buf.len() < expected {
        return Err(Error::TruncatedMessage {
            expected,
            actual: buf.len(),
            location: location!(),
        });
    }

    let mut member = Member::new("", "", Ipv4Addr::UNSPECIFIED, "");
    member.origin_address = origin;

    let mut cursor = PREFIX_SIZE;
    for field in kind.layout() {
        (field.decode)(&buf[cursor..cursor + field.width], &mut member);
        cursor += field.width;
    }

    Ok((member, kind))
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::{core::member::Member, error::Error};

    use super::{decode, encode, MessageKind};

    const KINDS: [MessageKind; 5] = [
        MessageKind::Hello,
        MessageKind::Goodbye,
        MessageKind::HeartbeatRequest,
        MessageKind::HeartbeatResponse,
        MessageKind::MemberFailureDetected,
    ];

    fn create_member() -> Member {
        Member::new("MySelf", "localhost", Ipv4Addr::new(127, 0, 0, 1), "37160").with_clock(7)
    }

    #[test]
    fn test_codec_header_size() {
        for kind in KINDS {
            assert_eq!(kind.header_size(), 43);
            assert_eq!(encode(kind, &create_member()).len(), 43);
        }
    }

    #[test]
    fn test_codec_encode_layout() {
        let member = Member::new("Test", "Boreas", Ipv4Addr::new(255, 255, 255, 254), "7777")
            .with_clock(0x0102);
        let buf = encode(MessageKind::HeartbeatResponse, &member);

        assert_eq!(buf[0], 0x11);
        assert_eq!(&buf[1..5], b"Test");
        assert!(buf[5..13].iter().all(|b| *b == 0));
        assert_eq!(&buf[13..19], b"Boreas");
        assert_eq!(&buf[25..29], &[255, 255, 255, 254]);
        assert_eq!(&buf[29..33], b"7777");
        assert_eq!(&buf[35..43], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_codec_decode_keeps_origin_separate() {
        let member = create_member();
        let origin = Ipv4Addr::new(192, 168, 1, 20);

        for kind in KINDS {
            let (decoded, decoded_kind) = decode(&encode(kind, &member), origin).unwrap();

            assert_eq!(decoded_kind, kind);
            assert_eq!(decoded.origin_address, origin);
            assert_eq!(decoded.address, member.address);
            assert_eq!(
                Member {
                    origin_address: member.origin_address,
                    ..decoded
                },
                member
            );
        }
    }

    #[test]
    fn test_codec_truncates_long_names() {
        let member = Member::new(
            "a-very-long-member-name",
            "hostname.example.org",
            Ipv4Addr::LOCALHOST,
            "12345678",
        );
        let buf = encode(MessageKind::Hello, &member);
        assert_eq!(buf.len(), 43);

        let (decoded, _) = decode(&buf, Ipv4Addr::LOCALHOST).unwrap();
        assert_eq!(decoded.name, "a-very-long-");
        assert_eq!(decoded.hostname, "hostname.exa");
        assert_eq!(decoded.port, "123456");
    }

    #[test]
    fn test_codec_decode_unknown_kind() {
        let mut buf = encode(MessageKind::Hello, &create_member());
        buf[0] = 0x42;

        let result = decode(&buf, Ipv4Addr::LOCALHOST);
        assert!(matches!(
            result,
            Err(Error::UnknownMessageKind { prefix: 0x42, .. })
        ));
    }

    #[test]
    fn test_codec_decode_truncated() {
        let buf = encode(MessageKind::Goodbye, &create_member());

        let result = decode(&buf[..20], Ipv4Addr::LOCALHOST);
        assert!(matches!(
            result,
            Err(Error::TruncatedMessage {
                expected: 43,
                actual: 20,
                ..
            })
        ));

        let result = decode(&[], Ipv4Addr::LOCALHOST);
        assert!(matches!(result, Err(Error::TruncatedMessage { .. })));
    }

    #[test]
    fn test_codec_decode_ignores_trailing_bytes() {
        let mut buf = encode(MessageKind::Hello, &create_member());
        buf.extend_from_slice(&[0xff; 8]);

        let (decoded, kind) = decode(&buf, Ipv4Addr::LOCALHOST).unwrap();
        assert_eq!(kind, MessageKind::Hello);
        assert_eq!(decoded.clock, 7);
    }
}
