//! Non-blocking PROXY protocol v2 decoder.
//!
//! # Responsibilities
//! - Recognize the v2 signature at the start of a stream
//! - Extract the relayed source/destination endpoints
//! - Consume exactly the header envelope, or nothing
//!
//! # Design Decisions
//! - Pure function over a buffer; the caller owns all I/O
//! - Every malformed or unsupported header is a benign outcome, never an error
//! - The whole envelope (fixed header + declared block) must be buffered
//!   before a decision, so a partial header is never half-consumed

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BytesMut};

use super::header::{AddressFamily, Command, Transport, HEADER_LEN, SIGNATURE, VERSION};

/// Outcome of inspecting the head of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// Not enough bytes yet. Nothing was consumed; retry after the next read.
    NeedMoreData,
    /// The stream does not start with a v2 signature. Nothing was consumed.
    NotProxied,
    /// Valid envelope carrying no forwarding information.
    Local,
    /// Relayed connection with the original endpoints.
    Proxied {
        source: SocketAddr,
        destination: SocketAddr,
    },
    UnsupportedVersion(u8),
    UnsupportedCommand(u8),
    UnsupportedFamily(u8),
    UnsupportedProtocol(u8),
    /// Declared block is shorter than the family's addresses need.
    InvalidAddressLength { declared: usize, required: usize },
}

impl Decoded {
    /// Relayed client endpoint, when the header carried one.
    pub fn source(&self) -> Option<SocketAddr> {
        match self {
            Decoded::Proxied { source, .. } => Some(*source),
            _ => None,
        }
    }

    /// True once the decoder has reached a decision.
    pub fn is_complete(&self) -> bool {
        !matches!(self, Decoded::NeedMoreData)
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Decoded::NeedMoreData => "need_more_data",
            Decoded::NotProxied => "not_proxied",
            Decoded::Local => "local",
            Decoded::Proxied { .. } => "proxied",
            Decoded::UnsupportedVersion(_) => "unsupported_version",
            Decoded::UnsupportedCommand(_) => "unsupported_command",
            Decoded::UnsupportedFamily(_) => "unsupported_family",
            Decoded::UnsupportedProtocol(_) => "unsupported_protocol",
            Decoded::InvalidAddressLength { .. } => "invalid_address_length",
        }
    }
}

/// Decode a v2 header from the front of `buf`.
///
/// On `NeedMoreData` and `NotProxied` the buffer is left untouched. Any other
/// outcome removes the fixed header plus the declared address block.
pub fn decode(buf: &mut BytesMut) -> Decoded {
    if buf.len() < HEADER_LEN {
        return Decoded::NeedMoreData;
    }

    if buf[..SIGNATURE.len()] != SIGNATURE {
        return Decoded::NotProxied;
    }

    let declared = u16::from_be_bytes([buf[14], buf[15]]) as usize;
    if buf.len() < HEADER_LEN + declared {
        return Decoded::NeedMoreData;
    }

    let ver_cmd = buf[12];
    let fam_proto = buf[13];
    buf.advance(HEADER_LEN);
    let block = buf.split_to(declared);

    classify(ver_cmd, fam_proto, &block)
}

fn classify(ver_cmd: u8, fam_proto: u8, block: &[u8]) -> Decoded {
    let version = ver_cmd >> 4;
    if version != VERSION {
        return Decoded::UnsupportedVersion(version);
    }

    let command = ver_cmd & 0x0F;
    match Command::from_nibble(command) {
        Some(Command::Local) => return Decoded::Local,
        Some(Command::Proxy) => {}
        None => return Decoded::UnsupportedCommand(command),
    }

    let family_nibble = fam_proto >> 4;
    let family = match AddressFamily::from_nibble(family_nibble) {
        Some(family @ (AddressFamily::Inet | AddressFamily::Inet6)) => family,
        _ => return Decoded::UnsupportedFamily(family_nibble),
    };

    let transport = fam_proto & 0x0F;
    if Transport::from_nibble(transport).is_none() {
        return Decoded::UnsupportedProtocol(transport);
    }

    parse_endpoints(family, block)
}

fn parse_endpoints(family: AddressFamily, block: &[u8]) -> Decoded {
    let (ip_len, required) = match (family.ip_len(), family.block_len()) {
        (Some(ip_len), Some(required)) => (ip_len, required),
        _ => return Decoded::UnsupportedFamily(family as u8),
    };
    if block.len() < required {
        return Decoded::InvalidAddressLength {
            declared: block.len(),
            required,
        };
    }

    let src_ip = read_ip(&block[..ip_len]);
    let dst_ip = read_ip(&block[ip_len..ip_len * 2]);
    let ports = &block[ip_len * 2..required];
    let src_port = u16::from_be_bytes([ports[0], ports[1]]);
    let dst_port = u16::from_be_bytes([ports[2], ports[3]]);

    Decoded::Proxied {
        source: SocketAddr::new(src_ip, src_port),
        destination: SocketAddr::new(dst_ip, dst_port),
    }
}

fn read_ip(octets: &[u8]) -> IpAddr {
    if let Ok(v4) = <[u8; 4]>::try_from(octets) {
        IpAddr::V4(Ipv4Addr::from(v4))
    } else {
        let mut v6 = [0u8; 16];
        v6.copy_from_slice(octets);
        IpAddr::V6(Ipv6Addr::from(v6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy_protocol::header::ProxyHeader;
    use bytes::BufMut;

    fn raw_header(ver_cmd: u8, fam_proto: u8, block: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_slice(&SIGNATURE);
        buf.put_u8(ver_cmd);
        buf.put_u8(fam_proto);
        buf.put_u16(block.len() as u16);
        buf.put_slice(block);
        buf
    }

    fn ipv4_block() -> Vec<u8> {
        let mut block = vec![203, 0, 113, 9, 10, 0, 0, 1];
        block.extend_from_slice(&4422u16.to_be_bytes());
        block.extend_from_slice(&22u16.to_be_bytes());
        block
    }

    #[test]
    fn short_buffer_needs_more_data() {
        let mut buf = BytesMut::from(&SIGNATURE[..]);
        assert_eq!(decode(&mut buf), Decoded::NeedMoreData);
        assert_eq!(buf.len(), SIGNATURE.len());
    }

    #[test]
    fn ssh_banner_is_not_proxied() {
        let mut buf = BytesMut::from(&b"SSH-2.0-OpenSSH_9.6\r\n"[..]);
        assert_eq!(decode(&mut buf), Decoded::NotProxied);
        assert_eq!(&buf[..], b"SSH-2.0-OpenSSH_9.6\r\n");
    }

    #[test]
    fn local_command_consumes_fixed_header() {
        let mut buf = BytesMut::new();
        ProxyHeader::encode_local(&mut buf);
        buf.put_slice(b"payload");

        assert_eq!(decode(&mut buf), Decoded::Local);
        assert_eq!(&buf[..], b"payload");
    }

    #[test]
    fn proxied_ipv4_source() {
        let mut buf = raw_header(0x21, 0x11, &ipv4_block());
        buf.put_slice(b"login");

        let decoded = decode(&mut buf);
        assert_eq!(
            decoded,
            Decoded::Proxied {
                source: "203.0.113.9:4422".parse().unwrap(),
                destination: "10.0.0.1:22".parse().unwrap(),
            }
        );
        assert_eq!(&buf[..], b"login");
    }

    #[test]
    fn proxied_ipv6_source() {
        let header = ProxyHeader::new(
            "[2001:db8::7]:60000".parse().unwrap(),
            "[2001:db8::1]:22".parse().unwrap(),
        );
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(
            decode(&mut buf).source(),
            Some("[2001:db8::7]:60000".parse().unwrap())
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn trailing_tlvs_are_skipped() {
        let mut block = ipv4_block();
        block.extend_from_slice(&[0x04, 0x00, 0x01, 0xFF]);
        let mut buf = raw_header(0x21, 0x11, &block);
        buf.put_slice(b"next");

        assert!(matches!(decode(&mut buf), Decoded::Proxied { .. }));
        assert_eq!(&buf[..], b"next");
    }

    #[test]
    fn incomplete_address_block_waits() {
        let full = raw_header(0x21, 0x11, &ipv4_block());
        let mut buf = BytesMut::from(&full[..20]);

        assert_eq!(decode(&mut buf), Decoded::NeedMoreData);
        assert_eq!(buf.len(), 20);
    }

    #[test]
    fn wrong_version_is_benign() {
        let mut buf = raw_header(0x11, 0x11, &ipv4_block());
        assert_eq!(decode(&mut buf), Decoded::UnsupportedVersion(1));
        assert!(buf.is_empty());
    }

    #[test]
    fn unknown_command_is_benign() {
        let mut buf = raw_header(0x2F, 0x11, &ipv4_block());
        assert_eq!(decode(&mut buf), Decoded::UnsupportedCommand(0xF));
    }

    #[test]
    fn unix_and_unspec_families_pass_through() {
        let mut unix = raw_header(0x21, 0x31, &[0u8; 216]);
        assert_eq!(decode(&mut unix), Decoded::UnsupportedFamily(3));
        assert!(unix.is_empty());

        let mut unspec = raw_header(0x21, 0x00, &[]);
        assert_eq!(decode(&mut unspec), Decoded::UnsupportedFamily(0));
    }

    #[test]
    fn unknown_transport_is_benign() {
        let mut buf = raw_header(0x21, 0x13, &ipv4_block());
        assert_eq!(decode(&mut buf), Decoded::UnsupportedProtocol(3));
    }

    #[test]
    fn truncated_declared_length_is_benign() {
        let mut buf = raw_header(0x21, 0x11, &[1, 2, 3, 4]);
        assert_eq!(
            decode(&mut buf),
            Decoded::InvalidAddressLength {
                declared: 4,
                required: 12
            }
        );
        assert!(buf.is_empty());
    }
}
