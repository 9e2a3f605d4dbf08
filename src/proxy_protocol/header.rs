//! PROXY protocol v2 wire constants and header encoding.
//!
//! ```text
//!  0                   12      13      14      16
//!  +-------------------+-------+-------+-------+---------------------------+
//!  | signature (12)    |ver|cmd|fam|prt| len   | address block (len bytes) |
//!  +-------------------+-------+-------+-------+---------------------------+
//! ```

use std::net::{IpAddr, SocketAddr};

use bytes::{BufMut, BytesMut};

/// Fixed 12-byte signature that opens every v2 header.
pub const SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];

/// Length of the fixed part of the header.
pub const HEADER_LEN: usize = 16;

/// The only protocol version this crate understands.
pub const VERSION: u8 = 0x2;

/// Command nibble.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Connection established by the proxy itself (health checks); no address rewrite.
    Local = 0x0,
    /// Connection relayed on behalf of a client; the address block describes it.
    Proxy = 0x1,
}

impl Command {
    pub fn from_nibble(val: u8) -> Option<Self> {
        match val {
            0x0 => Some(Command::Local),
            0x1 => Some(Command::Proxy),
            _ => None,
        }
    }
}

/// Address family nibble.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Unspec = 0x0,
    Inet = 0x1,
    Inet6 = 0x2,
    Unix = 0x3,
}

impl AddressFamily {
    pub fn from_nibble(val: u8) -> Option<Self> {
        match val {
            0x0 => Some(AddressFamily::Unspec),
            0x1 => Some(AddressFamily::Inet),
            0x2 => Some(AddressFamily::Inet6),
            0x3 => Some(AddressFamily::Unix),
            _ => None,
        }
    }

    /// Size of a single address for the IP families.
    pub fn ip_len(self) -> Option<usize> {
        match self {
            AddressFamily::Inet => Some(4),
            AddressFamily::Inet6 => Some(16),
            AddressFamily::Unspec | AddressFamily::Unix => None,
        }
    }

    /// Minimum address block length: two addresses plus two ports.
    pub fn block_len(self) -> Option<usize> {
        self.ip_len().map(|len| len * 2 + 4)
    }
}

/// Transport protocol nibble.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Unspec = 0x0,
    Stream = 0x1,
    Datagram = 0x2,
}

impl Transport {
    pub fn from_nibble(val: u8) -> Option<Self> {
        match val {
            0x0 => Some(Transport::Unspec),
            0x1 => Some(Transport::Stream),
            0x2 => Some(Transport::Datagram),
            _ => None,
        }
    }
}

/// A v2 header describing a relayed TCP connection.
///
/// Used when forwarding an authenticated session upstream so the shell
/// server sees the resolved client rather than the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyHeader {
    pub source: SocketAddr,
    pub destination: SocketAddr,
}

impl ProxyHeader {
    pub fn new(source: SocketAddr, destination: SocketAddr) -> Self {
        Self { source, destination }
    }

    /// Encode as a `PROXY` / `STREAM` header.
    ///
    /// Mixed families are widened to IPv6 using IPv4-mapped addresses.
    pub fn encode(&self, dst: &mut BytesMut) {
        let (family, src_ip, dst_ip) = match (self.source.ip(), self.destination.ip()) {
            (IpAddr::V4(s), IpAddr::V4(d)) => {
                (AddressFamily::Inet, s.octets().to_vec(), d.octets().to_vec())
            }
            (s, d) => (
                AddressFamily::Inet6,
                to_v6_octets(s).to_vec(),
                to_v6_octets(d).to_vec(),
            ),
        };

        let block_len = src_ip.len() + dst_ip.len() + 4;
        dst.reserve(HEADER_LEN + block_len);
        dst.put_slice(&SIGNATURE);
        dst.put_u8((VERSION << 4) | Command::Proxy as u8);
        dst.put_u8(((family as u8) << 4) | Transport::Stream as u8);
        dst.put_u16(block_len as u16);
        dst.put_slice(&src_ip);
        dst.put_slice(&dst_ip);
        dst.put_u16(self.source.port());
        dst.put_u16(self.destination.port());
    }

    /// Encode a `LOCAL` header with an empty address block.
    pub fn encode_local(dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN);
        dst.put_slice(&SIGNATURE);
        dst.put_u8((VERSION << 4) | Command::Local as u8);
        dst.put_u8(((AddressFamily::Unspec as u8) << 4) | Transport::Unspec as u8);
        dst.put_u16(0);
    }
}

fn to_v6_octets(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_ipv4_layout() {
        let header = ProxyHeader::new(
            "203.0.113.9:4422".parse().unwrap(),
            "10.0.0.1:22".parse().unwrap(),
        );
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(buf.len(), HEADER_LEN + 12);
        assert_eq!(&buf[..12], &SIGNATURE);
        assert_eq!(buf[12], 0x21);
        assert_eq!(buf[13], 0x11);
        assert_eq!(&buf[14..16], &[0x00u8, 0x0C]);
        assert_eq!(&buf[16..20], &[203u8, 0, 113, 9]);
        assert_eq!(&buf[24..26], &4422u16.to_be_bytes());
        assert_eq!(&buf[26..28], &22u16.to_be_bytes());
    }

    #[test]
    fn encode_mixed_families_widens_to_ipv6() {
        let header = ProxyHeader::new(
            "[2001:db8::1]:5000".parse().unwrap(),
            "10.0.0.1:22".parse().unwrap(),
        );
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(buf[13] >> 4, AddressFamily::Inet6 as u8);
        assert_eq!(buf.len(), HEADER_LEN + 36);
    }

    #[test]
    fn family_block_lengths() {
        assert_eq!(AddressFamily::Inet.block_len(), Some(12));
        assert_eq!(AddressFamily::Inet6.block_len(), Some(36));
        assert_eq!(AddressFamily::Unix.block_len(), None);
    }
}
