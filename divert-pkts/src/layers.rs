// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Header views for the network and transport layers of a diverted packet.
//!
//! Each supported header comes as a pair of views: a read-only `XxxRef` and a mutable `XxxMut`.
//! Both validate the byte region they are constructed over, so getters and setters never index
//! out of bounds. Mutable views are handed a `&mut bool` dirty flag that every setter raises,
//! which is what lets the owner of the bytes decide whether checksums need recomputing.
//!
//! [`IpHeader`] and [`NextHeader`] (and their mutable counterparts) close over the set of
//! supported protocols. A transport protocol that has no view is represented by
//! [`NextHeader::Unsupported`] rather than an error.

pub mod icmp;
pub mod ip;
pub mod tcp;
pub mod udp;

use std::net::IpAddr;

use crate::error::ValidationError;
use icmp::{Icmpv4Mut, Icmpv4Ref, Icmpv6Mut, Icmpv6Ref};
use ip::{Ipv4Mut, Ipv4Ref, Ipv6Mut, Ipv6Ref};
use tcp::{TcpMut, TcpRef};
use udp::{UdpMut, UdpRef};

/// IANA protocol number of ICMP for IPv4.
pub const PROTO_ICMPV4: u8 = 1;
/// IANA protocol number of TCP.
pub const PROTO_TCP: u8 = 6;
/// IANA protocol number of UDP.
pub const PROTO_UDP: u8 = 17;
/// IANA protocol number of ICMP for IPv6.
pub const PROTO_ICMPV6: u8 = 58;

/// Returns a human-readable name for an IANA protocol number.
///
/// Protocols without a view in this crate still get a name where one is commonly seen in
/// diverted traffic; anything else is `"Unknown"`.
pub fn protocol_name(protocol: u8) -> &'static str {
    match protocol {
        0 => "HOPOPT",
        PROTO_ICMPV4 => "ICMPv4",
        2 => "IGMP",
        4 => "IPv4",
        PROTO_TCP => "TCP",
        PROTO_UDP => "UDP",
        41 => "IPv6",
        43 => "IPv6-Route",
        44 => "IPv6-Frag",
        47 => "GRE",
        50 => "ESP",
        51 => "AH",
        PROTO_ICMPV6 => "ICMPv6",
        59 => "IPv6-NoNxt",
        60 => "IPv6-Opts",
        132 => "SCTP",
        _ => "Unknown",
    }
}

/// A read-only view of the IP header of a packet.
#[derive(Clone, Copy, Debug)]
pub enum IpHeader<'a> {
    V4(Ipv4Ref<'a>),
    V6(Ipv6Ref<'a>),
}

impl<'a> IpHeader<'a> {
    /// Builds the IP view matching the version nibble of `bytes`.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ValidationError> {
        match bytes.first().map(|b| b >> 4) {
            Some(4) => Ok(IpHeader::V4(Ipv4Ref::from_bytes(bytes)?)),
            Some(6) => Ok(IpHeader::V6(Ipv6Ref::from_bytes(bytes)?)),
            Some(_) => Err(ValidationError::invalid_value(
                "IP",
                "IP version number was neither 4 nor 6",
            )),
            None => Err(ValidationError::insufficient_bytes(
                "IP",
                "packet too short for IP header--missing version byte",
            )),
        }
    }

    #[inline]
    pub fn version(&self) -> u8 {
        match self {
            IpHeader::V4(ip) => ip.version(),
            IpHeader::V6(ip) => ip.version(),
        }
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        match self {
            IpHeader::V4(ip) => ip.header_len(),
            IpHeader::V6(ip) => ip.as_bytes().len(),
        }
    }

    /// The protocol number of the header that follows the IP header.
    #[inline]
    pub fn next_protocol(&self) -> u8 {
        match self {
            IpHeader::V4(ip) => ip.protocol(),
            IpHeader::V6(ip) => ip.next_header(),
        }
    }

    #[inline]
    pub fn src_addr(&self) -> IpAddr {
        match self {
            IpHeader::V4(ip) => IpAddr::V4(ip.src_addr()),
            IpHeader::V6(ip) => IpAddr::V6(ip.src_addr()),
        }
    }

    #[inline]
    pub fn dst_addr(&self) -> IpAddr {
        match self {
            IpHeader::V4(ip) => IpAddr::V4(ip.dst_addr()),
            IpHeader::V6(ip) => IpAddr::V6(ip.dst_addr()),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        match self {
            IpHeader::V4(ip) => ip.as_bytes(),
            IpHeader::V6(ip) => ip.as_bytes(),
        }
    }
}

/// A mutable view of the IP header of a packet.
#[derive(Debug)]
pub enum IpHeaderMut<'a> {
    V4(Ipv4Mut<'a>),
    V6(Ipv6Mut<'a>),
}

impl<'a> IpHeaderMut<'a> {
    #[inline]
    pub fn as_ref(&self) -> IpHeader<'_> {
        match self {
            IpHeaderMut::V4(ip) => IpHeader::V4(ip.as_ref()),
            IpHeaderMut::V6(ip) => IpHeader::V6(ip.as_ref()),
        }
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        match self {
            IpHeaderMut::V4(ip) => ip.is_modified(),
            IpHeaderMut::V6(ip) => ip.is_modified(),
        }
    }
}

/// A read-only view of the header following the IP header.
#[derive(Clone, Copy, Debug)]
pub enum NextHeader<'a> {
    Tcp(TcpRef<'a>),
    Udp(UdpRef<'a>),
    Icmpv4(Icmpv4Ref<'a>),
    Icmpv6(Icmpv6Ref<'a>),
    /// A protocol this crate has no view for, identified by its IANA number.
    Unsupported(u8),
}

impl<'a> NextHeader<'a> {
    /// Builds the view for `protocol` over `bytes`, which start at the transport header and run
    /// to the end of the packet.
    pub fn from_bytes(protocol: u8, bytes: &'a [u8]) -> Result<Self, ValidationError> {
        Ok(match protocol {
            PROTO_TCP => NextHeader::Tcp(TcpRef::from_bytes(bytes)?),
            PROTO_UDP => NextHeader::Udp(UdpRef::from_bytes(bytes)?),
            PROTO_ICMPV4 => NextHeader::Icmpv4(Icmpv4Ref::from_bytes(bytes)?),
            PROTO_ICMPV6 => NextHeader::Icmpv6(Icmpv6Ref::from_bytes(bytes)?),
            other => NextHeader::Unsupported(other),
        })
    }

    #[inline]
    pub fn protocol(&self) -> u8 {
        match self {
            NextHeader::Tcp(_) => PROTO_TCP,
            NextHeader::Udp(_) => PROTO_UDP,
            NextHeader::Icmpv4(_) => PROTO_ICMPV4,
            NextHeader::Icmpv6(_) => PROTO_ICMPV6,
            NextHeader::Unsupported(protocol) => *protocol,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        protocol_name(self.protocol())
    }

    /// The length of the header itself, or 0 for unsupported protocols.
    #[inline]
    pub fn header_len(&self) -> usize {
        match self {
            NextHeader::Tcp(tcp) => tcp.header_len(),
            NextHeader::Udp(udp) => udp.as_bytes().len(),
            NextHeader::Icmpv4(icmp) => icmp.as_bytes().len(),
            NextHeader::Icmpv6(icmp) => icmp.as_bytes().len(),
            NextHeader::Unsupported(_) => 0,
        }
    }

    /// The source port, for protocols that carry one.
    #[inline]
    pub fn src_port(&self) -> Option<u16> {
        match self {
            NextHeader::Tcp(tcp) => Some(tcp.src_port()),
            NextHeader::Udp(udp) => Some(udp.src_port()),
            _ => None,
        }
    }

    /// The destination port, for protocols that carry one.
    #[inline]
    pub fn dst_port(&self) -> Option<u16> {
        match self {
            NextHeader::Tcp(tcp) => Some(tcp.dst_port()),
            NextHeader::Udp(udp) => Some(udp.dst_port()),
            _ => None,
        }
    }
}

/// A mutable view of the header following the IP header.
#[derive(Debug)]
pub enum NextHeaderMut<'a> {
    Tcp(TcpMut<'a>),
    Udp(UdpMut<'a>),
    Icmpv4(Icmpv4Mut<'a>),
    Icmpv6(Icmpv6Mut<'a>),
    Unsupported(u8),
}

impl<'a> NextHeaderMut<'a> {
    #[inline]
    pub fn as_ref(&self) -> NextHeader<'_> {
        match self {
            NextHeaderMut::Tcp(tcp) => NextHeader::Tcp(tcp.as_ref()),
            NextHeaderMut::Udp(udp) => NextHeader::Udp(udp.as_ref()),
            NextHeaderMut::Icmpv4(icmp) => NextHeader::Icmpv4(icmp.as_ref()),
            NextHeaderMut::Icmpv6(icmp) => NextHeader::Icmpv6(icmp.as_ref()),
            NextHeaderMut::Unsupported(protocol) => NextHeader::Unsupported(*protocol),
        }
    }

    /// Indicates whether any field of the header has been set. Always `false` for unsupported
    /// protocols, which cannot be modified through a view.
    #[inline]
    pub fn is_modified(&self) -> bool {
        match self {
            NextHeaderMut::Tcp(tcp) => tcp.is_modified(),
            NextHeaderMut::Udp(udp) => udp.is_modified(),
            NextHeaderMut::Icmpv4(icmp) => icmp.is_modified(),
            NextHeaderMut::Icmpv6(icmp) => icmp.is_modified(),
            NextHeaderMut::Unsupported(_) => false,
        }
    }

    /// Sets the source port, returning `false` (and leaving the header untouched) if the
    /// protocol has no ports.
    #[inline]
    pub fn set_src_port(&mut self, port: u16) -> bool {
        match self {
            NextHeaderMut::Tcp(tcp) => tcp.set_src_port(port),
            NextHeaderMut::Udp(udp) => udp.set_src_port(port),
            _ => return false,
        }
        true
    }

    /// Sets the destination port, returning `false` (and leaving the header untouched) if the
    /// protocol has no ports.
    #[inline]
    pub fn set_dst_port(&mut self, port: u16) -> bool {
        match self {
            NextHeaderMut::Tcp(tcp) => tcp.set_dst_port(port),
            NextHeaderMut::Udp(udp) => udp.set_dst_port(port),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    fn ipv4_udp() -> Vec<u8> {
        let mut bytes = vec![
            0x45, 0x00, 0x00, 0x1E, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00, 127, 0, 0, 1,
            127, 0, 0, 1,
        ];
        bytes.extend([0x13, 0x88, 0x00, 0x35, 0x00, 0x0A, 0x00, 0x00, b'h', b'i']);
        bytes
    }

    #[test]
    fn ip_header_dispatches_on_version() {
        let bytes = ipv4_udp();
        let ip = IpHeader::from_bytes(&bytes).unwrap();
        assert!(matches!(ip, IpHeader::V4(_)));
        assert_eq!(ip.version(), 4);
        assert_eq!(ip.header_len(), 20);
        assert_eq!(ip.next_protocol(), PROTO_UDP);
        assert_eq!(ip.src_addr(), IpAddr::V4(Ipv4Addr::LOCALHOST));

        let mut bad = ipv4_udp();
        bad[0] = 0x75;
        assert!(IpHeader::from_bytes(&bad).is_err());
        assert!(IpHeader::from_bytes(&[]).is_err());
    }

    #[test]
    fn next_header_ports() {
        let bytes = ipv4_udp();
        let next = NextHeader::from_bytes(PROTO_UDP, &bytes[20..]).unwrap();
        assert_eq!(next.src_port(), Some(5000));
        assert_eq!(next.dst_port(), Some(53));
        assert_eq!(next.name(), "UDP");
        assert_eq!(next.header_len(), 8);

        let icmp = NextHeader::from_bytes(PROTO_ICMPV4, &bytes[20..]).unwrap();
        assert_eq!(icmp.src_port(), None);
    }

    #[test]
    fn unknown_protocol_is_unsupported() {
        let bytes = ipv4_udp();
        let next = NextHeader::from_bytes(200, &bytes[20..]).unwrap();
        assert!(matches!(next, NextHeader::Unsupported(200)));
        assert_eq!(next.protocol(), 200);
        assert_eq!(next.name(), "Unknown");
        assert_eq!(next.src_port(), None);
    }

    #[test]
    fn port_setters_report_support() {
        let mut bytes = [0u8; 8];
        let mut modified = false;
        let mut next = NextHeaderMut::Udp(UdpMut::from_bytes(&mut bytes, &mut modified).unwrap());
        assert!(!next.is_modified());
        assert!(next.set_src_port(8080));
        assert!(next.is_modified());
        assert_eq!(next.as_ref().src_port(), Some(8080));

        let mut unsupported = NextHeaderMut::Unsupported(132);
        assert!(!unsupported.set_dst_port(1));
        assert!(!unsupported.is_modified());
    }

    #[test]
    fn protocol_names() {
        assert_eq!(protocol_name(PROTO_TCP), "TCP");
        assert_eq!(protocol_name(PROTO_ICMPV6), "ICMPv6");
        assert_eq!(protocol_name(253), "Unknown");
    }
}
