// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Diverted packets and their header-level accessors.

use core::fmt;
use std::net::IpAddr;

use divert_common::{BufferPool, PooledBuffer};
use divert_pkts::layers::icmp::{Icmpv4Mut, Icmpv6Mut};
use divert_pkts::layers::ip::{Ipv4Mut, Ipv6Mut};
use divert_pkts::layers::tcp::{TcpMut, TcpRef};
use divert_pkts::layers::udp::UdpMut;
use divert_pkts::layers::{
    protocol_name, IpHeader, IpHeaderMut, NextHeader, NextHeaderMut, PROTO_ICMPV4, PROTO_ICMPV6,
    PROTO_TCP, PROTO_UDP,
};
use divert_pkts::{ValidationError, ValidationErrorType};
use once_cell::unsync::OnceCell;

use crate::{Address, Direction, DivertHandle, Driver, Error, Result};

/// Offsets and dirty flags recorded when a packet's headers are first parsed.
///
/// Header views are rebuilt from these on demand rather than stored, so that no view outlives a
/// change to the underlying bytes.
#[derive(Clone, Copy, Debug)]
struct Layout {
    ip_version: u8,
    ip_header_len: usize,
    next_protocol: u8,
    /// Length of everything following the IP header. A TCP payload resize updates this before
    /// the packet's own length catches up in `update_tcp_header()`.
    segment_len: usize,
    ip_modified: bool,
    next_modified: bool,
}

impl Layout {
    fn parse(bytes: &[u8]) -> core::result::Result<Self, ValidationError> {
        let ip = IpHeader::from_bytes(bytes)?;
        let ip_header_len = ip.header_len();
        let next_protocol = ip.next_protocol();
        NextHeader::from_bytes(next_protocol, &bytes[ip_header_len..])?;

        Ok(Layout {
            ip_version: ip.version(),
            ip_header_len,
            next_protocol,
            segment_len: bytes.len() - ip_header_len,
            ip_modified: false,
            next_modified: false,
        })
    }

    #[inline]
    fn segment_end(&self) -> usize {
        self.ip_header_len + self.segment_len
    }

    /// The longest segment that both fits in `capacity` bytes of storage and can be described by
    /// the IP header's length field.
    fn max_segment_len(&self, capacity: usize) -> usize {
        let field_limit = match self.ip_version {
            4 => usize::from(u16::MAX).saturating_sub(self.ip_header_len),
            _ => usize::from(u16::MAX),
        };
        capacity.saturating_sub(self.ip_header_len).min(field_limit)
    }
}

/// An IP packet held in a pooled buffer, along with the metadata the driver attached to it.
///
/// Headers are parsed lazily: the first accessor to need them parses the IP header and the header
/// following it, and the result is cached for the lifetime of the packet. Parsing can also be
/// triggered explicitly through [`parse_headers()`](Self::parse_headers).
///
/// Dropping a `Packet` returns its buffer to the pool it was acquired from.
#[derive(Debug)]
pub struct Packet {
    buffer: PooledBuffer,
    addr: Address,
    layout: OnceCell<Layout>,
}

impl Packet {
    /// Wraps the contents of `buffer` as a packet.
    #[inline]
    pub fn new(buffer: PooledBuffer, addr: Address) -> Self {
        Packet {
            buffer,
            addr,
            layout: OnceCell::new(),
        }
    }

    /// Copies `bytes` into a buffer acquired from `pool` and wraps it as a packet.
    pub fn from_bytes(pool: &BufferPool, bytes: &[u8], addr: Address) -> Result<Self> {
        let mut buffer = pool.acquire();
        if buffer.try_append(bytes).is_none() {
            return Err(Error::PacketTooLarge {
                len: bytes.len(),
                capacity: buffer.capacity(),
            });
        }

        Ok(Self::new(buffer, addr))
    }

    fn layout(&self) -> Result<&Layout> {
        self.layout
            .get_or_try_init(|| Layout::parse(self.buffer.as_slice()))
            .map_err(Error::from)
    }

    fn parsed_mut(&mut self) -> Result<(&mut Layout, &mut PooledBuffer)> {
        self.layout()?;
        let layout = self.layout.get_mut().ok_or(ValidationError {
            layer: "IP",
            err_type: ValidationErrorType::InvalidValue,
            reason: "packet headers could not be parsed",
        })?;
        Ok((layout, &mut self.buffer))
    }

    /// Parses the IP header and the header following it, if not already parsed.
    ///
    /// An unrecognized transport protocol is not an error; it is reported as
    /// [`NextHeader::Unsupported`].
    #[inline]
    pub fn parse_headers(&self) -> Result<()> {
        self.layout().map(|_| ())
    }

    /// Indicates whether the packet's headers have been parsed.
    #[inline]
    pub fn is_parsed(&self) -> bool {
        self.layout.get().is_some()
    }

    #[inline]
    pub fn ip_version(&self) -> Result<u8> {
        Ok(self.layout()?.ip_version)
    }

    #[inline]
    pub fn ip_header_len(&self) -> Result<usize> {
        Ok(self.layout()?.ip_header_len)
    }

    /// The IANA protocol number of the header following the IP header.
    #[inline]
    pub fn next_header_type(&self) -> Result<u8> {
        Ok(self.layout()?.next_protocol)
    }

    #[inline]
    pub fn next_header_protocol_name(&self) -> Result<&'static str> {
        Ok(protocol_name(self.next_header_type()?))
    }

    pub fn ip_header(&self) -> Result<IpHeader<'_>> {
        self.layout()?;
        Ok(IpHeader::from_bytes(self.buffer.as_slice())?)
    }

    pub fn ip_header_mut(&mut self) -> Result<IpHeaderMut<'_>> {
        let (layout, buffer) = self.parsed_mut()?;
        let bytes = buffer.as_mut_slice();
        let modified = &mut layout.ip_modified;
        Ok(match layout.ip_version {
            4 => IpHeaderMut::V4(Ipv4Mut::from_bytes(bytes, modified)?),
            _ => IpHeaderMut::V6(Ipv6Mut::from_bytes(bytes, modified)?),
        })
    }

    pub fn next_header(&self) -> Result<NextHeader<'_>> {
        let layout = self.layout()?;
        let segment = &self.buffer.storage()[layout.ip_header_len..layout.segment_end()];
        Ok(NextHeader::from_bytes(layout.next_protocol, segment)?)
    }

    pub fn next_header_mut(&mut self) -> Result<NextHeaderMut<'_>> {
        let (layout, buffer) = self.parsed_mut()?;
        let max_segment_len = layout.max_segment_len(buffer.capacity());
        let Layout {
            ip_header_len,
            next_protocol,
            segment_len,
            next_modified,
            ..
        } = layout;

        let segment = &mut buffer.storage_mut()[*ip_header_len..];
        Ok(match *next_protocol {
            PROTO_TCP => NextHeaderMut::Tcp(TcpMut::from_bytes(
                &mut segment[..max_segment_len],
                segment_len,
                next_modified,
            )?),
            PROTO_UDP => NextHeaderMut::Udp(UdpMut::from_bytes(
                &mut segment[..*segment_len],
                next_modified,
            )?),
            PROTO_ICMPV4 => NextHeaderMut::Icmpv4(Icmpv4Mut::from_bytes(
                &mut segment[..*segment_len],
                next_modified,
            )?),
            PROTO_ICMPV6 => NextHeaderMut::Icmpv6(Icmpv6Mut::from_bytes(
                &mut segment[..*segment_len],
                next_modified,
            )?),
            other => NextHeaderMut::Unsupported(other),
        })
    }

    /// The TCP segment of the packet, or [`Error::ProtocolNotSupported`] if it carries another
    /// protocol.
    pub fn tcp(&self) -> Result<TcpRef<'_>> {
        match self.next_header()? {
            NextHeader::Tcp(tcp) => Ok(tcp),
            other => Err(Error::ProtocolNotSupported {
                protocol: other.protocol(),
            }),
        }
    }

    /// A mutable view of the TCP segment of the packet.
    ///
    /// After changing the payload length through [`TcpMut::set_payload()`], call
    /// [`update_tcp_header()`](Self::update_tcp_header) to bring the packet length and IP length
    /// fields up to date (or use [`set_tcp_payload()`](Self::set_tcp_payload), which does both).
    /// The view never extends past what the IP length field can describe, so a payload that would
    /// overflow it is rejected before anything is written.
    pub fn tcp_mut(&mut self) -> Result<TcpMut<'_>> {
        match self.next_header_mut()? {
            NextHeaderMut::Tcp(tcp) => Ok(tcp),
            other => Err(Error::ProtocolNotSupported {
                protocol: other.as_ref().protocol(),
            }),
        }
    }

    #[inline]
    pub fn src_ip(&self) -> Result<IpAddr> {
        Ok(self.ip_header()?.src_addr())
    }

    #[inline]
    pub fn dst_ip(&self) -> Result<IpAddr> {
        Ok(self.ip_header()?.dst_addr())
    }

    pub fn set_src_ip(&mut self, addr: IpAddr) -> Result<()> {
        match (self.ip_header_mut()?, addr) {
            (IpHeaderMut::V4(mut ip), IpAddr::V4(addr)) => ip.set_src_addr(addr),
            (IpHeaderMut::V6(mut ip), IpAddr::V6(addr)) => ip.set_src_addr(addr),
            _ => return Err(Error::AddressFamilyMismatch),
        }
        Ok(())
    }

    pub fn set_dst_ip(&mut self, addr: IpAddr) -> Result<()> {
        match (self.ip_header_mut()?, addr) {
            (IpHeaderMut::V4(mut ip), IpAddr::V4(addr)) => ip.set_dst_addr(addr),
            (IpHeaderMut::V6(mut ip), IpAddr::V6(addr)) => ip.set_dst_addr(addr),
            _ => return Err(Error::AddressFamilyMismatch),
        }
        Ok(())
    }

    pub fn src_port(&self) -> Result<u16> {
        let next = self.next_header()?;
        next.src_port().ok_or(Error::ProtocolNotSupported {
            protocol: next.protocol(),
        })
    }

    pub fn dst_port(&self) -> Result<u16> {
        let next = self.next_header()?;
        next.dst_port().ok_or(Error::ProtocolNotSupported {
            protocol: next.protocol(),
        })
    }

    pub fn set_src_port(&mut self, port: u16) -> Result<()> {
        let mut next = self.next_header_mut()?;
        if next.set_src_port(port) {
            Ok(())
        } else {
            Err(Error::ProtocolNotSupported {
                protocol: next.as_ref().protocol(),
            })
        }
    }

    pub fn set_dst_port(&mut self, port: u16) -> Result<()> {
        let mut next = self.next_header_mut()?;
        if next.set_dst_port(port) {
            Ok(())
        } else {
            Err(Error::ProtocolNotSupported {
                protocol: next.as_ref().protocol(),
            })
        }
    }

    /// The bytes following the last parsed header: the TCP payload, the bytes following a UDP or
    /// ICMP header, or everything after the IP header for unsupported protocols.
    pub fn payload(&self) -> Result<&[u8]> {
        let layout = self.layout()?;
        let next = self.next_header()?;
        if let NextHeader::Tcp(tcp) = next {
            return Ok(tcp.payload());
        }

        let start = layout.ip_header_len + next.header_len();
        Ok(&self.buffer.as_slice()[start..])
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.addr.direction()
    }

    #[inline]
    pub fn address(&self) -> &Address {
        &self.addr
    }

    #[inline]
    pub fn address_mut(&mut self) -> &mut Address {
        &mut self.addr
    }

    /// The bytes of the packet, starting at the IP header.
    #[inline]
    pub fn raw(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Indicates whether any header has been modified since it was parsed, in which case checksums
    /// must be recalculated before the packet is sent.
    #[inline]
    pub fn needs_checksum(&self) -> bool {
        self.layout
            .get()
            .map_or(false, |layout| layout.ip_modified || layout.next_modified)
    }

    /// Brings the packet length and the IP header's length field in line with the length of the
    /// TCP segment, following a change to the length of the TCP payload.
    ///
    /// Does nothing for packets that don't carry TCP.
    pub fn update_tcp_header(&mut self) -> Result<()> {
        let (layout, buffer) = self.parsed_mut()?;
        if layout.next_protocol != PROTO_TCP {
            return Ok(());
        }

        let new_len = layout.segment_end();
        match layout.ip_version {
            4 => {
                let total_len = u16::try_from(new_len).map_err(|_| ValidationError {
                    layer: "IPv4",
                    err_type: ValidationErrorType::InvalidSize,
                    reason: "packet length no longer fits the IPv4 total length field",
                })?;
                buffer.set_len(new_len);
                Ipv4Mut::from_bytes(buffer.as_mut_slice(), &mut layout.ip_modified)?
                    .set_total_len(total_len);
            }
            _ => {
                let payload_len = u16::try_from(layout.segment_len).map_err(|_| ValidationError {
                    layer: "IPv6",
                    err_type: ValidationErrorType::InvalidSize,
                    reason: "payload length no longer fits the IPv6 payload length field",
                })?;
                buffer.set_len(new_len);
                Ipv6Mut::from_bytes(buffer.as_mut_slice(), &mut layout.ip_modified)?
                    .set_payload_len(payload_len);
            }
        }

        Ok(())
    }

    /// Replaces the TCP payload and updates the packet's length to match.
    pub fn set_tcp_payload(&mut self, payload: &[u8]) -> Result<()> {
        self.tcp_mut()?.set_payload(payload)?;
        self.update_tcp_header()
    }

    /// Recalculates the packet's checksums through the handle's driver.
    #[inline]
    pub fn calc_checksums<D: Driver>(&mut self, handle: &DivertHandle<D>) -> Result<()> {
        handle.calc_checksums(self)
    }

    /// Evaluates `filter` against the packet through the handle's driver.
    #[inline]
    pub fn eval_filter<D: Driver>(&self, handle: &DivertHandle<D>, filter: &str) -> Result<bool> {
        handle.eval_filter(self, filter)
    }

    /// Injects the packet, first recalculating its checksums if any header was modified.
    ///
    /// The packet is consumed, returning its buffer to the pool whether or not injection
    /// succeeds. A packet whose checksums could not be recalculated is not injected.
    pub fn send<D: Driver>(mut self, handle: &DivertHandle<D>) -> Result<usize> {
        if self.needs_checksum() {
            if let Err(e) = handle.calc_checksums(&mut self) {
                log::warn!("dropping packet instead of injecting it: {}", e);
                return Err(e);
            }
        }

        handle.send(&self)
    }

    pub(crate) fn raw_and_address_mut(&mut self) -> (&mut [u8], &mut Address) {
        (self.buffer.as_mut_slice(), &mut self.addr)
    }
}

impl Drop for Packet {
    fn drop(&mut self) {
        // The pool only zeroes the logical region, so an uncommitted TCP payload resize has to be
        // brought inside it first.
        if let Some(layout) = self.layout.get() {
            let end = layout.segment_end();
            if end > self.buffer.len() {
                self.buffer.set_len(end);
            }
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Packet {{")?;
        match self.ip_header() {
            Ok(ip) => {
                writeln!(
                    f,
                    "\tIpHeader: IPv{} {} -> {} ({} bytes)",
                    ip.version(),
                    ip.src_addr(),
                    ip.dst_addr(),
                    ip.header_len()
                )?;
                // next_header() dispatches on the protocol recorded at parse time
                if let Ok(protocol) = self.next_header_type() {
                    writeln!(
                        f,
                        "\tNextHeaderType: ({})->{}",
                        protocol,
                        protocol_name(protocol)
                    )?;
                }
                match self.next_header() {
                    Ok(NextHeader::Tcp(tcp)) => writeln!(f, "\tNextHeader: {}", tcp)?,
                    Ok(next) => match (next.src_port(), next.dst_port()) {
                        (Some(src), Some(dst)) => writeln!(f, "\tNextHeader: {} -> {}", src, dst)?,
                        _ => writeln!(f, "\tNextHeader: {:?}", next)?,
                    },
                    Err(e) => writeln!(f, "\tNextHeader: {}", e)?,
                }
            }
            Err(e) => writeln!(f, "\tIpHeader: {}", e)?,
        }
        writeln!(f, "\tAddress: {}", self.addr)?;
        writeln!(f, "\tLength: {}", self.len())?;
        write!(f, "}}")
    }
}
