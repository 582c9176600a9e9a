// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Internet Protocol (IPv4 and IPv6) header views.

use core::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bitflags::bitflags;

use crate::error::ValidationError;
use crate::utils;

/// The length of an IPv4 header that carries no options.
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// The fixed length of an IPv6 header.
pub const IPV6_HEADER_LEN: usize = 40;

/// A read-only view of an IPv4 header.
///
/// ## Packet Layout
/// ```txt
///    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |Version|  IHL  |Type of Service|          Total Length         |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |         Identification        |Flags|     Fragment Offset     |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  8 |  Time to Live |    Protocol   |            Checksum           |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 12 |                         Source Address                        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 16 |                      Destination Address                      |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 20 Z                            Options                            Z
///    Z                                                               Z
/// .. .                              ...                              .
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Ipv4Ref<'a> {
    data: &'a [u8],
}

impl<'a> Ipv4Ref<'a> {
    pub const NAME: &'static str = "IPv4";

    /// Creates a view over the IPv4 header at the start of `bytes`.
    ///
    /// Only the header itself (including options) is covered by the view; any trailing bytes
    /// are ignored.
    #[inline]
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ValidationError> {
        let header_len = Self::validate(bytes)?;
        Ok(Ipv4Ref {
            data: &bytes[..header_len],
        })
    }

    /// Checks that `bytes` begins with a well-formed IPv4 header, returning the header length.
    pub fn validate(bytes: &[u8]) -> Result<usize, ValidationError> {
        let Some(&first) = bytes.first() else {
            return Err(ValidationError::insufficient_bytes(
                Self::NAME,
                "packet too short for IPv4 header--missing version/IHL byte",
            ));
        };

        if first >> 4 != 4 {
            return Err(ValidationError::invalid_value(
                Self::NAME,
                "version number of IPv4 header was not equal to 0x04",
            ));
        }

        let header_len = (first & 0x0F) as usize * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(ValidationError::invalid_value(
                Self::NAME,
                "invalid IPv4 header length value (IHL must be a value of 5 or more)",
            ));
        }

        if bytes.len() < header_len {
            return Err(ValidationError::insufficient_bytes(
                Self::NAME,
                "insufficient bytes for IPv4 header length indicated by IHL",
            ));
        }

        Ok(header_len)
    }

    /// The bytes of the header, including options.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn version(&self) -> u8 {
        self.data[0] >> 4
    }

    /// The Internet Header Length field, in 32-bit words.
    #[inline]
    pub fn ihl(&self) -> u8 {
        self.data[0] & 0x0F
    }

    /// The length of the header in bytes.
    #[inline]
    pub fn header_len(&self) -> usize {
        self.ihl() as usize * 4
    }

    /// The Type of Service byte (DSCP and ECN).
    #[inline]
    pub fn tos(&self) -> u8 {
        self.data[1]
    }

    /// The length of the entire IP packet (header and payload).
    #[inline]
    pub fn total_len(&self) -> u16 {
        utils::read_u16(self.data, 2)
    }

    #[inline]
    pub fn id(&self) -> u16 {
        utils::read_u16(self.data, 4)
    }

    #[inline]
    pub fn flags(&self) -> Ipv4Flags {
        Ipv4Flags::from_bits_truncate(self.data[6])
    }

    /// The fragment offset, in units of 8 bytes.
    #[inline]
    pub fn frag_offset(&self) -> u16 {
        utils::read_u16(self.data, 6) & 0x1FFF
    }

    #[inline]
    pub fn ttl(&self) -> u8 {
        self.data[8]
    }

    /// The IANA protocol number of the payload.
    #[inline]
    pub fn protocol(&self) -> u8 {
        self.data[9]
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        utils::read_u16(self.data, 10)
    }

    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(utils::read_u32(self.data, 12))
    }

    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(utils::read_u32(self.data, 16))
    }

    /// The raw options of the header, or an empty slice if the header has none.
    #[inline]
    pub fn options(&self) -> &'a [u8] {
        &self.data[IPV4_MIN_HEADER_LEN..]
    }
}

impl fmt::Display for Ipv4Ref<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv4 {} -> {} hlen={} tos={:#04x} len={} id={:#06x} flags=[",
            self.src_addr(),
            self.dst_addr(),
            self.header_len(),
            self.tos(),
            self.total_len(),
            self.id()
        )?;
        for (i, (name, _)) in self.flags().iter_names().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(name)?;
        }
        write!(
            f,
            "] frag={} ttl={} protocol={} checksum={:#06x}",
            self.frag_offset(),
            self.ttl(),
            self.protocol(),
            self.checksum()
        )
    }
}

/// A mutable view of an IPv4 header.
///
/// Every setter raises the header's `modified` flag, whether or not the written value differs
/// from the previous one. No setter changes the length of the header.
#[derive(Debug)]
pub struct Ipv4Mut<'a> {
    data: &'a mut [u8],
    modified: &'a mut bool,
}

impl<'a> From<&'a Ipv4Mut<'_>> for Ipv4Ref<'a> {
    #[inline]
    fn from(value: &'a Ipv4Mut<'_>) -> Self {
        Ipv4Ref { data: value.data }
    }
}

impl<'a> Ipv4Mut<'a> {
    /// Creates a mutable view over the IPv4 header at the start of `bytes`, using `modified` as
    /// the header's dirty flag.
    #[inline]
    pub fn from_bytes(bytes: &'a mut [u8], modified: &'a mut bool) -> Result<Self, ValidationError> {
        let header_len = Ipv4Ref::validate(bytes)?;
        Ok(Ipv4Mut {
            data: &mut bytes[..header_len],
            modified,
        })
    }

    /// A read-only view of the header.
    #[inline]
    pub fn as_ref(&self) -> Ipv4Ref<'_> {
        Ipv4Ref::from(self)
    }

    /// Indicates whether any field has been set through this or a previous view.
    #[inline]
    pub fn is_modified(&self) -> bool {
        *self.modified
    }

    #[inline]
    pub fn set_tos(&mut self, tos: u8) {
        *self.modified = true;
        self.data[1] = tos;
    }

    #[inline]
    pub fn set_total_len(&mut self, total_len: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 2, total_len);
    }

    #[inline]
    pub fn set_id(&mut self, id: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 4, id);
    }

    #[inline]
    pub fn set_flags(&mut self, flags: Ipv4Flags) {
        *self.modified = true;
        self.data[6] &= 0b_0001_1111;
        self.data[6] |= flags.bits();
    }

    /// Sets the fragment offset (in units of 8 bytes); only the low 13 bits of `offset` are used.
    #[inline]
    pub fn set_frag_offset(&mut self, offset: u16) {
        *self.modified = true;
        self.data[6] &= 0b_1110_0000;
        self.data[6] |= ((offset >> 8) as u8) & 0b_0001_1111;
        self.data[7] = (offset & 0x00FF) as u8;
    }

    #[inline]
    pub fn set_ttl(&mut self, ttl: u8) {
        *self.modified = true;
        self.data[8] = ttl;
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: u8) {
        *self.modified = true;
        self.data[9] = protocol;
    }

    #[inline]
    pub fn set_checksum(&mut self, checksum: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 10, checksum);
    }

    #[inline]
    pub fn set_src_addr(&mut self, addr: Ipv4Addr) {
        *self.modified = true;
        self.data[12..16].copy_from_slice(&addr.octets());
    }

    #[inline]
    pub fn set_dst_addr(&mut self, addr: Ipv4Addr) {
        *self.modified = true;
        self.data[16..20].copy_from_slice(&addr.octets());
    }

    /// The raw options of the header.
    ///
    /// Options can be rewritten in place, but not resized.
    #[inline]
    pub fn options_mut(&mut self) -> &mut [u8] {
        *self.modified = true;
        &mut self.data[IPV4_MIN_HEADER_LEN..]
    }
}

bitflags! {
    /// The three flag bits of an IPv4 header, positioned as they appear in the header's 7th byte.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Ipv4Flags: u8 {
        const RESERVED = 0b_1000_0000;
        const DONT_FRAGMENT = 0b_0100_0000;
        const MORE_FRAGMENTS = 0b_0010_0000;
    }
}

/// A read-only view of an IPv6 header.
///
/// Extension headers are not interpreted; the header is always treated as 40 bytes long and its
/// Next Header field as the protocol of the payload.
///
/// ## Packet Layout
/// ```txt
///    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |Version| Traffic Class |               Flow Label              |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |         Payload Length        |  Next Header  |   Hop Limit   |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  8 Z                         Source Address                        Z
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 24 Z                      Destination Address                      Z
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Ipv6Ref<'a> {
    data: &'a [u8],
}

impl<'a> Ipv6Ref<'a> {
    pub const NAME: &'static str = "IPv6";

    #[inline]
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ValidationError> {
        Self::validate(bytes)?;
        Ok(Ipv6Ref {
            data: &bytes[..IPV6_HEADER_LEN],
        })
    }

    pub fn validate(bytes: &[u8]) -> Result<usize, ValidationError> {
        if bytes.len() < IPV6_HEADER_LEN {
            return Err(ValidationError::insufficient_bytes(
                Self::NAME,
                "insufficient bytes for 40-byte IPv6 header",
            ));
        }

        if bytes[0] >> 4 != 6 {
            return Err(ValidationError::invalid_value(
                Self::NAME,
                "version number of IPv6 header was not equal to 0x06",
            ));
        }

        Ok(IPV6_HEADER_LEN)
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn version(&self) -> u8 {
        self.data[0] >> 4
    }

    #[inline]
    pub fn traffic_class(&self) -> u8 {
        (self.data[0] << 4) | (self.data[1] >> 4)
    }

    #[inline]
    pub fn flow_label(&self) -> u32 {
        utils::read_u32(self.data, 0) & 0x000F_FFFF
    }

    /// The length of everything following the fixed 40-byte header.
    #[inline]
    pub fn payload_len(&self) -> u16 {
        utils::read_u16(self.data, 4)
    }

    #[inline]
    pub fn next_header(&self) -> u8 {
        self.data[6]
    }

    #[inline]
    pub fn hop_limit(&self) -> u8 {
        self.data[7]
    }

    #[inline]
    pub fn src_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(*utils::get_array::<16>(self.data, 8).unwrap_or(&[0; 16]))
    }

    #[inline]
    pub fn dst_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(*utils::get_array::<16>(self.data, 24).unwrap_or(&[0; 16]))
    }
}

impl fmt::Display for Ipv6Ref<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv6 {} -> {} class={:#04x} flow={:#07x} len={} next={} hops={}",
            self.src_addr(),
            self.dst_addr(),
            self.traffic_class(),
            self.flow_label(),
            self.payload_len(),
            self.next_header(),
            self.hop_limit()
        )
    }
}

/// A mutable view of an IPv6 header.
#[derive(Debug)]
pub struct Ipv6Mut<'a> {
    data: &'a mut [u8],
    modified: &'a mut bool,
}

impl<'a> From<&'a Ipv6Mut<'_>> for Ipv6Ref<'a> {
    #[inline]
    fn from(value: &'a Ipv6Mut<'_>) -> Self {
        Ipv6Ref { data: value.data }
    }
}

impl<'a> Ipv6Mut<'a> {
    #[inline]
    pub fn from_bytes(bytes: &'a mut [u8], modified: &'a mut bool) -> Result<Self, ValidationError> {
        Ipv6Ref::validate(bytes)?;
        Ok(Ipv6Mut {
            data: &mut bytes[..IPV6_HEADER_LEN],
            modified,
        })
    }

    #[inline]
    pub fn as_ref(&self) -> Ipv6Ref<'_> {
        Ipv6Ref::from(self)
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        *self.modified
    }

    #[inline]
    pub fn set_traffic_class(&mut self, traffic_class: u8) {
        *self.modified = true;
        self.data[0] = (self.data[0] & 0xF0) | (traffic_class >> 4);
        self.data[1] = (self.data[1] & 0x0F) | (traffic_class << 4);
    }

    /// Sets the flow label; only the low 20 bits of `flow_label` are used.
    #[inline]
    pub fn set_flow_label(&mut self, flow_label: u32) {
        *self.modified = true;
        self.data[1] = (self.data[1] & 0xF0) | ((flow_label >> 16) as u8 & 0x0F);
        self.data[2] = (flow_label >> 8) as u8;
        self.data[3] = flow_label as u8;
    }

    #[inline]
    pub fn set_payload_len(&mut self, payload_len: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 4, payload_len);
    }

    #[inline]
    pub fn set_next_header(&mut self, next_header: u8) {
        *self.modified = true;
        self.data[6] = next_header;
    }

    #[inline]
    pub fn set_hop_limit(&mut self, hop_limit: u8) {
        *self.modified = true;
        self.data[7] = hop_limit;
    }

    #[inline]
    pub fn set_src_addr(&mut self, addr: Ipv6Addr) {
        *self.modified = true;
        if let Some(field) = utils::get_mut_array::<16>(self.data, 8) {
            *field = addr.octets();
        }
    }

    #[inline]
    pub fn set_dst_addr(&mut self, addr: Ipv6Addr) {
        *self.modified = true;
        if let Some(field) = utils::get_mut_array::<16>(self.data, 24) {
            *field = addr.octets();
        }
    }
}
