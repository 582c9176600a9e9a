// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Software computation of IP and transport checksums (RFC 1071).
//!
//! Diversion drivers normally provide their own checksum routine; this one exists for drivers
//! that don't (such as in-memory test drivers). It never changes the length of the packet.

use crate::error::ValidationError;
use crate::layers::ip::{Ipv4Ref, Ipv6Ref};
use crate::layers::tcp::TcpRef;
use crate::layers::{PROTO_ICMPV4, PROTO_ICMPV6, PROTO_TCP, PROTO_UDP};
use crate::utils::{self, ones_complement_16bit};

/// Recomputes, in place, every checksum of the IP packet in `packet`.
///
/// For IPv4 the header checksum is computed; for both versions the checksum of a TCP, UDP,
/// ICMPv4 or ICMPv6 payload is computed (using the pseudo-header where the protocol calls for
/// one). Payloads of any other protocol are left as they are. The whole of `packet` is treated as
/// the IP packet, regardless of what its length fields state.
pub fn calc_checksums(packet: &mut [u8]) -> Result<(), ValidationError> {
    match packet.first().map(|b| b >> 4) {
        Some(6) => {
            let ip = Ipv6Ref::from_bytes(packet)?;
            let header_len = ip.as_bytes().len();
            let protocol = ip.next_header();
            let segment_len = packet.len() - header_len;

            let mut pseudo = ones_complement_16bit(&packet[8..40]);
            pseudo = utils::ones_complement_add(pseudo, (segment_len >> 16) as u16);
            pseudo = utils::ones_complement_add(pseudo, segment_len as u16);
            pseudo = utils::ones_complement_add(pseudo, protocol as u16);

            transport_checksum(&mut packet[header_len..], protocol, pseudo)
        }
        _ => {
            let ip = Ipv4Ref::from_bytes(packet)?;
            let header_len = ip.header_len();
            let protocol = ip.protocol();
            let Ok(segment_len) = u16::try_from(packet.len() - header_len) else {
                return Err(ValidationError::invalid_size(
                    Ipv4Ref::NAME,
                    "IPv4 packet too long for its payload length to fit the pseudo-header",
                ));
            };

            utils::write_u16(packet, 10, 0);
            let header_sum = ones_complement_16bit(&packet[..header_len]);
            utils::write_u16(packet, 10, !header_sum);

            let mut pseudo = ones_complement_16bit(&packet[12..20]);
            pseudo = utils::ones_complement_add(pseudo, segment_len);
            pseudo = utils::ones_complement_add(pseudo, protocol as u16);

            transport_checksum(&mut packet[header_len..], protocol, pseudo)
        }
    }
}

fn transport_checksum(segment: &mut [u8], protocol: u8, pseudo: u16) -> Result<(), ValidationError> {
    let checksum_offset = match protocol {
        PROTO_TCP => {
            TcpRef::validate(segment)?;
            16
        }
        PROTO_UDP | PROTO_ICMPV4 | PROTO_ICMPV6 if segment.len() < 8 => {
            return Err(ValidationError::insufficient_bytes(
                crate::layers::protocol_name(protocol),
                "insufficient bytes for 8-byte transport header",
            ))
        }
        PROTO_UDP => 6,
        PROTO_ICMPV4 | PROTO_ICMPV6 => 2,
        _ => return Ok(()),
    };

    utils::write_u16(segment, checksum_offset, 0);
    let mut sum = ones_complement_16bit(segment);
    // ICMPv4 is the only one of these without a pseudo-header
    if protocol != PROTO_ICMPV4 {
        sum = utils::ones_complement_add(sum, pseudo);
    }

    let mut checksum = !sum;
    if protocol == PROTO_UDP && checksum == 0 {
        checksum = 0xFFFF;
    }
    utils::write_u16(segment, checksum_offset, checksum);

    Ok(())
}
