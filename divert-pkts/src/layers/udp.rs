// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! User Datagram Protocol (UDP) header views.

use crate::error::ValidationError;
use crate::utils;

pub const UDP_HEADER_LEN: usize = 8;

/// A read-only view of a UDP header.
///
/// ## Packet Layout
/// ```txt
///    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |          Source Port          |        Destination Port       |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |             Length            |            Checksum           |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Copy, Debug)]
pub struct UdpRef<'a> {
    data: &'a [u8],
}

impl<'a> UdpRef<'a> {
    pub const NAME: &'static str = "UDP";

    #[inline]
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ValidationError> {
        Self::validate(bytes)?;
        Ok(UdpRef {
            data: &bytes[..UDP_HEADER_LEN],
        })
    }

    pub fn validate(bytes: &[u8]) -> Result<usize, ValidationError> {
        if bytes.len() < UDP_HEADER_LEN {
            Err(ValidationError::insufficient_bytes(
                Self::NAME,
                "insufficient bytes for 8-byte UDP header",
            ))
        } else {
            Ok(UDP_HEADER_LEN)
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        utils::read_u16(self.data, 0)
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        utils::read_u16(self.data, 2)
    }

    /// The length of the datagram (header and payload) as stated by the header.
    #[inline]
    pub fn length(&self) -> u16 {
        utils::read_u16(self.data, 4)
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        utils::read_u16(self.data, 6)
    }
}

#[derive(Debug)]
pub struct UdpMut<'a> {
    data: &'a mut [u8],
    modified: &'a mut bool,
}

impl<'a> From<&'a UdpMut<'_>> for UdpRef<'a> {
    #[inline]
    fn from(value: &'a UdpMut<'_>) -> Self {
        UdpRef { data: value.data }
    }
}

impl<'a> UdpMut<'a> {
    #[inline]
    pub fn from_bytes(bytes: &'a mut [u8], modified: &'a mut bool) -> Result<Self, ValidationError> {
        UdpRef::validate(bytes)?;
        Ok(UdpMut {
            data: &mut bytes[..UDP_HEADER_LEN],
            modified,
        })
    }

    #[inline]
    pub fn as_ref(&self) -> UdpRef<'_> {
        UdpRef::from(self)
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        *self.modified
    }

    #[inline]
    pub fn set_src_port(&mut self, port: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 0, port);
    }

    #[inline]
    pub fn set_dst_port(&mut self, port: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 2, port);
    }

    #[inline]
    pub fn set_length(&mut self, length: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 4, length);
    }

    #[inline]
    pub fn set_checksum(&mut self, checksum: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 6, checksum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_fixed_length() {
        let bytes = [0x00, 0x35, 0xC3, 0x50, 0x00, 0x0C, 0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF];
        let udp = UdpRef::from_bytes(&bytes).unwrap();
        assert_eq!(udp.src_port(), 53);
        assert_eq!(udp.dst_port(), 50000);
        assert_eq!(udp.length(), 12);
        assert_eq!(udp.checksum(), 0x1234);
        assert_eq!(udp.as_bytes().len(), UDP_HEADER_LEN);

        assert!(UdpRef::from_bytes(&bytes[..7]).is_err());
    }

    #[test]
    fn setters_mark_modified() {
        let mut bytes = [0u8; 8];
        let mut modified = false;
        let mut udp = UdpMut::from_bytes(&mut bytes, &mut modified).unwrap();
        udp.set_src_port(1);
        udp.set_dst_port(2);
        udp.set_length(8);
        assert_eq!(udp.as_ref().src_port(), 1);
        assert_eq!(udp.as_ref().dst_port(), 2);
        assert_eq!(udp.as_ref().length(), 8);
        drop(udp);
        assert!(modified);
    }
}
