// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Internet Control Message Protocol (ICMPv4 and ICMPv6) header views.
//!
//! Both versions share the same 8-byte header layout:
//!
//! ```txt
//!    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
//!    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  0 |      Type     |      Code     |            Checksum           |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  4 |                         Rest of Header                        |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::error::ValidationError;
use crate::utils;

pub const ICMP_HEADER_LEN: usize = 8;

macro_rules! icmp_header {
    ($(#[$meta:meta])* $name:ident, $mut_name:ident, $layer:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug)]
        pub struct $name<'a> {
            data: &'a [u8],
        }

        impl<'a> $name<'a> {
            pub const NAME: &'static str = $layer;

            #[inline]
            pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ValidationError> {
                Self::validate(bytes)?;
                Ok($name {
                    data: &bytes[..ICMP_HEADER_LEN],
                })
            }

            pub fn validate(bytes: &[u8]) -> Result<usize, ValidationError> {
                if bytes.len() < ICMP_HEADER_LEN {
                    Err(ValidationError::insufficient_bytes(
                        Self::NAME,
                        concat!("insufficient bytes for 8-byte ", $layer, " header"),
                    ))
                } else {
                    Ok(ICMP_HEADER_LEN)
                }
            }

            #[inline]
            pub fn as_bytes(&self) -> &'a [u8] {
                self.data
            }

            #[inline]
            pub fn icmp_type(&self) -> u8 {
                self.data[0]
            }

            #[inline]
            pub fn code(&self) -> u8 {
                self.data[1]
            }

            #[inline]
            pub fn checksum(&self) -> u16 {
                utils::read_u16(self.data, 2)
            }

            /// The type-specific final four bytes of the header.
            #[inline]
            pub fn rest_of_header(&self) -> u32 {
                utils::read_u32(self.data, 4)
            }

            /// The identifier of an echo request or reply.
            #[inline]
            pub fn identifier(&self) -> u16 {
                utils::read_u16(self.data, 4)
            }

            /// The sequence number of an echo request or reply.
            #[inline]
            pub fn sequence(&self) -> u16 {
                utils::read_u16(self.data, 6)
            }
        }

        #[derive(Debug)]
        pub struct $mut_name<'a> {
            data: &'a mut [u8],
            modified: &'a mut bool,
        }

        impl<'a> From<&'a $mut_name<'_>> for $name<'a> {
            #[inline]
            fn from(value: &'a $mut_name<'_>) -> Self {
                $name { data: value.data }
            }
        }

        impl<'a> $mut_name<'a> {
            #[inline]
            pub fn from_bytes(
                bytes: &'a mut [u8],
                modified: &'a mut bool,
            ) -> Result<Self, ValidationError> {
                $name::validate(bytes)?;
                Ok($mut_name {
                    data: &mut bytes[..ICMP_HEADER_LEN],
                    modified,
                })
            }

            #[inline]
            pub fn as_ref(&self) -> $name<'_> {
                $name::from(self)
            }

            #[inline]
            pub fn is_modified(&self) -> bool {
                *self.modified
            }

            #[inline]
            pub fn set_icmp_type(&mut self, icmp_type: u8) {
                *self.modified = true;
                self.data[0] = icmp_type;
            }

            #[inline]
            pub fn set_code(&mut self, code: u8) {
                *self.modified = true;
                self.data[1] = code;
            }

            #[inline]
            pub fn set_checksum(&mut self, checksum: u16) {
                *self.modified = true;
                utils::write_u16(self.data, 2, checksum);
            }

            #[inline]
            pub fn set_rest_of_header(&mut self, rest: u32) {
                *self.modified = true;
                utils::write_u32(self.data, 4, rest);
            }
        }
    };
}

icmp_header!(
    /// A read-only view of an ICMPv4 header.
    Icmpv4Ref,
    Icmpv4Mut,
    "ICMPv4"
);

icmp_header!(
    /// A read-only view of an ICMPv6 header.
    Icmpv6Ref,
    Icmpv6Mut,
    "ICMPv6"
);

/// ICMPv4 Echo Request message type.
pub const ICMPV4_ECHO_REQUEST: u8 = 8;
/// ICMPv4 Echo Reply message type.
pub const ICMPV4_ECHO_REPLY: u8 = 0;
/// ICMPv6 Echo Request message type.
pub const ICMPV6_ECHO_REQUEST: u8 = 128;
/// ICMPv6 Echo Reply message type.
pub const ICMPV6_ECHO_REPLY: u8 = 129;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorType;

    #[test]
    fn echo_request_fields() {
        let bytes = [ICMPV4_ECHO_REQUEST, 0, 0xF7, 0xFE, 0x00, 0x01, 0x00, 0x02, 0xAA];
        let icmp = Icmpv4Ref::from_bytes(&bytes).unwrap();
        assert_eq!(icmp.icmp_type(), ICMPV4_ECHO_REQUEST);
        assert_eq!(icmp.code(), 0);
        assert_eq!(icmp.checksum(), 0xF7FE);
        assert_eq!(icmp.identifier(), 1);
        assert_eq!(icmp.sequence(), 2);
        assert_eq!(icmp.rest_of_header(), 0x0001_0002);
        assert_eq!(icmp.as_bytes().len(), ICMP_HEADER_LEN);
    }

    #[test]
    fn short_header_names_version() {
        let err = Icmpv6Ref::from_bytes(&[0u8; 7]).unwrap_err();
        assert_eq!(err.layer, "ICMPv6");
        assert_eq!(err.err_type, ValidationErrorType::InsufficientBytes);
    }

    #[test]
    fn rewriting_echo_request_into_reply() {
        let mut bytes = [ICMPV6_ECHO_REQUEST, 0, 0, 0, 0, 0, 0, 0];
        let mut modified = false;
        let mut icmp = Icmpv6Mut::from_bytes(&mut bytes, &mut modified).unwrap();
        icmp.set_icmp_type(ICMPV6_ECHO_REPLY);
        icmp.set_rest_of_header(0x1234_5678);
        assert_eq!(icmp.as_ref().icmp_type(), ICMPV6_ECHO_REPLY);
        assert_eq!(icmp.as_ref().identifier(), 0x1234);
        assert!(icmp.is_modified());
    }
}
