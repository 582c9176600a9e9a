// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Transmission Control Protocol (TCP) segment views.

use core::fmt;

use bitflags::bitflags;

use crate::error::ValidationError;
use crate::utils;

/// The length of a TCP header that carries no options.
pub const TCP_MIN_HEADER_LEN: usize = 20;

/// A read-only view of a TCP segment (header, options and payload).
///
/// ## Packet Layout
/// ```txt
///    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |          Source Port          |        Destination Port       |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |                        Sequence Number                        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  8 |                    Acknowledgement Number                     |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 12 |Offset | Res |N|C|E|U|A|P|R|S|F|            Window             |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 16 |           Checksum            |         Urgent Pointer        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 20 Z                            Options                            Z
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// .. Z                            Payload                            Z
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Copy, Debug)]
pub struct TcpRef<'a> {
    data: &'a [u8],
}

impl<'a> TcpRef<'a> {
    pub const NAME: &'static str = "TCP";

    /// Creates a view over the TCP segment occupying all of `bytes`.
    #[inline]
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ValidationError> {
        Self::validate(bytes)?;
        Ok(TcpRef { data: bytes })
    }

    /// Checks that `bytes` begins with a well-formed TCP header, returning the header length.
    pub fn validate(bytes: &[u8]) -> Result<usize, ValidationError> {
        if bytes.len() < TCP_MIN_HEADER_LEN {
            return Err(ValidationError::insufficient_bytes(
                Self::NAME,
                "insufficient bytes for 20-byte TCP header",
            ));
        }

        let header_len = (bytes[12] >> 4) as usize * 4;
        if header_len < TCP_MIN_HEADER_LEN {
            return Err(ValidationError::invalid_value(
                Self::NAME,
                "invalid TCP data offset (must be a value of 5 or more)",
            ));
        }

        if bytes.len() < header_len {
            return Err(ValidationError::insufficient_bytes(
                Self::NAME,
                "insufficient bytes for TCP header length indicated by data offset",
            ));
        }

        Ok(header_len)
    }

    /// The bytes of the entire segment.
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

    #[inline]
    pub fn seq(&self) -> u32 {
        utils::read_u32(self.data, 4)
    }

    #[inline]
    pub fn ack(&self) -> u32 {
        utils::read_u32(self.data, 8)
    }

    /// The Data Offset field, in 32-bit words.
    #[inline]
    pub fn data_offset(&self) -> u8 {
        self.data[12] >> 4
    }

    /// The length of the header (including options) in bytes.
    #[inline]
    pub fn header_len(&self) -> usize {
        self.data_offset() as usize * 4
    }

    /// The three reserved bits that sit between the data offset and the flags.
    #[inline]
    pub fn reserved(&self) -> u8 {
        (self.data[12] >> 1) & 0b_0000_0111
    }

    #[inline]
    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_bits_truncate(utils::read_u16(self.data, 12))
    }

    #[inline]
    pub fn window(&self) -> u16 {
        utils::read_u16(self.data, 14)
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        utils::read_u16(self.data, 16)
    }

    #[inline]
    pub fn urgent_ptr(&self) -> u16 {
        utils::read_u16(self.data, 18)
    }

    #[inline]
    pub fn options(&self) -> &'a [u8] {
        &self.data[TCP_MIN_HEADER_LEN..self.header_len()]
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.header_len()..]
    }
}

impl fmt::Display for TcpRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TCP {} -> {} seq={:#x} ack={} hlen={} reserved={} flags=[",
            self.src_port(),
            self.dst_port(),
            self.seq(),
            self.ack(),
            self.header_len(),
            self.reserved()
        )?;
        for (i, (name, _)) in self.flags().iter_names().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(name)?;
        }
        write!(
            f,
            "] window={} checksum={:#06x} urgent={} options={:02x?} payload={} bytes",
            self.window(),
            self.checksum(),
            self.urgent_ptr(),
            self.options(),
            self.payload().len()
        )
    }
}

/// A mutable view of a TCP segment.
///
/// Unlike the other header views, a `TcpMut` may change the length of the segment it covers
/// through [`set_payload()`](Self::set_payload). To allow this, the view is constructed over the
/// entire writable region following the start of the segment, with the current segment length
/// tracked separately.
#[derive(Debug)]
pub struct TcpMut<'a> {
    data: &'a mut [u8],
    len: &'a mut usize,
    modified: &'a mut bool,
}

impl<'a> From<&'a TcpMut<'_>> for TcpRef<'a> {
    #[inline]
    fn from(value: &'a TcpMut<'_>) -> Self {
        TcpRef {
            data: &value.data[..*value.len],
        }
    }
}

impl<'a> TcpMut<'a> {
    /// Creates a mutable view over the first `*len` bytes of `bytes`.
    ///
    /// Bytes of `bytes` past `*len` are spare capacity that the payload may grow into; they are
    /// expected to be zero.
    pub fn from_bytes(
        bytes: &'a mut [u8],
        len: &'a mut usize,
        modified: &'a mut bool,
    ) -> Result<Self, ValidationError> {
        let Some(segment) = bytes.get(..*len) else {
            return Err(ValidationError::insufficient_bytes(
                TcpRef::NAME,
                "TCP segment length exceeds the available buffer",
            ));
        };
        TcpRef::validate(segment)?;

        Ok(TcpMut {
            data: bytes,
            len,
            modified,
        })
    }

    #[inline]
    pub fn as_ref(&self) -> TcpRef<'_> {
        TcpRef::from(self)
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        *self.modified
    }

    /// The current length of the segment (header and payload).
    #[inline]
    pub fn len(&self) -> usize {
        *self.len
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.as_ref().header_len()
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
    pub fn set_seq(&mut self, seq: u32) {
        *self.modified = true;
        utils::write_u32(self.data, 4, seq);
    }

    #[inline]
    pub fn set_ack(&mut self, ack: u32) {
        *self.modified = true;
        utils::write_u32(self.data, 8, ack);
    }

    /// Sets the reserved bits; only the low 3 bits of `reserved` are used.
    #[inline]
    pub fn set_reserved(&mut self, reserved: u8) {
        *self.modified = true;
        self.data[12] = (self.data[12] & 0b_1111_0001) | ((reserved & 0b_0000_0111) << 1);
    }

    #[inline]
    pub fn set_flags(&mut self, flags: TcpFlags) {
        *self.modified = true;
        let bits = flags.bits();
        self.data[12] = (self.data[12] & 0b_1111_1110) | ((bits >> 8) as u8 & 0b_0000_0001);
        self.data[13] = bits as u8;
    }

    /// Sets or clears a single flag, leaving all other flags untouched.
    #[inline]
    pub fn set_flag(&mut self, flag: TcpFlags, value: bool) {
        let mut flags = self.as_ref().flags();
        flags.set(flag, value);
        self.set_flags(flags);
    }

    #[inline]
    pub fn set_window(&mut self, window: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 14, window);
    }

    #[inline]
    pub fn set_checksum(&mut self, checksum: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 16, checksum);
    }

    #[inline]
    pub fn set_urgent_ptr(&mut self, urgent_ptr: u16) {
        *self.modified = true;
        utils::write_u16(self.data, 18, urgent_ptr);
    }

    /// The raw options of the header; options can be rewritten in place but not resized.
    #[inline]
    pub fn options_mut(&mut self) -> &mut [u8] {
        *self.modified = true;
        let header_len = self.header_len();
        &mut self.data[TCP_MIN_HEADER_LEN..header_len]
    }

    /// The payload of the segment, for in-place rewriting.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        *self.modified = true;
        let header_len = self.header_len();
        &mut self.data[header_len..*self.len]
    }

    /// Replaces the payload of the segment with `payload`, growing or shrinking the segment.
    ///
    /// Bytes vacated by a shrinking payload are zeroed. Fails without modifying anything if the
    /// new segment would not fit in the region the view was constructed over.
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<(), ValidationError> {
        let header_len = self.header_len();
        let new_len = header_len + payload.len();
        if new_len > self.data.len() {
            return Err(ValidationError::insufficient_bytes(
                TcpRef::NAME,
                "new TCP payload exceeds the space available to the segment",
            ));
        }

        self.data[header_len..new_len].copy_from_slice(payload);
        if new_len < *self.len {
            self.data[new_len..*self.len].fill(0);
        }

        *self.len = new_len;
        *self.modified = true;
        Ok(())
    }
}

bitflags! {
    /// The control bits of a TCP header, positioned as they appear in the header's 13th and 14th
    /// bytes (with the reserved bits masked out).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TcpFlags: u16 {
        const NS = 0b_0000_0001_0000_0000;
        const CWR = 0b_0000_0000_1000_0000;
        const ECE = 0b_0000_0000_0100_0000;
        const URG = 0b_0000_0000_0010_0000;
        const ACK = 0b_0000_0000_0001_0000;
        const PSH = 0b_0000_0000_0000_1000;
        const RST = 0b_0000_0000_0000_0100;
        const SYN = 0b_0000_0000_0000_0010;
        const FIN = 0b_0000_0000_0000_0001;
    }
}
