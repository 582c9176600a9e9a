// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # General utility functions
//!
//! Big-endian field access and one's complement arithmetic shared by the header views. None of
//! these functions should be considered stable--they may be removed or changed at any release.

/// Sums `bytes` as a sequence of big-endian 16-bit words using one's complement addition,
/// padding an odd trailing byte with zero.
pub fn ones_complement_16bit(bytes: &[u8]) -> u16 {
    let mut res: u16 = 0;
    let mut iter = bytes.chunks_exact(2);
    for word in iter.by_ref() {
        res = ones_complement_add(res, u16::from_be_bytes([word[0], word[1]]));
    }

    if let [last] = iter.remainder() {
        res = ones_complement_add(res, u16::from(*last) << 8);
    }

    res
}

#[inline]
pub fn ones_complement_add(a: u16, b: u16) -> u16 {
    let (new, carry) = a.overflowing_add(b);
    if carry {
        new.wrapping_add(1)
    } else {
        new
    }
}

#[inline]
pub(crate) fn read_u16(bytes: &[u8], start: usize) -> u16 {
    u16::from_be_bytes([bytes[start], bytes[start + 1]])
}

#[inline]
pub(crate) fn read_u32(bytes: &[u8], start: usize) -> u32 {
    u32::from_be_bytes([
        bytes[start],
        bytes[start + 1],
        bytes[start + 2],
        bytes[start + 3],
    ])
}

#[inline]
pub(crate) fn write_u16(bytes: &mut [u8], start: usize, value: u16) {
    bytes[start..start + 2].copy_from_slice(&value.to_be_bytes());
}

#[inline]
pub(crate) fn write_u32(bytes: &mut [u8], start: usize, value: u32) {
    bytes[start..start + 4].copy_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn get_array<const T: usize>(bytes: &[u8], start: usize) -> Option<&[u8; T]> {
    bytes.get(start..start + T)?.try_into().ok()
}

#[inline]
pub fn get_mut_array<const T: usize>(bytes: &mut [u8], start: usize) -> Option<&mut [u8; T]> {
    bytes.get_mut(start..start + T)?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ones_complement_wraps_carry() {
        assert_eq!(ones_complement_add(0xFFFF, 0x0001), 0x0001);
        assert_eq!(ones_complement_add(0x8000, 0x8000), 0x0001);
        assert_eq!(ones_complement_add(0x1234, 0x0001), 0x1235);
    }

    #[test]
    fn odd_length_is_zero_padded() {
        assert_eq!(ones_complement_16bit(&[0x12, 0x34, 0x56]), 0x1234 + 0x5600);
        assert_eq!(ones_complement_16bit(&[]), 0);
    }

    #[test]
    fn array_access_is_bounds_checked() {
        let bytes = [1u8, 2, 3, 4];
        assert_eq!(get_array::<2>(&bytes, 2), Some(&[3, 4]));
        assert!(get_array::<2>(&bytes, 3).is_none());
    }
}
