// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use core::fmt;

const DIRECTION_BIT: u8 = 0b_0000_0001;

/// The direction a diverted packet was travelling in when it was captured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Outbound,
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => f.write_str("Outbound"),
            Direction::Inbound => f.write_str("Inbound"),
        }
    }
}

/// Metadata the driver attaches to a diverted packet.
///
/// The address must accompany the packet when it is reinjected so that the driver knows which
/// interface and direction to inject it on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Address {
    /// Driver timestamp of when the packet was captured.
    pub timestamp: i64,
    /// Index of the interface the packet was captured on.
    pub if_idx: u32,
    pub sub_if_idx: u32,
    /// Driver flags; bit 0 holds the direction, the remaining bits are opaque.
    pub data: u8,
}

impl Address {
    #[inline]
    pub fn new(if_idx: u32, sub_if_idx: u32, direction: Direction) -> Self {
        let mut addr = Address {
            if_idx,
            sub_if_idx,
            ..Default::default()
        };
        addr.set_direction(direction);
        addr
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        if self.data & DIRECTION_BIT != 0 {
            Direction::Inbound
        } else {
            Direction::Outbound
        }
    }

    /// Sets the direction bit, leaving the other flag bits intact.
    #[inline]
    pub fn set_direction(&mut self, direction: Direction) {
        match direction {
            Direction::Inbound => self.data |= DIRECTION_BIT,
            Direction::Outbound => self.data &= !DIRECTION_BIT,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ Timestamp: {}, Interface: {}, SubInterface: {}, Direction: {} }}",
            self.timestamp,
            self.if_idx,
            self.sub_if_idx,
            self.direction()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_is_bit_zero() {
        let mut addr = Address {
            data: 0b_1010_0000,
            ..Default::default()
        };
        assert_eq!(addr.direction(), Direction::Outbound);

        addr.set_direction(Direction::Inbound);
        assert_eq!(addr.data, 0b_1010_0001);
        assert_eq!(addr.direction(), Direction::Inbound);

        addr.set_direction(Direction::Outbound);
        assert_eq!(addr.data, 0b_1010_0000);
    }

    #[test]
    fn display() {
        assert_eq!(Direction::Inbound.to_string(), "Inbound");
        assert_eq!(Direction::Outbound.to_string(), "Outbound");
        let addr = Address::new(7, 1, Direction::Inbound);
        assert_eq!(
            addr.to_string(),
            "{ Timestamp: 0, Interface: 7, SubInterface: 1, Direction: Inbound }"
        );
    }
}
