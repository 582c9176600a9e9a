// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use bitflags::bitflags;

use crate::PACKET_CHAN_CAPACITY;

/// The layer of the network stack a handle diverts packets from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Packets sent to or from the local machine.
    #[default]
    Network,
    /// Packets passing through the local machine.
    NetworkForward,
}

impl Layer {
    /// The numeric value drivers use to identify the layer.
    #[inline]
    pub fn as_raw(self) -> u32 {
        match self {
            Layer::Network => 0,
            Layer::NetworkForward => 1,
        }
    }
}

bitflags! {
    /// Flags controlling how the driver treats matched packets.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DivertFlags: u64 {
        /// Receive copies of matched packets; the originals continue through the network stack.
        const SNIFF = 1;
        /// Silently drop matched packets.
        const DROP = 2;
        /// Have the driver report its own debugging information.
        const DEBUG = 4;
    }
}

/// Configuration for opening a [`DivertHandle`](crate::DivertHandle).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DivertConfig {
    /// Filter expression selecting which packets are diverted. The expression is passed to the
    /// driver verbatim.
    pub filter: String,
    pub layer: Layer,
    /// Priority of the handle relative to other handles on the same layer.
    pub priority: i16,
    pub flags: DivertFlags,
    /// Number of packets the receive loop may queue ahead of consumers.
    pub queue_capacity: usize,
}

impl Default for DivertConfig {
    fn default() -> Self {
        Self {
            filter: String::from("true"),
            layer: Layer::Network,
            priority: 0,
            flags: DivertFlags::empty(),
            queue_capacity: PACKET_CHAN_CAPACITY,
        }
    }
}

impl DivertConfig {
    #[inline]
    pub fn new(filter: impl Into<String>) -> Self {
        Self::default().with_filter(filter)
    }

    #[inline]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    #[inline]
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    #[inline]
    pub fn with_priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    #[inline]
    pub fn with_flags(mut self, flags: DivertFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the receive queue capacity. A capacity of 0 is raised to 1, as the receive loop
    /// requires at least one slot to hand packets over.
    #[inline]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// The queue capacity actually used by the receive loop.
    #[inline]
    pub(crate) fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DivertConfig::default();
        assert_eq!(config.filter, "true");
        assert_eq!(config.layer, Layer::Network);
        assert_eq!(config.priority, 0);
        assert!(config.flags.is_empty());
        assert_eq!(config.queue_capacity, 256);
    }

    #[test]
    fn builder_clamps_capacity() {
        let config = DivertConfig::new("tcp.DstPort == 80")
            .with_layer(Layer::NetworkForward)
            .with_priority(-100)
            .with_flags(DivertFlags::SNIFF | DivertFlags::DEBUG)
            .with_queue_capacity(0);
        assert_eq!(config.filter, "tcp.DstPort == 80");
        assert_eq!(config.layer.as_raw(), 1);
        assert_eq!(config.priority, -100);
        assert_eq!(config.flags.bits(), 5);
        assert_eq!(config.queue_capacity, 1);

        let mut raw = DivertConfig::default();
        raw.queue_capacity = 0;
        assert_eq!(raw.effective_queue_capacity(), 1);
    }
}
