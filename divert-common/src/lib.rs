// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Buffer management shared between the `divert` crates.

#![forbid(unsafe_code)]

pub mod pool;

pub use pool::{BufferPool, PooledBuffer};

/// The size (in bytes) of every pooled packet buffer.
///
/// This is the diversion driver's maximum transmission unit upper bound: a 40-byte IPv6 header
/// followed by a maximally-sized (0xFFFF byte) payload.
pub const PACKET_BUFFER_SIZE: usize = 40 + 0xFFFF;
