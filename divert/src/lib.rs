// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Packet diversion, inspection and reinjection.
//!
//! A [`DivertHandle`] wraps a packet diversion [`Driver`]: packets matching the handle's filter
//! are taken out of the network stack and handed to the application as [`Packet`]s, which can be
//! inspected, rewritten at the header level, and reinjected.
//!
//! ```no_run
//! use divert::memory::MemoryDriver;
//! use divert::{DivertConfig, DivertHandle};
//!
//! # fn main() -> divert::Result<()> {
//! let handle = DivertHandle::<MemoryDriver>::open(DivertConfig::default())?;
//! for mut packet in handle.packets()? {
//!     if packet.dst_port()? == 80 {
//!         packet.set_dst_port(8080)?;
//!     }
//!     packet.send(&handle)?;
//! }
//! # Ok(())
//! # }
//! ```

// Show required features on docs.rs.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![forbid(unsafe_code)]

mod address;
mod config;
mod driver;
mod error;
mod handle;
pub mod memory;
mod packet;
#[cfg(feature = "tokio")]
pub mod tokio;

pub use address::{Address, Direction};
pub use config::{DivertConfig, DivertFlags, Layer};
pub use driver::Driver;
pub use error::{Error, Result};
pub use handle::DivertHandle;
pub use packet::Packet;

pub use divert_common::{BufferPool, PooledBuffer, PACKET_BUFFER_SIZE};
pub use divert_pkts as pkts;

/// The default number of received packets that may be queued ahead of consumers.
pub const PACKET_CHAN_CAPACITY: usize = 256;
