// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::io;

use divert_pkts::ValidationError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by packet and handle operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The packet bytes could not be interpreted as the header being accessed.
    #[error(transparent)]
    MalformedHeader(#[from] ValidationError),

    /// The operation requires a port-bearing transport header, but the packet carries a
    /// different protocol.
    #[error("protocol {protocol} has no ports")]
    ProtocolNotSupported { protocol: u8 },

    /// An IPv4 address was supplied for an IPv6 packet or vice versa.
    #[error("address family does not match the IP version of the packet")]
    AddressFamilyMismatch,

    #[error("packet of {len} bytes exceeds buffer capacity of {capacity} bytes")]
    PacketTooLarge { len: usize, capacity: usize },

    /// The handle has been closed, either explicitly or by the driver.
    #[error("divert handle is closed")]
    HandleClosed,

    #[error("packet injection failed: {0}")]
    InjectionFailed(#[source] io::Error),

    #[error("checksum recalculation failed: {0}")]
    ChecksumFailed(#[source] io::Error),

    #[error("filter evaluation failed: {0}")]
    Filter(#[source] io::Error),

    #[error("invalid filter (syntax error at position {position})")]
    InvalidFilter { position: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Indicates whether the error means the handle can no longer be used.
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::HandleClosed)
    }
}
