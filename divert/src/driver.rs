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

use crate::{Address, DivertConfig};

/// The primitives a packet diversion driver exposes.
///
/// A driver is shared between the thread running the receive loop and any number of threads
/// reinjecting packets, so every operation takes `&self`.
///
/// # Closing
///
/// Once [`close()`](Self::close) has been called, any blocked or subsequent call to
/// [`recv()`](Self::recv) or [`send()`](Self::send) must fail with an error of kind
/// [`io::ErrorKind::NotConnected`].
pub trait Driver: Send + Sync + 'static {
    /// Opens a driver handle for the given configuration.
    fn open(config: &DivertConfig) -> io::Result<Self>
    where
        Self: Sized;

    /// Blocks until a packet is diverted, writing it to the start of `buf`.
    ///
    /// Returns the number of bytes written along with the packet's metadata. On success, `buf`
    /// must not have been written to past the returned length, as the bytes beyond it are
    /// expected to remain zero.
    fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, Address)>;

    /// Injects `packet` into the network stack, returning the number of bytes injected.
    fn send(&self, packet: &[u8], addr: &Address) -> io::Result<usize>;

    /// Recomputes the checksums of `packet` in place.
    ///
    /// `packet` cannot be resized, so checksum recomputation never changes the packet's length.
    fn calc_checksums(&self, packet: &mut [u8], addr: &mut Address) -> io::Result<()>;

    /// Evaluates `filter` against a packet without diverting it.
    fn eval_filter(&self, filter: &str, packet: &[u8], addr: &Address) -> io::Result<bool>;

    /// Checks that `filter` is syntactically valid, returning the position of the first error
    /// if it isn't.
    fn check_filter(filter: &str) -> Result<(), usize>
    where
        Self: Sized;

    /// Closes the driver handle.
    fn close(&self) -> io::Result<()>;
}
