// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Zero-copy views for decoding and modifying the IP and transport headers of diverted packets.
//!
//! Views borrow the bytes of a packet rather than copying them out, and are cheap enough to be
//! recreated (and revalidated) on every access.

#![forbid(unsafe_code)]
#![allow(clippy::len_without_is_empty)]

pub mod checksum;
pub mod error;
pub mod layers;
pub mod prelude;
pub mod utils;

pub use error::{ValidationError, ValidationErrorType};
