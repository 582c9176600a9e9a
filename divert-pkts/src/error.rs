// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

/// An error indicating that a header view could not be constructed over a region of bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("malformed {layer} header: {reason}")]
pub struct ValidationError {
    pub layer: &'static str,
    pub err_type: ValidationErrorType,
    pub reason: &'static str,
}

impl ValidationError {
    #[inline]
    pub(crate) const fn insufficient_bytes(layer: &'static str, reason: &'static str) -> Self {
        Self {
            layer,
            err_type: ValidationErrorType::InsufficientBytes,
            reason,
        }
    }

    #[inline]
    pub(crate) const fn invalid_value(layer: &'static str, reason: &'static str) -> Self {
        Self {
            layer,
            err_type: ValidationErrorType::InvalidValue,
            reason,
        }
    }

    #[inline]
    pub(crate) const fn invalid_size(layer: &'static str, reason: &'static str) -> Self {
        Self {
            layer,
            err_type: ValidationErrorType::InvalidSize,
            reason,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValidationErrorType {
    /// The header needs more bytes than are available to be well-formed.
    InsufficientBytes,
    /// A length field conflicts with the actual composition of the packet, or a length would no
    /// longer fit in its field.
    InvalidSize,
    /// A field holds a value that the header cannot be interpreted with (e.g. a bad version).
    InvalidValue,
}
