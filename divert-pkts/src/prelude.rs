// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

pub use crate::error::{ValidationError, ValidationErrorType};
pub use crate::layers::icmp::{Icmpv4Mut, Icmpv4Ref, Icmpv6Mut, Icmpv6Ref};
pub use crate::layers::ip::{Ipv4Flags, Ipv4Mut, Ipv4Ref, Ipv6Mut, Ipv6Ref};
pub use crate::layers::tcp::{TcpFlags, TcpMut, TcpRef};
pub use crate::layers::udp::{UdpMut, UdpRef};
pub use crate::layers::{
    protocol_name, IpHeader, IpHeaderMut, NextHeader, NextHeaderMut, PROTO_ICMPV4, PROTO_ICMPV6,
    PROTO_TCP, PROTO_UDP,
};
