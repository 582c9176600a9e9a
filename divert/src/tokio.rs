// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Asynchronous packet delivery for the `tokio` runtime.

use std::io;

use ::tokio::runtime::Handle;
use ::tokio::sync::mpsc;

use crate::{DivertHandle, Driver, Error, Packet, Result};

impl<D: Driver> DivertHandle<D> {
    /// Runs the receive loop on `tokio`'s blocking thread pool, publishing packets on a bounded
    /// channel of [`DivertConfig::queue_capacity`](crate::DivertConfig::queue_capacity) slots.
    ///
    /// Behaves like [`packets()`](Self::packets) otherwise. Must be called from within a `tokio`
    /// runtime.
    pub fn packets_async(&self) -> Result<mpsc::Receiver<Packet>> {
        if !self.is_open() {
            return Err(Error::HandleClosed);
        }

        let runtime = Handle::try_current()
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        let (tx, rx) = mpsc::channel(self.config().effective_queue_capacity());
        let handle = self.clone();
        runtime.spawn_blocking(move || {
            handle.run_recv_loop(|packet| tx.blocking_send(packet).is_ok())
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::MemoryDriver;
    use crate::{Address, DivertConfig, DivertHandle, Error};

    fn ipv4_icmp(seq: u8) -> Vec<u8> {
        vec![
            0x45, 0x00, 0x00, 0x1C, 0x00, 0x00, 0x00, 0x00, 0x40, 0x01, 0x00, 0x00, 10, 0, 0, 1,
            10, 0, 0, 2, 0x08, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, seq,
        ]
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn packets_arrive_on_async_channel() {
        let handle = DivertHandle::<MemoryDriver>::open(DivertConfig::default()).unwrap();
        for seq in 0..3 {
            handle.driver().feed(ipv4_icmp(seq), Address::default()).unwrap();
        }

        let mut packets = handle.packets_async().unwrap();
        for seq in 0..3 {
            let packet = packets.recv().await.unwrap();
            assert_eq!(packet.raw()[27], seq);
            assert_eq!(packet.next_header_protocol_name().unwrap(), "ICMPv4");
        }

        handle.close().unwrap();
        assert!(packets.recv().await.is_none());
        assert!(matches!(handle.packets_async(), Err(Error::HandleClosed)));
    }

    #[test]
    fn requires_runtime() {
        let handle = DivertHandle::<MemoryDriver>::open(DivertConfig::default()).unwrap();
        assert!(matches!(handle.packets_async(), Err(Error::Io(_))));
    }
}
