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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;
use divert_common::BufferPool;

use crate::{DivertConfig, Driver, Error, Packet, Result};

struct HandleInner<D: Driver> {
    driver: D,
    open: AtomicBool,
    pool: BufferPool,
    config: DivertConfig,
}

impl<D: Driver> Drop for HandleInner<D> {
    fn drop(&mut self) {
        if *self.open.get_mut() {
            if let Err(e) = self.driver.close() {
                log::warn!("failed to close divert driver: {}", e);
            }
        }
    }
}

/// An open packet diversion session.
///
/// Packets matching the configured filter are diverted away from the network stack and can be
/// received through [`recv()`](Self::recv) or the queue returned by [`packets()`](Self::packets).
/// Received packets can be inspected, modified and reinjected with [`Packet::send()`].
///
/// `DivertHandle` is a cheaply cloneable handle; all clones refer to the same driver session, and
/// closing any of them closes the session for all.
pub struct DivertHandle<D: Driver> {
    inner: Arc<HandleInner<D>>,
}

impl<D: Driver> Clone for DivertHandle<D> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Driver> DivertHandle<D> {
    /// Opens a new driver session using `config`, with packets received into buffers from a
    /// newly created pool.
    pub fn open(config: DivertConfig) -> Result<Self> {
        let driver = D::open(&config)?;
        Ok(Self::with_driver(driver, config, BufferPool::new()))
    }

    /// Wraps an already-opened driver session.
    pub fn with_driver(driver: D, config: DivertConfig, pool: BufferPool) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                driver,
                open: AtomicBool::new(true),
                pool,
                config,
            }),
        }
    }

    #[inline]
    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    #[inline]
    pub fn config(&self) -> &DivertConfig {
        &self.inner.config
    }

    /// The pool received packets are allocated from.
    #[inline]
    pub fn pool(&self) -> &BufferPool {
        &self.inner.pool
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    fn map_closed(&self, e: io::Error, other: fn(io::Error) -> Error) -> Error {
        if e.kind() == io::ErrorKind::NotConnected || !self.is_open() {
            Error::HandleClosed
        } else {
            other(e)
        }
    }

    /// Blocks until a packet is diverted and returns it.
    pub fn recv(&self) -> Result<Packet> {
        if !self.is_open() {
            return Err(Error::HandleClosed);
        }

        let mut buffer = self.inner.pool.acquire();
        let (len, addr) = match self.inner.driver.recv(buffer.storage_mut()) {
            Ok(received) => received,
            Err(e) => {
                // The driver may have written into the buffer before failing.
                buffer.storage_mut().fill(0);
                return Err(self.map_closed(e, Error::Io));
            }
        };

        if len > buffer.capacity() {
            buffer.storage_mut().fill(0);
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "driver reported a packet longer than the receive buffer",
            )));
        }
        buffer.set_len(len);

        Ok(Packet::new(buffer, addr))
    }

    /// Injects `packet` as-is, returning the number of bytes injected.
    ///
    /// Checksums are not recalculated; see [`Packet::send()`] for that.
    pub fn send(&self, packet: &Packet) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::HandleClosed);
        }

        self.inner
            .driver
            .send(packet.raw(), packet.address())
            .map_err(|e| self.map_closed(e, Error::InjectionFailed))
    }

    /// Recalculates the checksums of `packet` in place.
    pub fn calc_checksums(&self, packet: &mut Packet) -> Result<()> {
        let (raw, addr) = packet.raw_and_address_mut();
        self.inner
            .driver
            .calc_checksums(raw, addr)
            .map_err(Error::ChecksumFailed)
    }

    /// Evaluates `filter` against `packet` without diverting anything.
    pub fn eval_filter(&self, packet: &Packet, filter: &str) -> Result<bool> {
        self.inner
            .driver
            .eval_filter(filter, packet.raw(), packet.address())
            .map_err(Error::Filter)
    }

    /// Checks the syntax of `filter`.
    pub fn check_filter(filter: &str) -> Result<()> {
        D::check_filter(filter).map_err(|position| Error::InvalidFilter { position })
    }

    /// Closes the session.
    ///
    /// Any receive blocked on the driver fails with [`Error::HandleClosed`], which terminates a
    /// running receive loop. Closing an already closed handle does nothing.
    pub fn close(&self) -> Result<()> {
        if self.inner.open.swap(false, Ordering::AcqRel) {
            self.inner.driver.close()?;
        }
        Ok(())
    }

    /// Starts a background thread that receives packets and publishes them on a bounded queue of
    /// [`DivertConfig::queue_capacity`] slots.
    ///
    /// The thread blocks while the queue is full. It stops on the first receive error (such as
    /// the handle being closed) or once every receiver has been dropped; packets already queued
    /// remain available to receivers, after which the queue reports disconnection.
    pub fn packets(&self) -> Result<Receiver<Packet>> {
        if !self.is_open() {
            return Err(Error::HandleClosed);
        }

        let (tx, rx) = crossbeam_channel::bounded(self.inner.config.effective_queue_capacity());
        let handle = self.clone();
        thread::Builder::new()
            .name(String::from("divert-recv"))
            .spawn(move || handle.run_recv_loop(|packet| tx.send(packet).is_ok()))?;

        Ok(rx)
    }

    /// Receives packets until an error occurs or `publish` reports that nobody is listening.
    pub(crate) fn run_recv_loop(&self, mut publish: impl FnMut(Packet) -> bool) {
        log::debug!("receive loop started (filter: {:?})", self.inner.config.filter);
        loop {
            match self.recv() {
                Ok(packet) => {
                    if !publish(packet) {
                        log::debug!("all packet receivers dropped");
                        break;
                    }
                }
                Err(e) if e.is_closed() => {
                    log::debug!("divert handle closed");
                    break;
                }
                Err(e) => {
                    log::error!("failed to receive diverted packet: {}", e);
                    break;
                }
            }
        }
        log::debug!("receive loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::memory::MemoryDriver;
    use crate::{Address, Direction};

    fn ipv4_udp(src_port: u16) -> Vec<u8> {
        let mut bytes = vec![
            0x45, 0x00, 0x00, 0x1E, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00, 192, 168, 0, 1,
            192, 168, 0, 2,
        ];
        bytes.extend(src_port.to_be_bytes());
        bytes.extend([0x00, 0x35, 0x00, 0x0A, 0x00, 0x00, b'o', b'k']);
        bytes
    }

    fn open() -> DivertHandle<MemoryDriver> {
        DivertHandle::open(DivertConfig::default()).unwrap()
    }

    /// Writes over the start of the receive buffer, then fails or reports `reported_len`.
    struct ScribblingDriver {
        reported_len: Option<usize>,
    }

    impl Driver for ScribblingDriver {
        fn open(_config: &DivertConfig) -> io::Result<Self> {
            Ok(ScribblingDriver { reported_len: None })
        }

        fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, Address)> {
            buf[..100].fill(0xFF);
            match self.reported_len {
                Some(len) => Ok((len, Address::default())),
                None => Err(io::Error::new(io::ErrorKind::Other, "device error")),
            }
        }

        fn send(&self, packet: &[u8], _addr: &Address) -> io::Result<usize> {
            Ok(packet.len())
        }

        fn calc_checksums(&self, _packet: &mut [u8], _addr: &mut Address) -> io::Result<()> {
            Ok(())
        }

        fn eval_filter(&self, _filter: &str, _packet: &[u8], _addr: &Address) -> io::Result<bool> {
            Ok(true)
        }

        fn check_filter(_filter: &str) -> std::result::Result<(), usize> {
            Ok(())
        }

        fn close(&self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_receive_returns_zeroed_buffer() {
        for reported_len in [None, Some(divert_common::PACKET_BUFFER_SIZE + 1)] {
            let handle = DivertHandle::with_driver(
                ScribblingDriver { reported_len },
                DivertConfig::default(),
                BufferPool::new(),
            );
            assert!(matches!(handle.recv(), Err(Error::Io(_))));
            assert_eq!(handle.pool().idle(), 1);

            let buffer = handle.pool().acquire();
            assert!(buffer.storage().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn recv_wraps_driver_packets() {
        let handle = open();
        let addr = Address::new(3, 0, Direction::Inbound);
        handle.driver().feed(ipv4_udp(4000), addr).unwrap();

        let packet = handle.recv().unwrap();
        assert_eq!(packet.len(), 30);
        assert_eq!(packet.src_port().unwrap(), 4000);
        assert_eq!(packet.direction(), Direction::Inbound);
        assert_eq!(packet.address().if_idx, 3);
        assert_eq!(handle.pool().allocated(), 1);
    }

    #[test]
    fn closed_handle_refuses_operations() {
        let handle = open();
        let packet = Packet::from_bytes(handle.pool(), &ipv4_udp(1), Address::default()).unwrap();
        handle.close().unwrap();
        handle.close().unwrap();
        assert!(!handle.is_open());

        assert!(matches!(handle.recv(), Err(Error::HandleClosed)));
        assert!(matches!(handle.send(&packet), Err(Error::HandleClosed)));
        assert!(matches!(handle.packets(), Err(Error::HandleClosed)));
        assert!(handle.recv().unwrap_err().is_closed());
        assert!(!Error::AddressFamilyMismatch.is_closed());
    }

    #[test]
    fn open_rejects_unsupported_filter() {
        let result = DivertHandle::<MemoryDriver>::open(DivertConfig::new("tcp.DstPort == 80"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn filter_helpers() {
        let handle = open();
        let packet = Packet::from_bytes(handle.pool(), &ipv4_udp(1), Address::default()).unwrap();
        assert!(handle.eval_filter(&packet, "true").unwrap());
        assert!(!packet.eval_filter(&handle, "false").unwrap());
        assert!(matches!(
            handle.eval_filter(&packet, "udp"),
            Err(Error::Filter(_))
        ));

        assert!(DivertHandle::<MemoryDriver>::check_filter("true").is_ok());
        assert!(matches!(
            DivertHandle::<MemoryDriver>::check_filter("udp and"),
            Err(Error::InvalidFilter { position: 0 })
        ));
    }

    #[test]
    fn packets_are_queued_in_order() {
        let handle = open();
        for port in 1..=5 {
            handle.driver().feed(ipv4_udp(port), Address::default()).unwrap();
        }

        let packets = handle.packets().unwrap();
        for port in 1..=5 {
            let packet = packets.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(packet.src_port().unwrap(), port);
        }
        handle.close().unwrap();
    }

    #[test]
    fn close_mid_loop_stops_delivery() {
        let config = DivertConfig::default().with_queue_capacity(4);
        let handle = DivertHandle::<MemoryDriver>::open(config).unwrap();
        let packets = handle.packets().unwrap();

        handle.driver().feed(ipv4_udp(10), Address::default()).unwrap();
        handle.driver().feed(ipv4_udp(11), Address::default()).unwrap();

        // wait for both packets to be queued before closing
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while packets.len() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(packets.len(), 2);

        // the loop is now blocked in the driver, and the close fails that receive
        handle.close().unwrap();

        let first = packets.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = packets.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.src_port().unwrap(), 10);
        assert_eq!(second.src_port().unwrap(), 11);
        assert!(matches!(
            packets.recv_timeout(Duration::from_secs(5)),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn loop_stops_when_receivers_dropped() {
        let handle = open();
        let packets = handle.packets().unwrap();
        drop(packets);

        // the loop only notices on its next publish
        handle.driver().feed(ipv4_udp(1), Address::default()).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while Arc::strong_count(&handle.inner) > 1 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(Arc::strong_count(&handle.inner), 1);
        assert!(handle.is_open());
    }

    #[test]
    fn workers_share_the_queue() {
        let handle = open();
        let packets = handle.packets().unwrap();
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let packets = packets.clone();
                let handle = handle.clone();
                thread::spawn(move || {
                    let mut forwarded = 0;
                    while let Ok(mut packet) = packets.recv() {
                        packet.set_dst_port(5353).unwrap();
                        packet.send(&handle).unwrap();
                        forwarded += 1;
                    }
                    forwarded
                })
            })
            .collect();
        drop(packets);

        for port in 0..100 {
            handle.driver().feed(ipv4_udp(port), Address::default()).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while handle.driver().sent().len() < 100 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        handle.close().unwrap();

        let forwarded: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(forwarded, 100);

        let sent = handle.driver().sent();
        assert_eq!(sent.len(), 100);
        assert!(sent
            .iter()
            .all(|(bytes, _)| u16::from_be_bytes([bytes[22], bytes[23]]) == 5353));
        assert_eq!(handle.driver().checksum_calls(), 100);
        assert_eq!(handle.pool().allocated(), handle.pool().idle());
    }
}
