// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! An in-process [`Driver`] that diverts packets fed to it by the application itself.
//!
//! Packets queued with [`MemoryDriver::feed()`] are handed out by `recv()` in order, and packets
//! injected with `send()` are recorded rather than transmitted. Checksums are computed in software
//! and only the constant filters `"true"` and `"false"` are understood.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;

use crate::{Address, DivertConfig, Driver};

type Diverted = (Vec<u8>, Address);

pub struct MemoryDriver {
    inbound_tx: Sender<Diverted>,
    inbound_rx: Receiver<Diverted>,
    // Dropping the sender wakes every receiver blocked in `recv()`.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    closed: AtomicBool,
    sent: Mutex<Vec<Diverted>>,
    checksum_calls: AtomicUsize,
}

impl MemoryDriver {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        Self {
            inbound_tx,
            inbound_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            checksum_calls: AtomicUsize::new(0),
        }
    }

    /// Queues a packet to be returned by a future `recv()`.
    pub fn feed(&self, packet: impl Into<Vec<u8>>, addr: Address) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::ErrorKind::NotConnected.into());
        }

        self.inbound_tx
            .send((packet.into(), addr))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    /// The number of fed packets not yet received.
    #[inline]
    pub fn pending(&self) -> usize {
        self.inbound_rx.len()
    }

    /// Every packet injected so far, in injection order.
    pub fn sent(&self) -> Vec<Diverted> {
        self.sent.lock().clone()
    }

    /// Removes and returns every packet injected so far.
    pub fn take_sent(&self) -> Vec<Diverted> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// The number of times checksums have been recalculated.
    #[inline]
    pub fn checksum_calls(&self) -> usize {
        self.checksum_calls.load(Ordering::Relaxed)
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(io::ErrorKind::NotConnected.into())
        } else {
            Ok(())
        }
    }

    fn eval_constant(filter: &str) -> Option<bool> {
        match filter.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }
}

impl Default for MemoryDriver {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MemoryDriver {
    fn open(config: &DivertConfig) -> io::Result<Self> {
        Self::check_filter(&config.filter).map_err(|position| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported filter (error at position {})", position),
            )
        })?;

        Ok(Self::new())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, Address)> {
        self.check_open()?;

        let (packet, addr) = select! {
            recv(self.inbound_rx) -> diverted => {
                diverted.map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?
            }
            recv(self.shutdown_rx) -> _ => return Err(io::ErrorKind::NotConnected.into()),
        };

        let Some(dst) = buf.get_mut(..packet.len()) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "receive buffer too small for diverted packet",
            ));
        };
        dst.copy_from_slice(&packet);

        Ok((packet.len(), addr))
    }

    fn send(&self, packet: &[u8], addr: &Address) -> io::Result<usize> {
        self.check_open()?;
        self.sent.lock().push((packet.to_vec(), *addr));
        Ok(packet.len())
    }

    fn calc_checksums(&self, packet: &mut [u8], _addr: &mut Address) -> io::Result<()> {
        self.checksum_calls.fetch_add(1, Ordering::Relaxed);
        divert_pkts::checksum::calc_checksums(packet)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn eval_filter(&self, filter: &str, _packet: &[u8], _addr: &Address) -> io::Result<bool> {
        Self::eval_constant(filter).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("filter {:?} cannot be evaluated in memory", filter),
            )
        })
    }

    fn check_filter(filter: &str) -> Result<(), usize> {
        Self::eval_constant(filter).map(|_| ()).ok_or(0)
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        self.shutdown_tx.lock().take();
        Ok(())
    }
}
