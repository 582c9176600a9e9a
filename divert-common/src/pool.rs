// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Reusable fixed-size packet buffers.
//!
//! Diversion workloads churn through packets at a very high rate, so rather than allocating a
//! fresh 64 KiB buffer for every received packet, buffers are checked out of a [`BufferPool`]
//! and handed back once the packet they hold has been sent or dropped.

use core::{cmp, fmt, mem};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::PACKET_BUFFER_SIZE;

struct PoolInner {
    idle: Mutex<Vec<Box<[u8]>>>,
    max_idle: usize,
    allocated: AtomicUsize,
}

/// A thread-safe pool of [`PACKET_BUFFER_SIZE`]-byte buffers.
///
/// `BufferPool` is a cheaply cloneable handle; all clones refer to the same set of idle buffers.
/// Pools are constructed explicitly and passed to whatever needs them, so independent components
/// (or independent tests) never share buffers unless they are handed the same pool.
///
/// Every buffer handed out by [`acquire()`](Self::acquire) is entirely zeroed: fresh buffers are
/// zero-initialized on allocation, and recycled buffers have their used region zeroed on
/// [`release()`](Self::release).
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Creates a pool that retains every released buffer for reuse.
    #[inline]
    pub fn new() -> Self {
        Self::with_max_idle(usize::MAX)
    }

    /// Creates a pool that retains at most `max_idle` released buffers; any buffer released while
    /// the pool already holds `max_idle` idle buffers is deallocated instead.
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                max_idle,
                allocated: AtomicUsize::new(0),
            }),
        }
    }

    /// Checks a zeroed buffer of exactly [`PACKET_BUFFER_SIZE`] bytes out of the pool, allocating
    /// a new one if no idle buffer is available.
    ///
    /// The returned buffer has a logical length of 0.
    pub fn acquire(&self) -> PooledBuffer {
        let recycled = self.inner.idle.lock().pop();
        let storage = match recycled {
            Some(storage) => storage,
            None => {
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                vec![0u8; PACKET_BUFFER_SIZE].into_boxed_slice()
            }
        };

        PooledBuffer {
            storage,
            len: 0,
            pool: self.clone(),
        }
    }

    /// Returns `storage` to the pool, zeroing its first `used_len` bytes.
    ///
    /// Buffers whose length is not [`PACKET_BUFFER_SIZE`] did not come from a pool and are simply
    /// dropped. Callers must ensure that any bytes past `used_len` are already zero.
    pub fn release(&self, mut storage: Box<[u8]>, used_len: usize) {
        if storage.len() != PACKET_BUFFER_SIZE {
            log::trace!(
                "dropping foreign {}-byte buffer instead of pooling it",
                storage.len()
            );
            return;
        }

        let used = cmp::min(used_len, storage.len());
        storage[..used].fill(0);

        let mut idle = self.inner.idle.lock();
        if idle.len() < self.inner.max_idle {
            idle.push(storage);
        }
    }

    /// The number of buffers currently sitting idle in the pool.
    #[inline]
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// The total number of buffers this pool has ever allocated.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }
}

impl Default for BufferPool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("idle", &self.idle())
            .field("allocated", &self.allocated())
            .finish()
    }
}

/// A packet buffer checked out of a [`BufferPool`].
///
/// The buffer has a fixed capacity of [`PACKET_BUFFER_SIZE`] bytes and a tracked logical length;
/// only the first `len()` bytes are considered part of the packet. Bytes past the logical length
/// are kept zeroed, which lets the pool restore a fully zeroed buffer by clearing only the logical
/// region.
///
/// Dropping a `PooledBuffer` returns it to the pool it came from.
pub struct PooledBuffer {
    storage: Box<[u8]>,
    len: usize,
    pool: BufferPool,
}

impl PooledBuffer {
    /// The logical contents of the buffer.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// The logical contents of the buffer.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[..self.len]
    }

    /// The entire backing storage, including bytes past the logical length.
    #[inline]
    pub fn storage(&self) -> &[u8] {
        &self.storage
    }

    /// The entire backing storage, including bytes past the logical length.
    ///
    /// Anything written past the logical length must either be brought into the logical region
    /// via [`set_len()`](Self::set_len) or zeroed again before the buffer is dropped.
    #[inline]
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Sets the logical length of the buffer.
    ///
    /// Shrinking the buffer zeroes the bytes that fall out of the logical region.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the capacity of the buffer.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.storage.len());
        if len < self.len {
            self.storage[len..self.len].fill(0);
        }
        self.len = len;
    }

    /// Appends the provided bytes to the buffer, or returns `None` if insufficient space is
    /// available.
    #[inline]
    pub fn try_append(&mut self, bytes: &[u8]) -> Option<()> {
        let dst = self.storage.get_mut(self.len..self.len + bytes.len())?;
        dst.copy_from_slice(bytes);
        self.len += bytes.len();
        Some(())
    }

    /// The logical length of the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The total number of bytes the buffer can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// The number of unused bytes in the buffer.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.storage.len() - self.len
    }

    /// The pool this buffer will be returned to.
    #[inline]
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let storage = mem::take(&mut self.storage);
        self.pool.release(storage, self.len);
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    #[test]
    fn acquired_buffers_have_fixed_capacity() {
        let pool = BufferPool::new();
        let buf = pool.acquire();
        assert_eq!(buf.capacity(), PACKET_BUFFER_SIZE);
        assert_eq!(buf.capacity(), 65575);
        assert!(buf.is_empty());
        assert!(buf.storage().iter().all(|&b| b == 0));
    }

    #[test]
    fn release_zeroes_used_region() {
        let pool = BufferPool::new();
        let mut storage = vec![0u8; PACKET_BUFFER_SIZE].into_boxed_slice();
        storage[..100].fill(0xAB);
        pool.release(storage, 100);
        assert_eq!(pool.idle(), 1);

        let buf = pool.acquire();
        assert_eq!(pool.idle(), 0);
        assert_eq!(buf.capacity(), PACKET_BUFFER_SIZE);
        assert!(buf.storage()[..100].iter().all(|&b| b == 0));
    }

    #[test]
    fn dropped_buffer_returns_zeroed() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        buf.try_append(&[0xFF; 1500]).unwrap();
        assert_eq!(buf.len(), 1500);
        drop(buf);

        assert_eq!(pool.idle(), 1);
        let buf = pool.acquire();
        assert_eq!(pool.allocated(), 1);
        assert!(buf.storage()[..1500].iter().all(|&b| b == 0));
    }

    #[test]
    fn foreign_buffers_are_not_pooled() {
        let pool = BufferPool::new();
        pool.release(vec![1u8; 1500].into_boxed_slice(), 1500);
        pool.release(vec![1u8; PACKET_BUFFER_SIZE + 1].into_boxed_slice(), 10);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn shrinking_zeroes_tail() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        buf.try_append(&[7u8; 64]).unwrap();
        buf.set_len(16);
        assert_eq!(buf.as_slice(), &[7u8; 16]);
        assert!(buf.storage()[16..64].iter().all(|&b| b == 0));
    }

    #[test]
    fn append_beyond_capacity_fails() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        assert!(buf.try_append(&vec![1u8; PACKET_BUFFER_SIZE + 1]).is_none());
        assert!(buf.is_empty());
        assert!(buf.try_append(&vec![1u8; PACKET_BUFFER_SIZE]).is_some());
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn max_idle_bounds_retained_buffers() {
        let pool = BufferPool::with_max_idle(2);
        let buffers: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        drop(buffers);
        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.allocated(), 4);
    }

    #[test]
    fn concurrent_acquire_release() {
        let pool = BufferPool::new();
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buf = pool.acquire();
                        assert!(buf.storage()[..64].iter().all(|&b| b == 0));
                        buf.try_append(&[i as u8 + 1; 64]).unwrap();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert!(pool.allocated() <= 8);
        assert_eq!(pool.idle(), pool.allocated());
    }
}
