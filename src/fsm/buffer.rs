//! Buffer Arena
//!
//! Every connection owns at most one fixed-capacity I/O buffer. The same
//! region is used to accumulate an inbound command and, once the command
//! processor has consumed it, to hold the outbound reply.
//!
//! ## Ownership
//!
//! ```text
//!   BufferAllocator ──allocate()──> IoBuffer ──owned by──> Connection
//!         ▲                                                   │
//!         └──────────────────free()───────────────────────────┘
//! ```
//!
//! An `IoBuffer` is a plain owned value, so the type system guarantees that
//! exactly one connection can reach it. Returning it to the allocator moves
//! it, which makes a double free unrepresentable.

use bytes::BytesMut;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::machine::ERROR_REPLY;

/// Capacity of every per-connection I/O buffer.
pub const IO_BUFFER_SIZE: usize = 4096;

/// Maximum number of idle buffers a [`PoolAllocator`] keeps around by default.
pub const DEFAULT_POOL_SIZE: usize = 1024;

/// Smallest capacity an allocator will hand out: the fixed error reply must
/// always fit.
pub const MIN_BUFFER_SIZE: usize = ERROR_REPLY.len();

/// A fixed-capacity byte region plus the count of valid bytes in it.
#[derive(Debug)]
pub struct IoBuffer {
    /// Backing storage; its length is the buffer capacity and never changes.
    data: BytesMut,
    /// Number of valid bytes at the front of `data` (`nbuf`).
    len: usize,
}

impl IoBuffer {
    /// Creates a zero-filled buffer of the given capacity.
    pub fn zeroed(capacity: usize) -> Self {
        Self::from_storage(BytesMut::zeroed(capacity))
    }

    fn from_storage(data: BytesMut) -> Self {
        Self { data, len: 0 }
    }

    /// Total number of bytes this buffer can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// The valid bytes, `buf[0..nbuf)`.
    #[inline]
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The unused tail, `buf[nbuf..B)`.
    #[inline]
    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.data[len..]
    }

    /// Marks `n` more bytes of the tail as valid.
    #[inline]
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(self.len + n <= self.capacity());
        self.len += n;
    }

    /// The whole region regardless of `len`.
    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }

    /// Sets the number of valid bytes. Callers check `len <= capacity`.
    #[inline]
    pub(crate) fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.capacity());
        self.len = len;
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Overwrites the buffer from offset 0 with `bytes`.
    pub(crate) fn overwrite(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= self.capacity());
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
    }

    fn into_storage(self) -> BytesMut {
        self.data
    }
}

/// Source of per-connection I/O buffers.
///
/// Implementations are shared by every connection of a server, so they must
/// be safe to call from several worker threads at once. A single buffer is
/// never touched concurrently: it is moved in and out.
pub trait BufferAllocator: Send + Sync {
    /// Hands out an empty buffer of [`capacity`](Self::capacity) bytes.
    fn allocate(&self) -> IoBuffer;

    /// Takes back a buffer previously returned by [`allocate`](Self::allocate).
    fn free(&self, buf: IoBuffer);

    /// Capacity of the buffers this allocator produces.
    fn capacity(&self) -> usize;
}

/// Allocates a fresh zeroed buffer every time and drops it on free.
#[derive(Debug)]
pub struct HeapAllocator {
    capacity: usize,
}

impl HeapAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(MIN_BUFFER_SIZE),
        }
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new(IO_BUFFER_SIZE)
    }
}

impl BufferAllocator for HeapAllocator {
    fn allocate(&self) -> IoBuffer {
        IoBuffer::zeroed(self.capacity)
    }

    fn free(&self, buf: IoBuffer) {
        drop(buf);
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Recycles freed buffers through a bounded free list.
///
/// Idle connections release their buffer between command bursts, so a busy
/// server allocates and frees at a high rate; the pool turns most of those
/// into a push/pop on a mutex-protected vector.
#[derive(Debug)]
pub struct PoolAllocator {
    capacity: usize,
    max_pooled: usize,
    free_list: Mutex<Vec<BytesMut>>,
    /// Buffers currently owned by connections.
    outstanding: AtomicUsize,
    /// Total calls to `allocate`.
    allocations: AtomicU64,
    /// Allocations served from the free list.
    reused: AtomicU64,
}

impl PoolAllocator {
    /// Creates a pool of `capacity`-byte buffers retaining at most
    /// `max_pooled` idle ones.
    pub fn new(capacity: usize, max_pooled: usize) -> Self {
        Self {
            capacity: capacity.max(MIN_BUFFER_SIZE),
            max_pooled,
            free_list: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
            allocations: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Number of buffers handed out and not yet freed.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Number of idle buffers waiting in the free list.
    pub fn pooled(&self) -> usize {
        self.free_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total number of allocations served.
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of allocations served by recycling a freed buffer.
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }
}

impl Default for PoolAllocator {
    fn default() -> Self {
        Self::new(IO_BUFFER_SIZE, DEFAULT_POOL_SIZE)
    }
}

impl BufferAllocator for PoolAllocator {
    fn allocate(&self) -> IoBuffer {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.outstanding.fetch_add(1, Ordering::Relaxed);

        let recycled = self
            .free_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match recycled {
            Some(storage) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                IoBuffer::from_storage(storage)
            }
            None => IoBuffer::zeroed(self.capacity),
        }
    }

    fn free(&self, buf: IoBuffer) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);

        if buf.capacity() != self.capacity {
            return;
        }

        let mut free_list = self
            .free_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if free_list.len() < self.max_pooled {
            free_list.push(buf.into_storage());
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_fill_and_clear() {
        let mut buf = IoBuffer::zeroed(8);
        assert!(buf.is_empty());
        assert_eq!(buf.spare_mut().len(), 8);

        buf.spare_mut()[..3].copy_from_slice(b"abc");
        buf.advance(3);
        assert_eq!(buf.filled(), b"abc");
        assert_eq!(buf.spare_mut().len(), 5);

        buf.clear();
        assert!(buf.is_empty());
        assert!(!buf.is_full());
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let mut buf = IoBuffer::zeroed(16);
        buf.overwrite(b"hello world");
        buf.overwrite(b"bye");
        assert_eq!(buf.filled(), b"bye");
    }

    #[test]
    fn test_minimum_capacity() {
        let heap = HeapAllocator::new(4);
        assert_eq!(heap.capacity(), MIN_BUFFER_SIZE);
        assert_eq!(heap.allocate().capacity(), MIN_BUFFER_SIZE);

        let pool = PoolAllocator::new(1, 4);
        assert_eq!(pool.allocate().capacity(), MIN_BUFFER_SIZE);
    }

    #[test]
    fn test_pool_recycles_buffers() {
        let pool = PoolAllocator::new(64, 4);

        let buf = pool.allocate();
        assert_eq!(pool.outstanding(), 1);
        pool.free(buf);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.pooled(), 1);

        let buf = pool.allocate();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 64);
        assert_eq!(pool.reused(), 1);
        assert_eq!(pool.allocations(), 2);
        pool.free(buf);
    }

    #[test]
    fn test_pool_recycled_buffer_is_empty() {
        let pool = PoolAllocator::new(64, 4);

        let mut buf = pool.allocate();
        buf.overwrite(b"stale");
        pool.free(buf);

        assert!(pool.allocate().is_empty());
    }

    #[test]
    fn test_pool_is_bounded() {
        let pool = PoolAllocator::new(32, 2);

        let bufs: Vec<_> = (0..5).map(|_| pool.allocate()).collect();
        assert_eq!(pool.outstanding(), 5);

        for buf in bufs {
            pool.free(buf);
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.pooled(), 2);
    }

    #[test]
    fn test_pool_rejects_foreign_capacity() {
        let pool = PoolAllocator::new(64, 4);
        let _ = pool.allocate();
        pool.free(IoBuffer::zeroed(128));
        assert_eq!(pool.pooled(), 0);
    }
}
