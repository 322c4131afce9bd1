//! Packet pool
//!
//! A pool carves one caller-owned arena into equal buffers at construction. Allocation and
//! release are O(1) and run in a short critical section, so both are callable from interrupt
//! handlers.
//!
//! A [`Pkt`] is a move-only handle. Dropping it resets the buffer and returns it to the pool it
//! came from, so a packet cannot be released twice or leaked by an early return. Drivers that
//! must not run the release in interrupt context hand the packet to the scheduler instead
//! (see [`Iface::schedule_tx_pkt_free`](crate::iface::Iface::schedule_tx_pkt_free)).

use core::cell::RefCell;
use core::fmt;
use core::mem;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::buf::{Buf, BufError};

/// Packet pool access for type-agnostic owners (interfaces, packets)
pub trait DynamicPool<'a> {
    /// Takes a free buffer out of the pool
    fn take(&self) -> Option<Buf<'a>>;
    /// Puts a buffer back. The buffer must be empty.
    fn release(&self, buf: Buf<'a>);
    fn free_count(&self) -> usize;
    fn capacity(&self) -> usize;
}

/// Bounded pool of up to `N` equal packet buffers
pub struct PktPool<'a, M: RawMutex, const N: usize> {
    free: Mutex<M, RefCell<Vec<Buf<'a>, N>>>,
    capacity: usize,
}

impl<'a, M: RawMutex, const N: usize> PktPool<'a, M, N> {
    /// Splits `arena` into `arena.len() / pkt_size` buffers. Leftover bytes are unused.
    ///
    /// Panics if `pkt_size` is zero or the arena yields more than `N` buffers.
    pub fn new(arena: &'a mut [u8], pkt_size: usize) -> Self {
        assert!(pkt_size > 0);
        let mut free = Vec::new();
        for chunk in arena.chunks_exact_mut(pkt_size) {
            if free.push(Buf::new(chunk)).is_err() {
                panic!("packet pool capacity exceeded");
            }
        }
        let capacity = free.len();
        debug!("packet pool: {} buffers of {} bytes", capacity, pkt_size);
        Self {
            free: Mutex::new(RefCell::new(free)),
            capacity,
        }
    }

    /// Returns `None` when the pool is exhausted
    pub fn alloc(&'a self) -> Option<Pkt<'a>>
    where
        Self: Sync,
    {
        Pkt::alloc(self)
    }

    pub fn free_count(&self) -> usize {
        self.free.lock(|free| free.borrow().len())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<'a, M: RawMutex, const N: usize> DynamicPool<'a> for PktPool<'a, M, N> {
    fn take(&self) -> Option<Buf<'a>> {
        self.free.lock(|free| free.borrow_mut().pop())
    }

    fn release(&self, buf: Buf<'a>) {
        debug_assert!(buf.is_empty() && buf.skip() == 0);
        self.free.lock(|free| unwrap!(free.borrow_mut().push(buf)));
    }

    fn free_count(&self) -> usize {
        PktPool::free_count(self)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Packet: a buffer on loan from a pool
pub struct Pkt<'a> {
    buf: Buf<'a>,
    pool: &'a (dyn DynamicPool<'a> + Sync),
}

impl<'a> Pkt<'a> {
    pub fn alloc(pool: &'a (dyn DynamicPool<'a> + Sync)) -> Option<Self> {
        let buf = pool.take();
        if buf.is_none() {
            debug!("packet pool exhausted");
        }
        Some(Self { buf: buf?, pool })
    }

    /// Returns the buffer to its pool. Same as dropping the packet.
    pub fn free(self) {}

    pub fn buf(&self) -> &Buf<'a> {
        &self.buf
    }

    pub fn buf_mut(&mut self) -> &mut Buf<'a> {
        &mut self.buf
    }

    pub fn data(&self) -> &[u8] {
        self.buf.data()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes or reveals bytes at the packet front, see [`Buf::adj`]
    pub fn adj(&mut self, n: isize) -> Result<(), BufError> {
        self.buf.adj(n)
    }

    pub fn pool(&self) -> &'a (dyn DynamicPool<'a> + Sync) {
        self.pool
    }
}

impl Drop for Pkt<'_> {
    fn drop(&mut self) {
        let mut buf = mem::take(&mut self.buf);
        buf.reset();
        self.pool.release(buf);
    }
}

impl fmt::Debug for Pkt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkt").field("buf", &self.buf).finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Pkt<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Pkt {{ buf: {} }}", self.buf)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Pool = PktPool<'static, CriticalSectionRawMutex, 4>;

    fn make_pool(arena_len: usize, pkt_size: usize) -> &'static Pool {
        let arena = std::vec![0u8; arena_len].leak();
        std::boxed::Box::leak(std::boxed::Box::new(Pool::new(arena, pkt_size)))
    }

    #[test]
    fn test_carving() {
        let pool = make_pool(70, 16);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.free_count(), 4);
        let pkt = pool.alloc().unwrap();
        assert_eq!(pkt.buf().size(), 16);
    }

    #[test]
    #[should_panic]
    fn test_over_capacity() {
        make_pool(80, 16);
    }

    #[test]
    fn test_exhaustion() {
        let pool = make_pool(64, 16);
        let pkts: std::vec::Vec<_> = core::iter::from_fn(|| pool.alloc()).collect();
        assert_eq!(pkts.len(), 4);
        assert_eq!(pool.free_count(), 0);
        assert!(pool.alloc().is_none());

        drop(pkts);
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn test_free_then_alloc_is_empty() {
        let pool = make_pool(16, 16);
        let mut pkt = pool.alloc().unwrap();
        pkt.buf_mut().add(&[1, 2, 3, 4]).unwrap();
        pkt.adj(1).unwrap();
        pkt.free();
        assert_eq!(pool.free_count(), 1);

        let pkt = pool.alloc().unwrap();
        assert_eq!(pkt.len(), 0);
        assert_eq!(pkt.buf().skip(), 0);
        assert_eq!(pkt.buf().room(), 16);
    }
}
