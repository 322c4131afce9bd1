//! Fixed-capacity FIFO shared between interrupt and main-loop contexts

use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Deque;

/// Type-agnostic ring access
pub trait DynamicRing<T> {
    /// Appends an item. Returns it back if the ring is full.
    fn push(&self, item: T) -> Result<(), T>;
    fn pop(&self) -> Option<T>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn is_full(&self) -> bool;
    fn clear(&self);
}

pub struct Ring<M: RawMutex, T, const N: usize> {
    items: Mutex<M, RefCell<Deque<T, N>>>,
}

impl<M: RawMutex, T, const N: usize> Ring<M, T, N> {
    pub const fn new() -> Self {
        Self {
            items: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<M: RawMutex, T, const N: usize> Default for Ring<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, T, const N: usize> DynamicRing<T> for Ring<M, T, N> {
    fn push(&self, item: T) -> Result<(), T> {
        self.items.lock(|items| items.borrow_mut().push_back(item))
    }

    fn pop(&self) -> Option<T> {
        self.items.lock(|items| items.borrow_mut().pop_front())
    }

    fn len(&self) -> usize {
        self.items.lock(|items| items.borrow().len())
    }

    fn is_full(&self) -> bool {
        self.items.lock(|items| items.borrow().is_full())
    }

    fn clear(&self) {
        // Items are dropped outside the critical section
        while let Some(item) = self.pop() {
            drop(item);
        }
    }
}
