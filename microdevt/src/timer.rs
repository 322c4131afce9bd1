//! Software timers
//!
//! [`Timers::run`] is called from the hardware tick interrupt with the current time. It fires
//! every expired timer, earliest deadline first. The internal lock is released before a handler
//! runs, so handlers may re-arm or cancel any timer, including their own.
//!
//! Deadlines are relative to the time of the last tick. A timer armed outside a handler fires no
//! earlier than `after` past that tick.

use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::time::{Duration, Instant};

/// Shortest meaningful timer period, microseconds
pub const TIMER_RESOLUTION_US: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(u8);

impl TimerId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError {
    NoSlotLeft,
}

/// Timer expiry callback. Runs in the tick interrupt context.
pub trait TimerHandler<'a> {
    fn on_timer(&'a self, timer: TimerId);
}

/// Timer access for type-agnostic owners
pub trait DynamicTimers<'a> {
    fn register(&self, handler: &'a (dyn TimerHandler<'a> + Sync))
    -> Result<TimerId, TimerError>;
    /// (Re)arms the timer, replacing a pending deadline
    fn arm(&self, timer: TimerId, after: Duration);
    fn cancel(&self, timer: TimerId);
    fn is_pending(&self, timer: TimerId) -> bool;
}

struct Inner<'a, const N: usize> {
    handlers: Vec<&'a (dyn TimerHandler<'a> + Sync), N>,
    deadlines: [Option<Instant>; N],
    // Sorted by deadline. Equal deadlines keep arming order.
    pending: Vec<TimerId, N>,
    now: Instant,
}

impl<'a, const N: usize> Inner<'a, N> {
    fn unlink(&mut self, timer: TimerId) {
        if self.deadlines[timer.index()].take().is_some()
            && let Some(pos) = self.pending.iter().position(|t| *t == timer)
        {
            self.pending.remove(pos);
        }
    }

    fn link(&mut self, timer: TimerId, deadline: Instant) {
        self.unlink(timer);
        let deadlines = &self.deadlines;
        let pos = self
            .pending
            .iter()
            .position(|t| unwrap!(deadlines[t.index()]) > deadline)
            .unwrap_or(self.pending.len());
        unwrap!(self.pending.insert(pos, timer));
        self.deadlines[timer.index()] = Some(deadline);
    }

    fn pop_expired(
        &mut self,
        now: Instant,
    ) -> Option<(TimerId, &'a (dyn TimerHandler<'a> + Sync))> {
        let timer = *self.pending.first()?;
        if unwrap!(self.deadlines[timer.index()]) > now {
            return None;
        }
        self.pending.remove(0);
        self.deadlines[timer.index()] = None;
        Some((timer, self.handlers[timer.index()]))
    }
}

/// Up to `N` software timers
pub struct Timers<'a, M: RawMutex, const N: usize> {
    inner: Mutex<M, RefCell<Inner<'a, N>>>,
}

impl<'a, M: RawMutex, const N: usize> Timers<'a, M, N> {
    pub const fn new() -> Self {
        assert!(N <= u8::MAX as usize);
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                handlers: Vec::new(),
                deadlines: [None; N],
                pending: Vec::new(),
                now: Instant::from_ticks(0),
            })),
        }
    }

    /// Binds a timer slot to a handler for the lifetime of the timer set
    pub fn register(
        &self,
        handler: &'a (dyn TimerHandler<'a> + Sync),
    ) -> Result<TimerId, TimerError> {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            let timer = TimerId(inner.handlers.len() as u8);
            inner
                .handlers
                .push(handler)
                .map_err(|_| TimerError::NoSlotLeft)?;
            Ok(timer)
        })
    }

    /// Arms the timer to fire `after` the last tick. A zero delay fires on the next tick.
    pub fn arm(&self, timer: TimerId, after: Duration) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            if timer.index() >= inner.handlers.len() {
                warn!("unknown timer {}", timer.index());
                return;
            }
            let after = after.max(Duration::from_ticks(1));
            let deadline = inner.now + after;
            inner.link(timer, deadline);
        })
    }

    /// Same as [`Timers::arm`]. Intended for handlers re-arming themselves.
    pub fn reschedule(&self, timer: TimerId, after: Duration) {
        self.arm(timer, after)
    }

    pub fn cancel(&self, timer: TimerId) {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            if timer.index() < inner.handlers.len() {
                inner.unlink(timer);
            }
        })
    }

    pub fn is_pending(&self, timer: TimerId) -> bool {
        self.inner.lock(|inner| {
            inner
                .borrow()
                .deadlines
                .get(timer.index())
                .is_some_and(Option::is_some)
        })
    }

    /// Time of the last tick
    pub fn now(&self) -> Instant {
        self.inner.lock(|inner| inner.borrow().now)
    }

    /// Fires expired timers. Returns the number of handlers run.
    pub fn run(&self, now: Instant) -> usize {
        self.inner.lock(|inner| {
            let mut inner = inner.borrow_mut();
            inner.now = inner.now.max(now);
        });

        let mut count = 0;
        loop {
            let expired = self
                .inner
                .lock(|inner| inner.borrow_mut().pop_expired(now));
            let Some((timer, handler)) = expired else {
                break;
            };
            handler.on_timer(timer);
            count += 1;
        }
        count
    }

    /// Fires expired timers at the current system time
    pub fn poll(&self) -> usize {
        self.run(Instant::now())
    }
}

impl<M: RawMutex, const N: usize> Default for Timers<'_, M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, M: RawMutex, const N: usize> DynamicTimers<'a> for Timers<'a, M, N> {
    fn register(
        &self,
        handler: &'a (dyn TimerHandler<'a> + Sync),
    ) -> Result<TimerId, TimerError> {
        Timers::register(self, handler)
    }

    fn arm(&self, timer: TimerId, after: Duration) {
        Timers::arm(self, timer, after)
    }

    fn cancel(&self, timer: TimerId) {
        Timers::cancel(self, timer)
    }

    fn is_pending(&self, timer: TimerId) -> bool {
        Timers::is_pending(self, timer)
    }
}
