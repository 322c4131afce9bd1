//! Bottom halves
//!
//! Interrupt handlers must stay short. Work that may run late (packet reception processing,
//! packet release, user callbacks) is queued as a [`Task`] and executed by the main loop
//! through [`Scheduler::run_tasks`].
//!
//! Queueing never blocks and never allocates. A full queue drops the task, which is logged and
//! counted. A dropped [`Task::FreePkt`] still returns its packet to the pool.

use core::cell::Cell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use crate::iface::Netif;
use crate::pkt::Pkt;

/// Deferred work item
pub enum Task<'a> {
    /// User callback
    Call(&'a (dyn Fn() + Sync)),
    /// Receive processing of an interface
    Input(&'a (dyn Netif<'a> + Sync)),
    /// Release of a transmitted packet
    FreePkt(Pkt<'a>),
}

impl Task<'_> {
    pub fn run(self) {
        match self {
            Task::Call(f) => f(),
            Task::Input(iface) => iface.input(),
            Task::FreePkt(pkt) => pkt.free(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Task::Call(_) => "call",
            Task::Input(_) => "input",
            Task::FreePkt(_) => "free",
        }
    }
}

/// Task queue access for type-agnostic owners
pub trait DynamicScheduler<'a> {
    /// Queues a task. Safe to call from interrupt handlers.
    fn schedule_task(&self, task: Task<'a>);
}

/// Bounded FIFO of up to `N` pending tasks
pub struct Scheduler<'a, M: RawMutex, const N: usize> {
    queue: Channel<M, Task<'a>, N>,
    dropped: Mutex<M, Cell<u32>>,
}

impl<'a, M: RawMutex, const N: usize> Scheduler<'a, M, N> {
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            dropped: Mutex::new(Cell::new(0)),
        }
    }

    /// Empties the queue and the drop counter
    pub fn init(&self) {
        self.queue.clear();
        self.dropped.lock(|dropped| dropped.set(0));
    }

    pub fn schedule_task(&self, task: Task<'a>) {
        if let Err(TrySendError::Full(task)) = self.queue.try_send(task) {
            warn!("task queue full, {} task dropped", task.kind());
            self.dropped
                .lock(|dropped| dropped.set(dropped.get().saturating_add(1)));
        }
    }

    /// Runs the tasks queued before the call, in FIFO order
    ///
    /// Tasks queued by running tasks wait for the next call. Returns the number of tasks run.
    pub fn run_tasks(&self) -> usize {
        let pending = self.queue.len();
        let mut count = 0;
        while count < pending {
            let Ok(task) = self.queue.try_receive() else {
                break;
            };
            task.run();
            count += 1;
        }
        count
    }

    /// Discards queued tasks. Only packet releases take effect.
    pub fn shutdown(&self) {
        let mut discarded = 0usize;
        while let Ok(task) = self.queue.try_receive() {
            drop(task);
            discarded += 1;
        }
        if discarded > 0 {
            debug!("scheduler shutdown: {} tasks discarded", discarded);
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of tasks lost to a full queue
    pub fn dropped(&self) -> u32 {
        self.dropped.lock(|dropped| dropped.get())
    }
}

impl<M: RawMutex, const N: usize> Default for Scheduler<'_, M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, M: RawMutex, const N: usize> DynamicScheduler<'a> for Scheduler<'a, M, N> {
    fn schedule_task(&self, task: Task<'a>) {
        Scheduler::schedule_task(self, task)
    }
}
