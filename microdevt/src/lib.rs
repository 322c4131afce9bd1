//! # microdevt
//!
//! This library provides a minimal packet-switched network stack for small microcontrollers
//! in no_std environments. It uses user-provided memory for packets and queues, requiring no
//! dynamic memory allocation.
//!
//! The library is designed for single-core systems with two execution contexts: interrupt
//! handlers and a cooperative main loop. All state shared between them is guarded by
//! `embassy_sync` blocking mutexes, keeping critical sections short and bounded.
//!
//! ## Architecture
//!
//! ```text
//!  tick ISR ──► Timers ──► Iface::on_timer ──► Driver (Rf, ...)
//!                                                  │
//!                                                  │ schedule_receive
//!                                                  ▼
//!       ┌──────────┐  alloc/free   ┌──────────┐  ┌─────────┐
//!       │ PktPool  │◄─────────────►│  Iface   ├─►│ RX Ring │
//!       └──────────┘               └────┬─────┘  └─────────┘
//!                                       │ Task::Input
//!                                       ▼
//!  main loop ──► Scheduler::run_tasks ──► Netif::input ──► Layer2
//! ```
//!
//! Components:
//! * _PktPool_ carves a caller-owned arena into equal packet buffers. A [`pkt::Pkt`] returns
//!   to its pool when dropped.
//! * _Ring_ is a bounded FIFO used for the RX and TX packet queues of an interface.
//! * _Scheduler_ defers interrupt work (bottom halves) to the main loop.
//! * _Timers_ is a set of software timers driven by a hardware tick.
//! * _Iface_ binds a transport driver to a pool, rings, and a scheduler, and dispatches
//!   received packets to a layer-2 handler.
//! * _Rf_ is a software on/off-keying modem driven by two timers of its interface.
//!
//! ## Concurrency model
//!
//! Every shared object is parametrized by a raw mutex type:
//! * _CriticalSectionRawMutex_ allows interrupt handlers and the main loop to share objects.
//! * _NoopRawMutex_ fits objects that never leave a single context.
//!
//! Interfaces, timers and the scheduler refer to each other through `&'a dyn` trait objects,
//! so their capacities do not leak into the types of their users.
//!
//! ## Limitations
//!
//! * Protocol layers above layer 2 are out of scope. They plug in through [`iface::Layer2`].
//! * The RF modem is half-duplex. Reception pauses while a packet is on air.
#![no_std]

pub use microdevt_core as core;
pub use microdevt_driver::{rf_io, time};

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod buf;
pub mod byte;
pub mod iface;
pub mod pkt;
pub mod rf;
pub mod ring;
pub mod scheduler;
pub mod timer;
