//! microdevt driver interface
//!
//! The crate provides the interface between RF front-end hardware and the microdevt stack.
//! Limited scope facilitates compatibility across versions.
//! Board support crates should depend on this crate. Stack users should depend on
//! the `microdevt` crate instead.
//!
//! The software modem never touches hardware registers. It reads the receiver line through
//! an [`RfInput`](rf_io::RfInput) and drives the transmitter through an
//! `embedded_hal::digital::OutputPin`. Two receiver front-ends are provided:
//! * [`DigitalInput`](rf_io::DigitalInput) wraps a GPIO input pin
//! * [`AnalogInput`](rf_io::AnalogInput) thresholds raw converter readings
//!
//! Both are sampled from the timer interrupt and must not block.

#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod rf_io;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}
