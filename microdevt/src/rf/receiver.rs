use microdevt_driver::rf_io::Level;

use super::{BIT_MAX_SAMPLES, DELIMITER_MAX_SAMPLES, DELIMITER_MIN_SAMPLES, LONG_PULSE_MIN_SAMPLES};
use crate::byte::Byte;
use crate::pkt::Pkt;

/// Destination of decoded frames
pub trait FrameSink<'a> {
    fn alloc(&'a self) -> Option<Pkt<'a>>;
    /// Delivers a complete frame, or reports a failed reception with `None`
    fn deliver(&'a self, pkt: Option<Pkt<'a>>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// Waiting for a frame delimiter
    Idle,
    /// Delimiter seen, the next run must be a high data bit
    FirstBit,
    /// At least one data bit accepted
    Receiving,
}

/// Run-length decoder of the receiver line
///
/// Consecutive samples of one level form a run. A run is classified when the level changes:
/// * short runs (up to [`BIT_MAX_SAMPLES`]) are data bits, long ones are '1'
/// * a low run of [`DELIMITER_MIN_SAMPLES`]..=[`DELIMITER_MAX_SAMPLES`] separates frames
/// * anything else aborts the current frame
pub struct Receiver<'a> {
    state: RxState,
    run: u16,
    prev: Option<bool>,
    byte: Byte,
    pkt: Option<Pkt<'a>>,
}

impl<'a> Receiver<'a> {
    pub const fn new() -> Self {
        Self {
            state: RxState::Idle,
            run: 0,
            prev: None,
            byte: Byte::new(),
            pkt: None,
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    /// Forgets the line history. A frame in progress is dropped silently.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Processes one line sample
    pub fn sample<S>(&mut self, level: Level, sink: &'a S)
    where
        S: FrameSink<'a> + ?Sized,
    {
        let high = match level {
            Level::Low => false,
            Level::High => true,
            Level::Undetermined => return,
        };

        match self.prev {
            Some(prev) if prev == high => self.run = self.run.saturating_add(1),
            Some(prev) => {
                self.fill(prev, self.run, sink);
                self.run = 1;
            }
            None => self.run = 1,
        }
        self.prev = Some(high);
    }

    /// Classifies a finished run of `run` samples at level `high`
    pub fn fill<S>(&mut self, high: bool, run: u16, sink: &'a S)
    where
        S: FrameSink<'a> + ?Sized,
    {
        if run <= BIT_MAX_SAMPLES && self.state != RxState::Idle {
            if self.state == RxState::FirstBit && !high {
                return self.abort(sink);
            }
            self.state = RxState::Receiving;
            let Some(c) = self.byte.add_bit(run >= LONG_PULSE_MIN_SAMPLES) else {
                return;
            };
            let added = self
                .pkt
                .as_mut()
                .is_some_and(|pkt| pkt.buf_mut().addc(c).is_ok());
            if !added {
                trace!("RF frame too long");
                self.abort(sink);
            }
            return;
        }

        if !high && (DELIMITER_MIN_SAMPLES..=DELIMITER_MAX_SAMPLES).contains(&run) {
            self.byte.reset();
            if self.state != RxState::Idle
                && let Some(pkt) = self.pkt.take_if(|pkt| !pkt.is_empty())
            {
                sink.deliver(Some(pkt));
            }
            if self.pkt.is_none() {
                self.pkt = sink.alloc();
            }
            self.state = match self.pkt {
                Some(_) => RxState::FirstBit,
                None => {
                    debug!("RF receiver: no packet buffer");
                    RxState::Idle
                }
            };
            return;
        }

        self.abort(sink)
    }

    fn abort<S>(&mut self, sink: &'a S)
    where
        S: FrameSink<'a> + ?Sized,
    {
        self.pkt = None;
        if self.state == RxState::Receiving {
            sink.deliver(None);
        }
        self.byte.reset();
        self.state = RxState::Idle;
    }
}

impl Default for Receiver<'_> {
    fn default() -> Self {
        Self::new()
    }
}
