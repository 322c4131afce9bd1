//! Software OOK modem
//!
//! The modem runs entirely from two software timers of the interface:
//! * the sampling timer fires every `sampling` period and feeds one line sample to the
//!   [`Receiver`]
//! * the send timer fires every `2 * sampling` period and advances the [`Sender`] by one tick
//!
//! The timers are mutually exclusive. Starting a transmission cancels the sampling timer, the end
//! of the last queued transmission re-arms it. The modem is half-duplex and never hears itself.
//!
//! Line encoding, in sender ticks (two receiver samples each):
//!
//! ```text
//!  preamble            delimiter (29)       '1' '0' '0'  ...
//!  _   _   _   _                          ___     _
//! | |_| |_| |_| |___________________________|   |_| |_ ...
//! ```
//!
//! A frame is delimited by a low run of [`DELIMITER_MIN_SAMPLES`]..=[`DELIMITER_MAX_SAMPLES`]
//! samples. Every data bit flips the line, a '1' lasts three ticks, a '0' one.

mod checks;
mod receiver;
mod sender;

pub use checks::checks;
pub use receiver::{FrameSink, Receiver, RxState};
pub use sender::{Sender, Step};

use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::{OutputPin, PinState};
use microdevt_driver::rf_io::RfInput;

use crate::iface::{Driver, IfError, Iface};
use crate::pkt::Pkt;
use crate::time::Duration;
use crate::timer::{DynamicTimers, TIMER_RESOLUTION_US, TimerError, TimerId};

/// Preamble length, sender ticks
pub const PREAMBLE_LENGTH: u8 = 30;
/// Low hold after the start-frame tick, sender ticks
///
/// The emitted delimiter lasts 58 samples, in the middle of the accepted window, so the
/// receiver tolerates a few percent of clock mismatch in either direction.
pub const FRAME_DELIMITER_LENGTH: u8 = 28;
/// High hold closing a transmission, sender ticks. Longer than any data bit.
pub const END_OF_TRANSMISSION_LENGTH: u8 = 8;

pub const DELIMITER_MIN_SAMPLES: u16 = 55;
pub const DELIMITER_MAX_SAMPLES: u16 = 62;
/// Longest data bit run
pub const BIT_MAX_SAMPLES: u16 = 11;
/// Shortest run decoded as '1'
pub const LONG_PULSE_MIN_SAMPLES: u16 = 5;

pub const DEFAULT_SAMPLING_US: u64 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RfError {
    /// Timer registration failed
    Timer(TimerError),
    /// Packet pool exhausted
    NoBuffer,
    /// Self-test data does not fit into a packet
    Overflow,
    /// Self-test received a wrong number of bytes
    Length { expected: usize, received: usize },
    /// Self-test received corrupted data
    Mismatch,
}

impl From<TimerError> for RfError {
    fn from(value: TimerError) -> Self {
        RfError::Timer(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RfConfig {
    /// Receiver sampling period. The sender ticks at twice this period.
    pub sampling: Duration,
    /// Retransmissions of every packet
    pub burst: u8,
}

impl RfConfig {
    /// Fails to compile in const context if sampling is faster than the timer resolution
    pub const fn new(sampling_us: u64, burst: u8) -> Self {
        assert!(sampling_us >= TIMER_RESOLUTION_US);
        Self {
            sampling: Duration::from_micros(sampling_us),
            burst,
        }
    }

    pub fn send_period(&self) -> Duration {
        self.sampling * 2
    }
}

impl Default for RfConfig {
    fn default() -> Self {
        const DEFAULT: RfConfig = RfConfig::new(DEFAULT_SAMPLING_US, 2);
        DEFAULT
    }
}

#[derive(Clone, Copy)]
struct RfTimers<'a> {
    timers: &'a (dyn DynamicTimers<'a> + Sync),
    rcv: TimerId,
    snd: TimerId,
}

struct Ctx<'a, I, O> {
    input: I,
    output: O,
    receiver: Receiver<'a>,
    sender: Sender<'a>,
    timers: Option<RfTimers<'a>>,
    active: bool,
}

impl<I, O: OutputPin> Ctx<'_, I, O> {
    fn set_line(&mut self, high: bool) {
        if self.output.set_state(PinState::from(high)).is_err() {
            trace!("RF output write failed");
        }
    }
}

/// RF interface driver
pub struct Rf<'a, M: RawMutex, I, O> {
    config: RfConfig,
    ctx: Mutex<M, RefCell<Ctx<'a, I, O>>>,
}

impl<'a, M: RawMutex, I: RfInput, O: OutputPin> Rf<'a, M, I, O> {
    pub fn new(config: RfConfig, input: I, output: O) -> Self {
        Self {
            config,
            ctx: Mutex::new(RefCell::new(Ctx {
                input,
                output,
                receiver: Receiver::new(),
                sender: Sender::new(),
                timers: None,
                active: false,
            })),
        }
    }

    pub fn config(&self) -> &RfConfig {
        &self.config
    }

    /// A transmission is in progress
    pub fn is_sending(&self) -> bool {
        self.ctx.lock(|ctx| ctx.borrow().sender.is_busy())
    }

    pub fn rx_state(&self) -> RxState {
        self.ctx.lock(|ctx| ctx.borrow().receiver.state())
    }

    /// Sampling timer and send timer, once registered
    pub fn timer_ids(&self) -> Option<(TimerId, TimerId)> {
        self.ctx
            .lock(|ctx| ctx.borrow().timers.map(|timers| (timers.rcv, timers.snd)))
    }
}

impl<'a, M, I, O> Rf<'a, M, I, O>
where
    M: RawMutex + Sync + 'a,
    I: RfInput + Send + 'a,
    O: OutputPin + Send + 'a,
{
    fn start_sending(&self, iface: &'a Iface<'a, M, Self>) {
        self.ctx.lock(|ctx| {
            let mut ctx = ctx.borrow_mut();
            let Some(timers) = ctx.timers else {
                return;
            };
            if !ctx.active || ctx.sender.is_busy() || timers.timers.is_pending(timers.snd) {
                return;
            }
            let Some(pkt) = iface.tx_ring().pop() else {
                return;
            };

            trace!("RF sending {} bytes", pkt.len());
            ctx.receiver.reset();
            ctx.sender.load(pkt, self.config.burst);
            timers.timers.cancel(timers.rcv);
            timers.timers.arm(timers.snd, self.config.send_period());
        })
    }

    fn on_send_tick(&self, iface: &'a Iface<'a, M, Self>, timers: RfTimers<'a>) {
        self.ctx.lock(|ctx| {
            let mut ctx = ctx.borrow_mut();
            if ctx.sender.step() != Step::Done {
                let level = ctx.sender.level();
                ctx.set_line(level);
                timers.timers.arm(timers.snd, self.config.send_period());
                return;
            }

            let sent = ctx.sender.finish();
            ctx.set_line(false);
            if let Some(pkt) = sent {
                iface.update_stats(|stats| stats.tx_packets += 1);
                iface.schedule_tx_pkt_free(pkt);
            }

            match iface.tx_ring().pop() {
                Some(pkt) => {
                    ctx.sender.load(pkt, self.config.burst);
                    timers.timers.arm(timers.snd, self.config.send_period());
                }
                None => timers.timers.arm(timers.rcv, self.config.sampling),
            }
        })
    }

    fn on_sample_tick(&self, iface: &'a Iface<'a, M, Self>, timers: RfTimers<'a>) {
        timers.timers.arm(timers.rcv, self.config.sampling);
        self.ctx.lock(|ctx| {
            let mut ctx = ctx.borrow_mut();
            let level = ctx.input.sample();
            ctx.receiver.sample(level, iface);
        })
    }
}

impl<'a, M, I, O> Driver<'a, M> for Rf<'a, M, I, O>
where
    M: RawMutex + Sync + 'a,
    I: RfInput + Send + 'a,
    O: OutputPin + Send + 'a,
{
    fn send(&self, iface: &'a Iface<'a, M, Self>, pkt: Pkt<'a>) -> Result<(), IfError> {
        if let Err(pkt) = iface.tx_ring().push(pkt) {
            debug!("RF TX ring full, {} bytes dropped", pkt.len());
            iface.update_stats(|stats| stats.tx_dropped += 1);
            return Err(IfError::TxRingFull);
        }
        self.start_sending(iface);
        Ok(())
    }

    fn on_timer(&self, iface: &'a Iface<'a, M, Self>, timer: TimerId) {
        let timers = self.ctx.lock(|ctx| {
            let ctx = ctx.borrow();
            ctx.timers.filter(|_| ctx.active)
        });
        let Some(timers) = timers else {
            return;
        };
        if timer == timers.rcv {
            self.on_sample_tick(iface, timers);
        } else if timer == timers.snd {
            self.on_send_tick(iface, timers);
        }
    }
}

impl<'a, M, D> FrameSink<'a> for Iface<'a, M, D>
where
    M: RawMutex + Sync + 'a,
    D: Driver<'a, M> + Sync + 'a,
{
    fn alloc(&'a self) -> Option<Pkt<'a>> {
        Iface::alloc(self)
    }

    fn deliver(&'a self, pkt: Option<Pkt<'a>>) {
        self.schedule_receive(pkt)
    }
}

/// Starts the modem of an RF interface
///
/// Registers the sampling and send timers on the first call, deasserts the transmitter and
/// starts sampling. Packets queued before the call are sent right away. Calling it again while
/// a packet is on air leaves the transmission running.
pub fn init<'a, M, I, O>(
    iface: &'a Iface<'a, M, Rf<'a, M, I, O>>,
    timers: &'a (dyn DynamicTimers<'a> + Sync),
) -> Result<(), RfError>
where
    M: RawMutex + Sync + 'a,
    I: RfInput + Send + 'a,
    O: OutputPin + Send + 'a,
{
    let rf = iface.driver();
    let registered = rf.ctx.lock(|ctx| ctx.borrow().timers);
    let rf_timers = match registered {
        Some(rf_timers) => rf_timers,
        None => RfTimers {
            timers,
            rcv: timers.register(iface)?,
            snd: timers.register(iface)?,
        },
    };

    rf.ctx.lock(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.timers = Some(rf_timers);
        ctx.active = true;
        // A transmission in flight keeps the line and re-arms sampling when it ends
        if !ctx.sender.is_busy() {
            ctx.set_line(false);
            rf_timers.timers.arm(rf_timers.rcv, rf.config.sampling);
        }
    });
    debug!(
        "RF init: sampling {} us, burst {}",
        rf.config.sampling.as_micros(),
        rf.config.burst
    );

    rf.start_sending(iface);
    Ok(())
}

/// Stops the modem of an RF interface
///
/// Both timers are cancelled, the packet in flight and the queued ones are dropped.
/// [`init`] restarts the modem.
pub fn shutdown<'a, M, I, O>(iface: &'a Iface<'a, M, Rf<'a, M, I, O>>)
where
    M: RawMutex + Sync + 'a,
    I: RfInput + Send + 'a,
    O: OutputPin + Send + 'a,
{
    let rf = iface.driver();
    let in_flight = rf.ctx.lock(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.active = false;
        if let Some(timers) = ctx.timers {
            timers.timers.cancel(timers.rcv);
            timers.timers.cancel(timers.snd);
        }
        ctx.receiver.reset();
        ctx.set_line(false);
        ctx.sender.finish()
    });
    if in_flight.is_some() {
        iface.update_stats(|stats| stats.tx_dropped += 1);
    }
    drop(in_flight);

    let tx = iface.tx_ring();
    while let Some(pkt) = tx.pop() {
        iface.update_stats(|stats| stats.tx_dropped += 1);
        drop(pkt);
    }
    debug!("RF shutdown");
}
