//! Receiver and transmitter line access

use embedded_hal::digital::InputPin;

/// Receiver line level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
    /// The reading is between the analog thresholds. The sample carries no information.
    Undetermined,
}

impl Level {
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Level::High } else { Level::Low }
    }
}

/// Source of receiver line samples
///
/// Called once per sampling period from the timer interrupt.
pub trait RfInput {
    fn sample(&mut self) -> Level;
}

/// Raw analog converter access
///
/// The conversion must complete within the call. Readings are unsigned and monotonic in the
/// input voltage.
pub trait AnalogRead {
    fn read(&mut self) -> u16;
}

/// Receiver line on a digital input pin
pub struct DigitalInput<P> {
    pin: P,
}

impl<P: InputPin> DigitalInput<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: InputPin> RfInput for DigitalInput<P> {
    fn sample(&mut self) -> Level {
        match self.pin.is_high() {
            Ok(high) => Level::from(high),
            Err(_) => {
                trace!("RF input read failed");
                Level::Undetermined
            }
        }
    }
}

/// Receiver line on an analog converter channel
///
/// Readings strictly below `low` are [`Level::Low`], strictly above `high` are
/// [`Level::High`], everything in between is [`Level::Undetermined`].
pub struct AnalogInput<A> {
    adc: A,
    low: u16,
    high: u16,
}

impl<A: AnalogRead> AnalogInput<A> {
    pub fn new(adc: A, low: u16, high: u16) -> Self {
        assert!(low <= high);
        Self { adc, low, high }
    }

    pub fn thresholds(&self) -> (u16, u16) {
        (self.low, self.high)
    }
}

impl<A: AnalogRead> RfInput for AnalogInput<A> {
    fn sample(&mut self) -> Level {
        let value = self.adc.read();
        if value < self.low {
            Level::Low
        } else if value > self.high {
            Level::High
        } else {
            Level::Undetermined
        }
    }
}

impl<T: RfInput + ?Sized> RfInput for &mut T {
    fn sample(&mut self) -> Level {
        T::sample(self)
    }
}
