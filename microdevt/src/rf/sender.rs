use super::{END_OF_TRANSMISSION_LENGTH, FRAME_DELIMITER_LENGTH, PREAMBLE_LENGTH};
use crate::byte::Byte;
use crate::pkt::Pkt;

/// Result of one sender tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Line level updated or held
    Busy,
    /// A data bit started on the line
    Bit(bool),
    /// Nothing left to send
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Preamble,
    Delimiter,
    Data,
    Close,
    Done,
}

/// Line encoder of one packet
///
/// The packet goes out `burst + 1` times:
///
/// ```text
/// preamble | delimiter data [stop] | delimiter data [stop] | ... | delimiter | close
/// ```
///
/// Data bits alternate the line level starting high. A '1' lasts 3 ticks, a '0' one tick.
pub struct Sender<'a> {
    pkt: Option<Pkt<'a>>,
    phase: Phase,
    burst: u8,
    burst_cnt: u8,
    frame_pos: u8,
    hold: u8,
    clk: bool,
    closing: bool,
    level: bool,
    byte: Byte,
}

impl<'a> Sender<'a> {
    pub const fn new() -> Self {
        Self {
            pkt: None,
            phase: Phase::Done,
            burst: 0,
            burst_cnt: 0,
            frame_pos: 0,
            hold: 0,
            clk: false,
            closing: false,
            level: false,
            byte: Byte::new(),
        }
    }

    /// Starts the transmission of `pkt` followed by `burst` retransmissions
    pub fn load(&mut self, pkt: Pkt<'a>, burst: u8) {
        *self = Self {
            pkt: Some(pkt),
            phase: Phase::Preamble,
            burst,
            ..Self::new()
        };
    }

    /// Takes the packet back and clears the state
    pub fn finish(&mut self) -> Option<Pkt<'a>> {
        let mut pkt = self.pkt.take();
        if let Some(pkt) = pkt.as_mut() {
            pkt.buf_mut().reset_keep();
        }
        *self = Self::new();
        pkt
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Done
    }

    /// Line level requested by the last tick
    pub fn level(&self) -> bool {
        self.level
    }

    /// Advances by one tick
    pub fn step(&mut self) -> Step {
        if self.hold > 0 {
            self.hold -= 1;
            return Step::Busy;
        }

        match self.phase {
            Phase::Preamble => {
                self.level = self.frame_pos % 2 == 1;
                self.frame_pos += 1;
                if self.frame_pos == PREAMBLE_LENGTH {
                    self.start_delimiter();
                }
                Step::Busy
            }
            Phase::Delimiter => {
                if self.frame_pos == 0 {
                    self.level = false;
                }
                self.frame_pos += 1;
                if self.frame_pos > FRAME_DELIMITER_LENGTH {
                    self.frame_pos = 0;
                    if self.closing {
                        self.phase = Phase::Close;
                    } else {
                        self.phase = Phase::Data;
                        self.clk = false;
                        self.byte.reset();
                    }
                }
                Step::Busy
            }
            Phase::Data => self.data_step(),
            Phase::Close => {
                self.level = true;
                self.frame_pos += 1;
                if self.frame_pos == END_OF_TRANSMISSION_LENGTH {
                    self.phase = Phase::Done;
                }
                Step::Busy
            }
            Phase::Done => Step::Done,
        }
    }

    fn data_step(&mut self) -> Step {
        if self.byte.is_empty() {
            let next = self.pkt.as_mut().and_then(|pkt| pkt.buf_mut().getc());
            match next {
                Some(c) => self.byte.init(c),
                None => return self.end_of_frame(),
            }
        }

        let bit = self.byte.get_bit();
        if bit {
            self.hold = 2;
        }
        self.level = !self.clk;
        self.clk = !self.clk;
        Step::Bit(bit)
    }

    fn end_of_frame(&mut self) -> Step {
        if self.burst_cnt < self.burst {
            self.burst_cnt += 1;
            if let Some(pkt) = self.pkt.as_mut() {
                pkt.buf_mut().reset_keep();
            }
        } else {
            self.closing = true;
        }
        self.start_delimiter();

        // The last bit must end on a level change
        if !self.level {
            self.level = true;
            Step::Busy
        } else {
            self.step()
        }
    }

    fn start_delimiter(&mut self) {
        self.phase = Phase::Delimiter;
        self.frame_pos = 0;
    }
}

impl Default for Sender<'_> {
    fn default() -> Self {
        Self::new()
    }
}
