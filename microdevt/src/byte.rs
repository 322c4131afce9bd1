//! Bit-level assembly and extraction of one octet, most significant bit first

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Byte {
    c: u8,
    pos: u8,
}

impl Byte {
    pub const fn new() -> Self {
        Self { c: 0, pos: 0 }
    }

    /// Shifts a bit in. Returns the assembled octet once 8 bits were added.
    pub fn add_bit(&mut self, bit: bool) -> Option<u8> {
        self.c = (self.c << 1) | u8::from(bit);
        self.pos += 1;
        if self.pos == u8::BITS as u8 {
            let c = self.c;
            self.reset();
            Some(c)
        } else {
            None
        }
    }

    /// Loads an octet for extraction with [`Byte::get_bit`]
    pub fn init(&mut self, c: u8) {
        self.c = c;
        self.pos = u8::BITS as u8;
    }

    /// Pops the next bit. Returns `false` once the octet is exhausted.
    pub fn get_bit(&mut self) -> bool {
        if self.pos == 0 {
            return false;
        }
        self.pos -= 1;
        (self.c >> self.pos) & 0x1 != 0
    }

    /// No bits pending, in either direction
    pub const fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
