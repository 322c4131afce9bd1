//! Byte buffer over a borrowed region
//!
//! ```text
//! |<-- skip -->|<-- len (live window) -->|<-- room -->|
//! 0          skip                    skip + len      size
//! ```
//!
//! Bytes are appended after the live window and consumed from its front. Consumed bytes stay
//! in the region, so [`Buf::adj`] with a negative count or [`Buf::reset_keep`] can reveal them
//! again.

/// Buffer operation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufError {
    /// Not enough room after the live window
    Overflow,
    /// Not enough bytes in front of or inside the live window
    Underflow,
}

/// View over a byte region with a live window `[skip, skip + len)`
///
/// Invariant: `skip + len <= size()`. Every failing operation leaves the buffer unchanged.
#[derive(Debug, Default)]
pub struct Buf<'a> {
    data: &'a mut [u8],
    skip: usize,
    len: usize,
}

impl<'a> Buf<'a> {
    pub fn new(storage: &'a mut [u8]) -> Self {
        Self {
            data: storage,
            skip: 0,
            len: 0,
        }
    }

    /// Region length. Constant for the buffer lifetime.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn skip(&self) -> usize {
        self.skip
    }

    /// Bytes that may still be appended
    pub fn room(&self) -> usize {
        self.size() - self.skip - self.len
    }

    /// Live window
    pub fn data(&self) -> &[u8] {
        &self.data[self.skip..self.skip + self.len]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.skip..self.skip + self.len]
    }

    /// Appends all of `bytes` or nothing
    pub fn add(&mut self, bytes: &[u8]) -> Result<(), BufError> {
        if bytes.len() > self.room() {
            return Err(BufError::Overflow);
        }
        let end = self.skip + self.len;
        self.data[end..end + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    pub fn addc(&mut self, c: u8) -> Result<(), BufError> {
        self.add(&[c])
    }

    /// Appends the live window of another buffer
    pub fn addbuf(&mut self, other: &Buf<'_>) -> Result<(), BufError> {
        self.add(other.data())
    }

    /// Consumes one byte from the front of the live window
    pub fn getc(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let c = self.data[self.skip];
        self.skip += 1;
        self.len -= 1;
        Some(c)
    }

    /// Consumes (`n > 0`) or reveals (`n < 0`) bytes at the front of the live window
    pub fn adj(&mut self, n: isize) -> Result<(), BufError> {
        let count = n.unsigned_abs();
        if n >= 0 {
            if count > self.len {
                return Err(BufError::Underflow);
            }
            self.skip += count;
            self.len -= count;
        } else {
            if count > self.skip {
                return Err(BufError::Overflow);
            }
            self.skip -= count;
            self.len += count;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.skip = 0;
        self.len = 0;
    }

    /// Rewinds the live window to the region start, keeping the bytes
    pub fn reset_keep(&mut self) {
        self.len += self.skip;
        self.skip = 0;
    }
}

impl PartialEq for Buf<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl Eq for Buf<'_> {}

#[cfg(feature = "defmt")]
impl defmt::Format for Buf<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "Buf {{ skip: {}, len: {}, size: {} }}",
            self.skip,
            self.len,
            self.size()
        )
    }
}
