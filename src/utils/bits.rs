use crate::error::{AvError, Result};

/// A bit-level reader over RBSP data.
///
/// Supports the H.264 descriptors used by parameter sets and slice headers:
/// fixed-width `u(n)`, unsigned `ue(v)` and signed `se(v)` exp-Golomb codes.
///
/// ```
/// use avpipe::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// A reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads one bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(AvError::MalformedBitstream("reached end of data".into()));
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads `n` bits (at most 32) as a big-endian number.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(AvError::MalformedBitstream("too many bits requested".into()));
        }

        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Ok(value as u32)
    }

    /// Reads `ue(v)`: M leading zeros, a one, then M info bits;
    /// the value is 2^M + info - 1.
    pub fn read_golomb(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(AvError::MalformedBitstream("invalid exp-Golomb code".into()));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let info = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) + info as u64 - 1) as u32)
    }

    /// Reads `se(v)`: odd codes map to positive values, even codes to negative.
    pub fn read_signed_golomb(&mut self) -> Result<i32> {
        let k = self.read_golomb()?;
        let magnitude = k.div_ceil(2) as i32;
        Ok(if k & 1 == 1 { magnitude } else { -magnitude })
    }

    /// Skips `n` bits.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        for _ in 0..n {
            self.read_bit()?;
        }
        Ok(())
    }

    /// Skips the remaining bits of the current byte.
    pub fn align_byte(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    /// True on a byte boundary.
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset == 0
    }

    /// Offset of the next unread byte; only meaningful when byte aligned.
    pub fn byte_position(&self) -> usize {
        self.byte_offset
    }

    /// Bits left to read.
    pub fn available_bits(&self) -> usize {
        self.data
            .len()
            .saturating_sub(self.byte_offset)
            .saturating_mul(8)
            .saturating_sub(self.bit_offset as usize)
    }
}

/// Bit-level writer, the inverse of [`BitReader`].
#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_offset: u8,
}

impl BitWriter {
    /// An empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one bit.
    pub fn write_bit(&mut self, bit: bool) {
        if self.bit_offset == 0 {
            self.data.push(0);
        }
        if bit {
            if let Some(last) = self.data.last_mut() {
                *last |= 1 << (7 - self.bit_offset);
            }
        }
        self.bit_offset = (self.bit_offset + 1) % 8;
    }

    /// Writes the low `n` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        for i in (0..n.min(32)).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Writes an unsigned exp-Golomb code.
    pub fn write_golomb(&mut self, value: u32) {
        let code = value as u64 + 1;
        let bits = 64 - code.leading_zeros();
        for _ in 0..bits - 1 {
            self.write_bit(false);
        }
        for i in (0..bits).rev() {
            self.write_bit((code >> i) & 1 == 1);
        }
    }

    /// Writes a signed exp-Golomb code.
    pub fn write_signed_golomb(&mut self, value: i32) {
        let code = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.write_golomb(code);
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align_byte(&mut self) {
        self.bit_offset = 0;
    }

    /// `rbsp_trailing_bits()`: a stop bit followed by zero alignment.
    pub fn write_trailing_bits(&mut self) {
        self.write_bit(true);
        self.align_byte();
    }

    /// Writes whole bytes; the writer must be byte aligned.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.align_byte();
        self.data.extend_from_slice(bytes);
    }

    /// True on a byte boundary.
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset == 0
    }

    /// The written bytes, the last one zero padded.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
