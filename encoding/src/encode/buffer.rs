//! The encoder's growable pack buffer.
//!
//! The buffer is a single contiguous byte vector with an explicit write
//! offset. Repeat runs rewrite their count length-prefix in place, so
//! the offset can be rewound to a remembered position and writing
//! resumed from there.

use super::{BufferOverflowSnafu, Result};
use byteordered::byteorder::{ByteOrder, LittleEndian};
use snafu::ensure;

/// Initial capacity of a fresh pack buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Headroom kept free past every ensured write so a maximal
/// length-prefixed tag always fits without a second capacity check.
pub(crate) const BUFFER_HEADROOM: usize = 10;

/// Largest buffer the encoder will ever allocate.
#[cfg(target_pointer_width = "64")]
pub const MAX_BUFFER_SIZE: usize = 0x1_0000_0000;
/// Largest buffer the encoder will ever allocate.
#[cfg(not(target_pointer_width = "64"))]
pub const MAX_BUFFER_SIZE: usize = 0x7FFF_0000;

const PAGE: u64 = 4096;
const SMALL_BUFFER_CEILING: usize = 16 * 1024 * 1024;
const LARGE_GROWTH_FLOOR: u64 = 4 * 1024 * 1024;
const AGGRESSIVE_GROWTH_CEILING: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub(crate) struct PackBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl PackBuffer {
    pub fn new() -> Self {
        PackBuffer::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        PackBuffer {
            data: vec![0; capacity.max(BUFFER_HEADROOM + 1)],
            offset: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Rewind (or advance) the write offset to a previously
    /// remembered position inside the written prefix.
    pub fn set_offset(&mut self, offset: usize) {
        debug_assert!(offset <= self.data.len());
        self.offset = offset;
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// The written prefix of the buffer.
    pub fn written(&self) -> &[u8] {
        &self.data[..self.offset]
    }

    /// Make sure `extra` bytes plus headroom fit at the current offset,
    /// growing the buffer if they do not.
    pub fn ensure(&mut self, extra: usize) -> Result<()> {
        let end = self
            .offset
            .saturating_add(extra)
            .saturating_add(BUFFER_HEADROOM);
        if end > self.data.len() {
            self.grow(end)?;
        }
        Ok(())
    }

    /// Grow to hold at least `required` bytes.
    ///
    /// Small buffers are over-provisioned aggressively (4× the target,
    /// rounded up to the next 4 KiB page); large ones grow by 2× up to
    /// 64 MiB and 1.25× beyond that, rounded to the nearest page and
    /// capped at [`MAX_BUFFER_SIZE`].
    fn grow(&mut self, required: usize) -> Result<()> {
        let new_capacity = if required > SMALL_BUFFER_CEILING {
            ensure!(required <= MAX_BUFFER_SIZE, BufferOverflowSnafu { required });
            let required = required as u64;
            let target = if required > AGGRESSIVE_GROWTH_CEILING as u64 {
                required + required / 4
            } else {
                required * 2
            };
            let target = target.max(LARGE_GROWTH_FLOOR);
            let rounded = (target + PAGE / 2) / PAGE * PAGE;
            rounded.min(MAX_BUFFER_SIZE as u64) as usize
        } else {
            let target = (required * 4).max(self.data.len().saturating_sub(1));
            ((target >> 12) + 1) << 12
        };
        self.data.resize(new_capacity, 0);
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) {
        self.data[self.offset] = value;
        self.offset += 1;
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.data[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
    }

    pub fn put_u16(&mut self, value: u16) {
        LittleEndian::write_u16(&mut self.data[self.offset..self.offset + 2], value);
        self.offset += 2;
    }

    pub fn put_u24(&mut self, value: u32) {
        LittleEndian::write_u24(&mut self.data[self.offset..self.offset + 3], value);
        self.offset += 3;
    }

    pub fn put_u32(&mut self, value: u32) {
        LittleEndian::write_u32(&mut self.data[self.offset..self.offset + 4], value);
        self.offset += 4;
    }

    pub fn put_i16(&mut self, value: i16) {
        LittleEndian::write_i16(&mut self.data[self.offset..self.offset + 2], value);
        self.offset += 2;
    }

    pub fn put_i32(&mut self, value: i32) {
        LittleEndian::write_i32(&mut self.data[self.offset..self.offset + 4], value);
        self.offset += 4;
    }

    pub fn put_f32(&mut self, value: f32) {
        LittleEndian::write_f32(&mut self.data[self.offset..self.offset + 4], value);
        self.offset += 4;
    }

    pub fn put_f64(&mut self, value: f64) {
        LittleEndian::write_f64(&mut self.data[self.offset..self.offset + 8], value);
        self.offset += 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_growth_rounds_up_to_pages() {
        let mut buf = PackBuffer::with_capacity(32);
        buf.ensure(100).unwrap();
        // ((max(e*4, old-1) >> 12) + 1) << 12 for e = 110
        assert_eq!(buf.data.len(), 4096);
        buf.put_slice(&[0xAB; 100]);
        assert_eq!(buf.offset(), 100);
    }

    #[test]
    fn growth_preserves_the_written_prefix() {
        let mut buf = PackBuffer::with_capacity(32);
        buf.ensure(4).unwrap();
        buf.put_slice(b"abcd");
        buf.ensure(8000).unwrap();
        assert_eq!(&buf.written()[..4], b"abcd");
    }

    #[test]
    fn rewinding_truncates_the_written_prefix() {
        let mut buf = PackBuffer::new();
        buf.ensure(3).unwrap();
        buf.put_slice(b"xyz");
        buf.set_offset(1);
        buf.put_u8(b'!');
        assert_eq!(buf.written(), b"x!");
    }

    #[test]
    fn oversized_requests_are_rejected() {
        let mut buf = PackBuffer::new();
        assert!(buf.grow(MAX_BUFFER_SIZE + 1).is_err());
    }
}
