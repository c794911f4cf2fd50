//! Pre-sized cursor buffer with fixed endianness.
//!
//! A [`ByteBuffer`] alternates between a write phase and a read phase:
//! `put_*` calls advance the write cursor, [`ByteBuffer::flip`] switches to
//! reading from the start up to whatever was written, and `get_*` calls
//! advance the read cursor. The backing storage never grows.

use crate::error::{FrameError, Result};

/// Capacity of a small control buffer (input events, headers).
pub const CONTROL_CAPACITY: usize = 64;

/// Capacity of a large bulk buffer (media packets, stats text).
pub const BULK_CAPACITY: usize = 64 * 1024;

/// Byte order of multi-byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Which cursor is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    Write,
    Read,
}

/// Fixed-capacity byte buffer with a write cursor and a read cursor.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
    mode: BufferMode,
    endian: Endian,
}

impl ByteBuffer {
    /// Create a zeroed buffer in write mode.
    pub fn with_capacity(capacity: usize, endian: Endian) -> Self {
        Self {
            data: vec![0; capacity],
            position: 0,
            limit: capacity,
            mode: BufferMode::Write,
            endian,
        }
    }

    /// Big-endian buffer sized for control messages.
    pub fn control() -> Self {
        Self::with_capacity(CONTROL_CAPACITY, Endian::Big)
    }

    /// Big-endian buffer sized for bulk payloads.
    pub fn bulk() -> Self {
        Self::with_capacity(BULK_CAPACITY, Endian::Big)
    }

    /// Wrap received bytes in a buffer that is already in read mode.
    pub fn wrap(bytes: &[u8], endian: Endian) -> Self {
        Self {
            data: bytes.to_vec(),
            position: 0,
            limit: bytes.len(),
            mode: BufferMode::Read,
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Fail fast if a caller assumes a byte order this buffer was not built with.
    pub fn ensure_endian(&self, expected: Endian) -> Result<()> {
        if self.endian != expected {
            return Err(FrameError::EndiannessMismatch {
                expected,
                actual: self.endian,
            });
        }
        Ok(())
    }

    /// Rewind the write cursor and return to write mode.
    pub fn reset(&mut self) {
        self.position = 0;
        self.limit = self.data.len();
        self.mode = BufferMode::Write;
    }

    /// Switch to read mode over the bytes written so far.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
        self.mode = BufferMode::Read;
    }

    /// Bytes left before the limit of the current mode.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// Bytes written so far (write mode) or the readable window (read mode).
    pub fn written(&self) -> &[u8] {
        match self.mode {
            BufferMode::Write => &self.data[..self.position],
            BufferMode::Read => &self.data[..self.limit],
        }
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put_raw("put_u8", &[value])
    }

    pub fn put_bool(&mut self, value: bool) -> Result<()> {
        self.put_raw("put_bool", &[u8::from(value)])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        let bytes = match self.endian {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        };
        self.put_raw("put_u16", &bytes)
    }

    pub fn put_i16(&mut self, value: i16) -> Result<()> {
        let bytes = match self.endian {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        };
        self.put_raw("put_i16", &bytes)
    }

    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        let bytes = match self.endian {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        };
        self.put_raw("put_u32", &bytes)
    }

    pub fn put_f32(&mut self, value: f32) -> Result<()> {
        let bytes = match self.endian {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        };
        self.put_raw("put_f32", &bytes)
    }

    pub fn put_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.put_raw("put_bytes", value)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        let [b] = self.get_array::<1>("get_u8")?;
        Ok(b)
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let bytes = self.get_array::<2>("get_u16")?;
        Ok(match self.endian {
            Endian::Big => u16::from_be_bytes(bytes),
            Endian::Little => u16::from_le_bytes(bytes),
        })
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        let bytes = self.get_array::<2>("get_i16")?;
        Ok(match self.endian {
            Endian::Big => i16::from_be_bytes(bytes),
            Endian::Little => i16::from_le_bytes(bytes),
        })
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.get_array::<4>("get_u32")?;
        Ok(match self.endian {
            Endian::Big => u32::from_be_bytes(bytes),
            Endian::Little => u32::from_le_bytes(bytes),
        })
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        let bytes = self.get_array::<4>("get_f32")?;
        Ok(match self.endian {
            Endian::Big => f32::from_be_bytes(bytes),
            Endian::Little => f32::from_le_bytes(bytes),
        })
    }

    /// Read exactly `len` bytes.
    pub fn get_bytes(&mut self, len: usize) -> Result<&[u8]> {
        let start = self.take("get_bytes", len)?;
        Ok(&self.data[start..start + len])
    }

    /// Read everything up to the limit.
    pub fn get_remaining(&mut self) -> Result<&[u8]> {
        let len = self.remaining();
        self.get_bytes(len)
    }

    fn put_raw(&mut self, op: &'static str, bytes: &[u8]) -> Result<()> {
        if self.mode != BufferMode::Write {
            return Err(FrameError::WrongMode {
                op,
                actual: self.mode,
            });
        }
        if bytes.len() > self.remaining() {
            return Err(FrameError::OutOfBounds {
                op,
                needed: bytes.len(),
                available: self.remaining(),
            });
        }
        self.data[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        Ok(())
    }

    fn get_array<const N: usize>(&mut self, op: &'static str) -> Result<[u8; N]> {
        let start = self.take(op, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[start..start + N]);
        Ok(out)
    }

    fn take(&mut self, op: &'static str, len: usize) -> Result<usize> {
        if self.mode != BufferMode::Read {
            return Err(FrameError::WrongMode {
                op,
                actual: self.mode,
            });
        }
        if len > self.remaining() {
            return Err(FrameError::OutOfBounds {
                op,
                needed: len,
                available: self.remaining(),
            });
        }
        let start = self.position;
        self.position += len;
        Ok(start)
    }
}
