//! Growable byte writer for assembling QOV streams
//!
//! All multi-byte integers in QOV framing are big-endian. Chunk headers are
//! written before their payload size is known, so the writer supports
//! patching a `u32` at an already-written offset.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

/// Append-only byte buffer with big-endian primitives and in-place patching
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        ByteWriter { buf: Vec::new() }
    }

    /// Create a writer with reserved capacity
    pub fn with_capacity(capacity: usize) -> Self {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append a single byte
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Append a big-endian u16
    pub fn write_u16(&mut self, v: u16) {
        let mut tmp = [0u8; 2];
        BigEndian::write_u16(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    /// Append a big-endian u32
    pub fn write_u32(&mut self, v: u32) {
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    /// Append a big-endian u64
    pub fn write_u64(&mut self, v: u64) {
        let mut tmp = [0u8; 8];
        BigEndian::write_u64(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    /// Append a byte slice verbatim
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Overwrite four already-written bytes at `pos` with a big-endian u32
    pub fn patch_u32(&mut self, pos: usize, v: u32) -> Result<()> {
        if pos + 4 > self.buf.len() {
            return Err(Error::WriterExhausted(format!(
                "patch at {} past end of buffer ({} bytes)",
                pos,
                self.buf.len()
            )));
        }
        BigEndian::write_u32(&mut self.buf[pos..pos + 4], v);
        Ok(())
    }

    /// View the written bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer into an immutable byte buffer
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }

    /// Snapshot the written bytes without consuming the writer
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    /// Consume the writer into a plain vector
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}
