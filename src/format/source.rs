//! Byte sources for the streaming decoder
//!
//! The decoder consumes bytes through the [`DataSource`] trait so it can
//! run against a fully-buffered file as well as a source that is still
//! growing (a progressive download, a file being written). A source that
//! cannot serve a range yet returns [`Error::NotYetAvailable`]; the caller
//! retries once more data has arrived.

use crate::error::{Error, Result};
use bytes::Bytes;

/// Random-access byte source
pub trait DataSource {
    /// Final size in bytes, when known
    fn total_size(&self) -> Option<u64>;

    /// Read exactly `len` bytes at `offset`.
    ///
    /// Returns [`Error::NotYetAvailable`] when the range has not arrived
    /// yet, and [`Error::TruncatedInput`] when it lies past the final size.
    fn read(&mut self, offset: u64, len: usize) -> Result<Bytes>;

    /// Whether `len` bytes at `offset` can currently be read
    fn is_available(&self, offset: u64, len: usize) -> bool;
}

/// Fully-buffered in-memory source
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: Bytes) -> Self {
        MemorySource { data }
    }

    /// Length of the underlying buffer
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        MemorySource::new(Bytes::from(data))
    }
}

impl From<Bytes> for MemorySource {
    fn from(data: Bytes) -> Self {
        MemorySource::new(data)
    }
}

impl DataSource for MemorySource {
    fn total_size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn read(&mut self, offset: u64, len: usize) -> Result<Bytes> {
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| Error::truncated("read range overflows"))?;
        if end > self.data.len() as u64 {
            return Err(Error::truncated(format!(
                "read of {} bytes at {} past end of {}-byte source",
                len,
                offset,
                self.data.len()
            )));
        }
        Ok(self.data.slice(offset as usize..end as usize))
    }

    fn is_available(&self, offset: u64, len: usize) -> bool {
        offset + len as u64 <= self.data.len() as u64
    }
}
