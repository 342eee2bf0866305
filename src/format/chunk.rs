//! Chunk framing: types, headers and descriptors
//!
//! A chunk is the container's atomic unit: a fixed header (8 bytes in
//! version 1 with 16-bit sizes, 10 bytes in version 2 with 32-bit sizes)
//! followed by `size` payload bytes. `size` excludes the header but includes
//! the 8-byte end marker of frame chunks and the 4-byte uncompressed-size
//! prefix of compressed chunks.

use crate::error::{Error, Result};
use crate::format::header::{VERSION_1, VERSION_2};
use crate::util::ByteWriter;
use byteorder::{BigEndian, ByteOrder};

/// Magic bytes inside a SYNC chunk body, followed by the frame number
pub const SYNC_MAGIC: &[u8; 4] = b"QOVS";

// Chunk flag bits
/// Frame body is YUV plane streams rather than RGB opcodes
pub const CHUNK_FLAG_YUV: u8 = 0x01;
/// Frame carries motion vectors (reserved; never set by this encoder)
pub const CHUNK_FLAG_MOTION: u8 = 0x02;
/// Payload is LZ4-wrapped with an uncompressed-size prefix
pub const CHUNK_FLAG_COMPRESSED: u8 = 0x10;

/// Chunk type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// 0x00 — resynchronization marker before every keyframe
    Sync,
    /// 0x01 — intra-coded frame
    Keyframe,
    /// 0x02 — predicted frame
    Pframe,
    /// 0x03 — bidirectional frame (reserved, never emitted)
    Bframe,
    /// 0x10 — audio payload (reserved, opaque to this codec)
    Audio,
    /// 0xF0 — keyframe index table
    Index,
    /// 0xFF — end of stream
    End,
}

impl ChunkType {
    /// Parse a chunk type byte
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0x00 => Ok(ChunkType::Sync),
            0x01 => Ok(ChunkType::Keyframe),
            0x02 => Ok(ChunkType::Pframe),
            0x03 => Ok(ChunkType::Bframe),
            0x10 => Ok(ChunkType::Audio),
            0xF0 => Ok(ChunkType::Index),
            0xFF => Ok(ChunkType::End),
            other => Err(Error::corrupted(format!(
                "unknown chunk type 0x{:02X}",
                other
            ))),
        }
    }

    /// Byte value written to the stream
    pub fn as_byte(&self) -> u8 {
        match self {
            ChunkType::Sync => 0x00,
            ChunkType::Keyframe => 0x01,
            ChunkType::Pframe => 0x02,
            ChunkType::Bframe => 0x03,
            ChunkType::Audio => 0x10,
            ChunkType::Index => 0xF0,
            ChunkType::End => 0xFF,
        }
    }

    /// Whether the chunk carries a coded video frame
    pub fn is_frame(&self) -> bool {
        matches!(self, ChunkType::Keyframe | ChunkType::Pframe | ChunkType::Bframe)
    }
}

/// Parsed chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_type: ChunkType,
    pub flags: u8,
    /// Payload size, excluding this header
    pub size: u32,
    /// Microsecond timestamp; 0 for INDEX and END
    pub timestamp_us: u32,
}

impl ChunkHeader {
    /// Header length for a container version
    pub fn size_for_version(version: u8) -> usize {
        if version == VERSION_1 {
            8
        } else {
            10
        }
    }

    /// Serialize for a container version
    pub fn write(&self, version: u8, out: &mut ByteWriter) -> Result<()> {
        out.write_u8(self.chunk_type.as_byte());
        out.write_u8(self.flags);
        if version == VERSION_1 {
            if self.size > u16::MAX as u32 {
                return Err(Error::invalid_argument(format!(
                    "chunk of {} bytes does not fit a version-1 size field",
                    self.size
                )));
            }
            out.write_u16(self.size as u16);
        } else {
            out.write_u32(self.size);
        }
        out.write_u32(self.timestamp_us);
        Ok(())
    }

    /// Parse a chunk header for a container version
    pub fn parse(version: u8, data: &[u8]) -> Result<Self> {
        let needed = Self::size_for_version(version);
        if data.len() < needed {
            return Err(Error::truncated(format!(
                "chunk header needs {} bytes, got {}",
                needed,
                data.len()
            )));
        }
        let chunk_type = ChunkType::from_byte(data[0])?;
        let flags = data[1];
        let (size, ts_off) = if version == VERSION_1 {
            (BigEndian::read_u16(&data[2..4]) as u32, 4)
        } else {
            (BigEndian::read_u32(&data[2..6]), 6)
        };
        Ok(ChunkHeader {
            chunk_type,
            flags,
            size,
            timestamp_us: BigEndian::read_u32(&data[ts_off..ts_off + 4]),
        })
    }
}

/// Decoder-side chunk descriptor, recorded once during the index scan and
/// never mutated afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Byte offset of the chunk header in the file
    pub offset: u64,
    pub chunk_type: ChunkType,
    pub flags: u8,
    /// Chunk length including its header
    pub size_with_header: u32,
    pub timestamp_us: u32,
    /// Position in the frame sequence for frame chunks
    pub frame_index: Option<u32>,
}

impl ChunkInfo {
    /// Offset of the first payload byte
    pub fn payload_offset(&self, version: u8) -> u64 {
        self.offset + ChunkHeader::size_for_version(version) as u64
    }

    /// Payload length (excluding the header)
    pub fn payload_size(&self, version: u8) -> u32 {
        self.size_with_header - ChunkHeader::size_for_version(version) as u32
    }
}
