//! Encoder orchestrator
//!
//! Drives the opcode codecs and the container framing: SYNC markers before
//! keyframes, per-chunk LZ4 gating, the keyframe index, and the
//! total-frames patch on finalize. Uncompressed frame bodies are written
//! straight into the output with the chunk size patched afterwards;
//! compressed bodies go through a per-frame scratch buffer first.

use crate::codec::{rgb::RgbEncoder, yuv, END_MARKER};
use crate::color::{self, Subsampling, YuvPlanes};
use crate::error::{Error, Result};
use crate::format::chunk::{
    ChunkHeader, ChunkType, CHUNK_FLAG_COMPRESSED, CHUNK_FLAG_YUV, SYNC_MAGIC,
};
use crate::format::header::{Colorspace, FileHeader, TOTAL_FRAMES_OFFSET, VERSION_2};
use crate::lz4;
use crate::util::ByteWriter;
use bytes::Bytes;
use tracing::debug;

/// One keyframe index entry: where a SYNC chunk begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    frame_number: u32,
    offset: u64,
    timestamp_us: u32,
}

/// QOV stream encoder
pub struct QovEncoder {
    header: FileHeader,
    writer: ByteWriter,
    rgb: RgbEncoder,
    /// Previous RGBA frame (RGB mode)
    prev_frame: Option<Vec<u8>>,
    /// Previous planes (YUV mode)
    prev_planes: Option<YuvPlanes>,
    keyframe_index: Vec<IndexEntry>,
    frame_count: u32,
    last_timestamp_us: u32,
    compression_enabled: bool,
    header_written: bool,
    finished: Option<Bytes>,
    subsampling: Option<Subsampling>,
}

impl QovEncoder {
    /// Create an encoder.
    ///
    /// Fails with [`Error::InvalidArgument`] for dimensions outside
    /// 1..=65535 or a zero fps numerator or denominator.
    pub fn new(
        width: u16,
        height: u16,
        fps_num: u16,
        fps_den: u16,
        flags: u8,
        colorspace: Colorspace,
        compression_enabled: bool,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_argument(format!(
                "dimensions {}x{} out of range",
                width, height
            )));
        }
        if fps_den == 0 {
            return Err(Error::invalid_argument("fps denominator is zero"));
        }
        if fps_num == 0 {
            return Err(Error::invalid_argument("fps numerator is zero"));
        }

        let header = FileHeader {
            version: VERSION_2,
            flags,
            width,
            height,
            fps_num,
            fps_den,
            total_frames: 0,
            audio_channels: 0,
            audio_rate_hz: 0,
            colorspace,
        };

        Ok(QovEncoder {
            subsampling: colorspace.subsampling(),
            header,
            writer: ByteWriter::new(),
            rgb: RgbEncoder::new(),
            prev_frame: None,
            prev_planes: None,
            keyframe_index: Vec::new(),
            frame_count: 0,
            last_timestamp_us: 0,
            compression_enabled,
            header_written: false,
            finished: None,
        })
    }

    /// Number of frames encoded so far
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Emit the 24-byte file header with a placeholder frame count
    pub fn write_header(&mut self) -> Result<()> {
        self.check_not_finished()?;
        if self.header_written {
            return Err(Error::invalid_argument("header already written"));
        }
        self.header.write(&mut self.writer);
        self.header_written = true;
        Ok(())
    }

    /// Encode a keyframe from raster RGBA pixels
    pub fn encode_keyframe(&mut self, pixels: &[u8], timestamp_us: u32) -> Result<()> {
        self.check_frame_call(pixels, timestamp_us)?;
        self.write_sync(timestamp_us)?;
        self.write_frame_chunk(ChunkType::Keyframe, pixels, timestamp_us)?;
        self.finish_frame(timestamp_us);
        Ok(())
    }

    /// Encode a P-frame from raster RGBA pixels.
    ///
    /// Before any keyframe exists this behaves as [`Self::encode_keyframe`];
    /// otherwise no SYNC marker is emitted.
    pub fn encode_pframe(&mut self, pixels: &[u8], timestamp_us: u32) -> Result<()> {
        if self.frame_count == 0 {
            return self.encode_keyframe(pixels, timestamp_us);
        }
        self.check_frame_call(pixels, timestamp_us)?;
        self.write_frame_chunk(ChunkType::Pframe, pixels, timestamp_us)?;
        self.finish_frame(timestamp_us);
        Ok(())
    }

    /// Write the INDEX chunk (when enabled), the END chunk, and patch the
    /// frame count into the file header. Returns the complete file bytes;
    /// repeated calls return the same bytes.
    pub fn finish(&mut self) -> Result<Bytes> {
        if let Some(bytes) = &self.finished {
            return Ok(bytes.clone());
        }
        if !self.header_written {
            return Err(Error::invalid_argument("header not written"));
        }

        if self.header.has_index() && !self.keyframe_index.is_empty() {
            let size = 4 + 16 * self.keyframe_index.len() as u32;
            ChunkHeader {
                chunk_type: ChunkType::Index,
                flags: 0,
                size,
                timestamp_us: 0,
            }
            .write(self.header.version, &mut self.writer)?;
            self.writer.write_u32(self.keyframe_index.len() as u32);
            for entry in &self.keyframe_index {
                self.writer.write_u32(entry.frame_number);
                self.writer.write_u64(entry.offset);
                self.writer.write_u32(entry.timestamp_us);
            }
        }

        ChunkHeader {
            chunk_type: ChunkType::End,
            flags: 0,
            size: 0,
            timestamp_us: 0,
        }
        .write(self.header.version, &mut self.writer)?;
        self.writer.write_bytes(&END_MARKER);

        self.writer
            .patch_u32(TOTAL_FRAMES_OFFSET, self.frame_count)?;

        debug!(
            frames = self.frame_count,
            keyframes = self.keyframe_index.len(),
            bytes = self.writer.size(),
            "finalized stream"
        );
        let bytes = self.writer.to_bytes();
        self.finished = Some(bytes.clone());
        Ok(bytes)
    }

    fn check_not_finished(&self) -> Result<()> {
        if self.finished.is_some() {
            return Err(Error::invalid_argument("encoder already finished"));
        }
        Ok(())
    }

    fn check_frame_call(&self, pixels: &[u8], timestamp_us: u32) -> Result<()> {
        self.check_not_finished()?;
        if !self.header_written {
            return Err(Error::invalid_argument("header not written"));
        }
        let expected = self.header.width as usize * self.header.height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::invalid_argument(format!(
                "pixel buffer is {} bytes, expected {} for {}x{}",
                pixels.len(),
                expected,
                self.header.width,
                self.header.height
            )));
        }
        if self.frame_count > 0 && timestamp_us < self.last_timestamp_us {
            return Err(Error::invalid_argument(format!(
                "timestamp {} decreases below {}",
                timestamp_us, self.last_timestamp_us
            )));
        }
        Ok(())
    }

    fn finish_frame(&mut self, timestamp_us: u32) {
        self.last_timestamp_us = timestamp_us;
        self.frame_count += 1;
    }

    /// SYNC chunk plus the keyframe index entry pointing at it
    fn write_sync(&mut self, timestamp_us: u32) -> Result<()> {
        let offset = self.writer.size() as u64;
        if self.header.has_index() {
            self.keyframe_index.push(IndexEntry {
                frame_number: self.frame_count,
                offset,
                timestamp_us,
            });
        }
        ChunkHeader {
            chunk_type: ChunkType::Sync,
            flags: 0,
            size: 8,
            timestamp_us,
        }
        .write(self.header.version, &mut self.writer)?;
        self.writer.write_bytes(SYNC_MAGIC);
        self.writer.write_u32(self.frame_count);
        Ok(())
    }

    /// Frame chunk framing shared by keyframes and P-frames
    fn write_frame_chunk(
        &mut self,
        chunk_type: ChunkType,
        pixels: &[u8],
        timestamp_us: u32,
    ) -> Result<()> {
        let yuv_mode = self.header.colorspace.is_yuv();
        let chunk_flags = if yuv_mode { CHUNK_FLAG_YUV } else { 0 };

        if self.compression_enabled {
            // Buffer the body so it can be handed to LZ4 whole
            let mut scratch = ByteWriter::new();
            self.encode_frame_body(chunk_type, pixels, &mut scratch)?;
            scratch.write_bytes(&END_MARKER);

            match lz4::compress(scratch.as_slice()) {
                Some(compressed) => {
                    debug!(
                        frame = self.frame_count,
                        raw = scratch.size(),
                        compressed = compressed.len(),
                        "frame chunk compressed"
                    );
                    ChunkHeader {
                        chunk_type,
                        flags: chunk_flags | CHUNK_FLAG_COMPRESSED,
                        size: 4 + compressed.len() as u32,
                        timestamp_us,
                    }
                    .write(self.header.version, &mut self.writer)?;
                    self.writer.write_u32(scratch.size() as u32);
                    self.writer.write_bytes(&compressed);
                }
                None => {
                    ChunkHeader {
                        chunk_type,
                        flags: chunk_flags,
                        size: scratch.size() as u32,
                        timestamp_us,
                    }
                    .write(self.header.version, &mut self.writer)?;
                    self.writer.write_bytes(scratch.as_slice());
                }
            }
        } else {
            // Write the header with a placeholder size, the body directly
            // into the output, then patch the size in place
            let header_pos = self.writer.size();
            ChunkHeader {
                chunk_type,
                flags: chunk_flags,
                size: 0,
                timestamp_us,
            }
            .write(self.header.version, &mut self.writer)?;
            let payload_start = self.writer.size();

            // Work around the borrow of self.writer: encode into a local
            // writer view by temporarily taking it
            let mut writer = std::mem::take(&mut self.writer);
            let result = self.encode_frame_body(chunk_type, pixels, &mut writer);
            self.writer = writer;
            result?;
            self.writer.write_bytes(&END_MARKER);

            let payload_size = (self.writer.size() - payload_start) as u32;
            self.writer.patch_u32(header_pos + 2, payload_size)?;
        }
        Ok(())
    }

    /// Opcode body without marker, and the reference-state update
    fn encode_frame_body(
        &mut self,
        chunk_type: ChunkType,
        pixels: &[u8],
        out: &mut ByteWriter,
    ) -> Result<()> {
        if self.header.colorspace.is_yuv() {
            self.encode_yuv_body(chunk_type, pixels, out)
        } else {
            self.encode_rgb_body(chunk_type, pixels, out);
            Ok(())
        }
    }

    fn encode_rgb_body(&mut self, chunk_type: ChunkType, pixels: &[u8], out: &mut ByteWriter) {
        match (chunk_type, self.prev_frame.as_deref()) {
            (ChunkType::Pframe, Some(reference)) => {
                self.rgb.encode_pframe(pixels, reference, out);
            }
            _ => self.rgb.encode_keyframe(pixels, out),
        }
        match self.prev_frame.as_deref_mut() {
            Some(prev) => prev.copy_from_slice(pixels),
            None => self.prev_frame = Some(pixels.to_vec()),
        }
    }

    fn encode_yuv_body(
        &mut self,
        chunk_type: ChunkType,
        pixels: &[u8],
        out: &mut ByteWriter,
    ) -> Result<()> {
        let subsampling = self
            .subsampling
            .ok_or_else(|| Error::invalid_argument("YUV body without YUV colorspace"))?;
        let planes = color::rgba_to_planes(
            pixels,
            self.header.width as usize,
            self.header.height as usize,
            subsampling,
            self.header.has_alpha(),
        )?;

        match (chunk_type, self.prev_planes.as_ref()) {
            (ChunkType::Pframe, Some(reference)) => {
                yuv::encode_plane_pframe(&planes.y, &reference.y, out);
                yuv::encode_plane_pframe(&planes.u, &reference.u, out);
                yuv::encode_plane_pframe(&planes.v, &reference.v, out);
                if let (Some(a), Some(ref_a)) = (planes.a.as_ref(), reference.a.as_ref()) {
                    yuv::encode_plane_pframe(a, ref_a, out);
                }
            }
            _ => {
                yuv::encode_plane_keyframe(&planes.y, out);
                yuv::encode_plane_keyframe(&planes.u, out);
                yuv::encode_plane_keyframe(&planes.v, out);
                if let Some(a) = planes.a.as_ref() {
                    yuv::encode_plane_keyframe(a, out);
                }
            }
        }
        self.prev_planes = Some(planes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::header::FLAG_HAS_INDEX;

    fn black_frame(w: usize, h: usize) -> Vec<u8> {
        let mut f = vec![0u8; w * h * 4];
        for px in f.chunks_exact_mut(4) {
            px[3] = 255;
        }
        f
    }

    #[test]
    fn test_new_validation() {
        assert!(QovEncoder::new(0, 1, 30, 1, 0, Colorspace::Srgb, false).is_err());
        assert!(QovEncoder::new(1, 0, 30, 1, 0, Colorspace::Srgb, false).is_err());
        assert!(QovEncoder::new(1, 1, 30, 0, 0, Colorspace::Srgb, false).is_err());
        assert!(QovEncoder::new(1, 1, 0, 1, 0, Colorspace::Srgb, false).is_err());
        assert!(QovEncoder::new(1, 1, 30, 1, 0, Colorspace::Srgb, false).is_ok());
    }

    #[test]
    fn test_frame_requires_header() {
        let mut enc = QovEncoder::new(2, 2, 30, 1, 0, Colorspace::Srgb, false).unwrap();
        let frame = black_frame(2, 2);
        assert!(enc.encode_keyframe(&frame, 0).is_err());
        enc.write_header().unwrap();
        assert!(enc.write_header().is_err());
        assert!(enc.encode_keyframe(&frame, 0).is_ok());
    }

    #[test]
    fn test_minimal_keyframe_bytes() {
        // S1: 2x2 black frame, version 2, no index, no compression
        let mut enc = QovEncoder::new(2, 2, 30, 1, 0, Colorspace::Srgb, false).unwrap();
        enc.write_header().unwrap();
        enc.encode_keyframe(&black_frame(2, 2), 0).unwrap();
        let bytes = enc.finish().unwrap();

        // header | SYNC (10+8) | KEYFRAME (10+9) | END (10+8)
        assert_eq!(bytes.len(), 24 + 18 + 19 + 18);
        // SYNC chunk
        assert_eq!(bytes[24], 0x00);
        assert_eq!(&bytes[26..30], &[0, 0, 0, 8]);
        assert_eq!(&bytes[34..38], b"QOVS");
        assert_eq!(&bytes[38..42], &[0, 0, 0, 0]);
        // KEYFRAME chunk: size 9, body RUN(4) + marker
        assert_eq!(bytes[42], 0x01);
        assert_eq!(&bytes[44..48], &[0, 0, 0, 9]);
        assert_eq!(bytes[52], 0xC3);
        assert_eq!(&bytes[53..61], &END_MARKER);
        // END chunk + trailing marker
        assert_eq!(bytes[61], 0xFF);
        assert_eq!(&bytes[bytes.len() - 8..], &END_MARKER);
        // total_frames patched to 1
        assert_eq!(&bytes[14..18], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_pframe_before_keyframe_promotes() {
        let mut enc = QovEncoder::new(2, 2, 30, 1, 0, Colorspace::Srgb, false).unwrap();
        enc.write_header().unwrap();
        enc.encode_pframe(&black_frame(2, 2), 0).unwrap();
        let bytes = enc.finish().unwrap();
        // First chunk after the header is a SYNC, then a KEYFRAME
        assert_eq!(bytes[24], 0x00);
        assert_eq!(bytes[42], 0x01);
    }

    #[test]
    fn test_finish_idempotent_and_blocks_frames() {
        let mut enc = QovEncoder::new(2, 2, 30, 1, 0, Colorspace::Srgb, false).unwrap();
        enc.write_header().unwrap();
        enc.encode_keyframe(&black_frame(2, 2), 0).unwrap();
        let first = enc.finish().unwrap();
        let second = enc.finish().unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            enc.encode_keyframe(&black_frame(2, 2), 1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            enc.encode_pframe(&black_frame(2, 2), 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_stream() {
        let mut enc = QovEncoder::new(4, 4, 30, 1, 0, Colorspace::Srgb, false).unwrap();
        enc.write_header().unwrap();
        let bytes = enc.finish().unwrap();
        // header + END chunk + marker, total_frames 0
        assert_eq!(bytes.len(), 24 + 10 + 8);
        assert_eq!(&bytes[14..18], &[0, 0, 0, 0]);
        assert_eq!(bytes[24], 0xFF);
    }

    #[test]
    fn test_index_chunk_written() {
        let mut enc =
            QovEncoder::new(2, 2, 30, 1, FLAG_HAS_INDEX, Colorspace::Srgb, false).unwrap();
        enc.write_header().unwrap();
        let frame = black_frame(2, 2);
        enc.encode_keyframe(&frame, 0).unwrap();
        enc.encode_pframe(&frame, 1000).unwrap();
        enc.encode_keyframe(&frame, 2000).unwrap();
        let bytes = enc.finish().unwrap();

        // INDEX chunk sits immediately before END: find it by scanning
        let mut pos = 24;
        let mut index_pos = None;
        while pos < bytes.len() {
            let t = bytes[pos];
            let size = u32::from_be_bytes([bytes[pos + 2], bytes[pos + 3], bytes[pos + 4], bytes[pos + 5]]) as usize;
            if t == 0xF0 {
                index_pos = Some(pos);
            }
            if t == 0xFF {
                break;
            }
            pos += 10 + size;
        }
        let index_pos = index_pos.expect("INDEX chunk present");
        // count = 2, entries of 16 bytes
        let count = u32::from_be_bytes([
            bytes[index_pos + 10],
            bytes[index_pos + 11],
            bytes[index_pos + 12],
            bytes[index_pos + 13],
        ]);
        assert_eq!(count, 2);
        // First entry points at the first SYNC chunk (offset 24)
        let off = u64::from_be_bytes([
            bytes[index_pos + 18],
            bytes[index_pos + 19],
            bytes[index_pos + 20],
            bytes[index_pos + 21],
            bytes[index_pos + 22],
            bytes[index_pos + 23],
            bytes[index_pos + 24],
            bytes[index_pos + 25],
        ]);
        assert_eq!(off, 24);
    }

    #[test]
    fn test_decreasing_timestamp_rejected() {
        let mut enc = QovEncoder::new(2, 2, 30, 1, 0, Colorspace::Srgb, false).unwrap();
        enc.write_header().unwrap();
        let frame = black_frame(2, 2);
        enc.encode_keyframe(&frame, 100).unwrap();
        assert!(enc.encode_pframe(&frame, 50).is_err());
    }

    #[test]
    fn test_compression_gating_solid_vs_noise() {
        // S4: a solid-colour frame compresses; a noise frame does not
        let w = 64usize;
        let h = 64usize;
        let solid = {
            let mut f = vec![0u8; w * h * 4];
            for px in f.chunks_exact_mut(4) {
                px.copy_from_slice(&[40, 90, 200, 255]);
            }
            f
        };
        let noise = {
            let mut f = Vec::with_capacity(w * h * 4);
            let mut x = 0x12345678u32;
            for _ in 0..w * h {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                f.extend_from_slice(&x.to_be_bytes());
            }
            f
        };

        let mut enc = QovEncoder::new(w as u16, h as u16, 30, 1, 0, Colorspace::Srgb, true).unwrap();
        enc.write_header().unwrap();
        enc.encode_keyframe(&solid, 0).unwrap();
        enc.encode_keyframe(&noise, 1000).unwrap();
        let bytes = enc.finish().unwrap();

        // First keyframe chunk: flags carry the compressed bit
        let mut pos = 24usize;
        let mut frame_flags = Vec::new();
        while pos < bytes.len() {
            let t = bytes[pos];
            let flags = bytes[pos + 1];
            let size = u32::from_be_bytes([bytes[pos + 2], bytes[pos + 3], bytes[pos + 4], bytes[pos + 5]]) as usize;
            if t == 0x01 || t == 0x02 {
                frame_flags.push(flags);
            }
            if t == 0xFF {
                break;
            }
            pos += 10 + size;
        }
        assert_eq!(frame_flags.len(), 2);
        assert_ne!(frame_flags[0] & CHUNK_FLAG_COMPRESSED, 0);
        assert_eq!(frame_flags[1] & CHUNK_FLAG_COMPRESSED, 0);
    }
}
