//! Streaming decoder orchestrator
//!
//! Consumes a [`DataSource`], builds a chunk index by linear scan, and
//! reconstructs any frame on demand. Sequential requests decode
//! incrementally; a non-sequential request resets all decoder state and
//! replays from the nearest preceding keyframe, which is exact because
//! every keyframe starts from reset cache state.
//!
//! All operations are cooperative: against a source that is still growing
//! they return [`Error::NotYetAvailable`] with their progress retained, and
//! the caller retries once more bytes have arrived.

use crate::codec::{rgb::RgbDecoder, yuv, VideoFrame, END_MARKER};
use crate::color::{self, YuvPlanes};
use crate::error::{Error, Result};
use crate::format::chunk::{
    ChunkHeader, ChunkInfo, ChunkType, CHUNK_FLAG_COMPRESSED, CHUNK_FLAG_YUV,
};
use crate::format::header::{FileHeader, HEADER_SIZE};
use crate::format::source::DataSource;
use crate::lz4;
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use tracing::{debug, trace, warn};

/// Parsed stream metadata: header, chunk table, keyframes and duration
#[derive(Debug, Clone)]
pub struct FileStats {
    pub header: FileHeader,
    pub chunks: Vec<ChunkInfo>,
    /// Frame numbers of all keyframes
    pub keyframe_indices: Vec<usize>,
    pub frame_count: usize,
    /// Timestamp of the last frame chunk
    pub duration_us: u32,
    pub chunk_counts: ChunkCounts,
}

/// Per-type chunk tally, in the manner of a stream probe report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkCounts {
    pub sync: usize,
    pub keyframe: usize,
    pub pframe: usize,
    pub bframe: usize,
    pub audio: usize,
    pub index: usize,
    pub end: usize,
}

/// QOV streaming decoder
pub struct QovDecoder<S> {
    source: S,
    strict: bool,

    header: Option<FileHeader>,
    chunks: Vec<ChunkInfo>,
    /// Chunk-table position of each frame, by frame number
    frame_chunks: Vec<usize>,
    /// Frame numbers that are keyframes, ascending
    keyframe_indices: Vec<usize>,
    scan_offset: u64,
    next_frame_index: u32,
    index_done: bool,

    rgb: RgbDecoder,
    frame_prev: Vec<u8>,
    frame_cur: Vec<u8>,
    planes_prev: YuvPlanes,
    planes_cur: YuvPlanes,
    last_decoded: Option<usize>,
    decoding: bool,
}

impl<S: DataSource> QovDecoder<S> {
    /// Create a tolerant decoder (missing END marker is a warning)
    pub fn new(source: S) -> Self {
        Self::with_mode(source, false)
    }

    /// Create a strict decoder (missing END marker is an error)
    pub fn with_strict(source: S) -> Self {
        Self::with_mode(source, true)
    }

    fn with_mode(source: S, strict: bool) -> Self {
        QovDecoder {
            source,
            strict,
            header: None,
            chunks: Vec::new(),
            frame_chunks: Vec::new(),
            keyframe_indices: Vec::new(),
            scan_offset: HEADER_SIZE as u64,
            next_frame_index: 0,
            index_done: false,
            rgb: RgbDecoder::new(),
            frame_prev: Vec::new(),
            frame_cur: Vec::new(),
            planes_prev: empty_planes(),
            planes_cur: empty_planes(),
            last_decoded: None,
            decoding: false,
        }
    }

    /// Parse and validate the 24-byte file header, allocating the frame and
    /// plane buffers. Idempotent once it has succeeded.
    pub fn parse_header(&mut self) -> Result<()> {
        if self.header.is_some() {
            return Ok(());
        }
        if !self.source.is_available(0, HEADER_SIZE) {
            return Err(Error::NotYetAvailable);
        }
        let data = self.source.read(0, HEADER_SIZE)?;
        let header = FileHeader::parse(&data)?;

        let npix = header.width as usize * header.height as usize;
        // RGB zero, alpha opaque
        let mut frame = vec![0u8; npix * 4];
        for px in frame.chunks_exact_mut(4) {
            px[3] = 255;
        }
        self.frame_prev = frame.clone();
        self.frame_cur = frame;

        if let Some(subsampling) = header.colorspace.subsampling() {
            let chroma = subsampling.chroma_plane_len(header.width as usize, header.height as usize);
            let with_alpha = header.has_alpha();
            self.planes_prev = YuvPlanes {
                y: vec![0; npix],
                u: vec![0; chroma],
                v: vec![0; chroma],
                a: with_alpha.then(|| vec![0; npix]),
            };
            self.planes_cur = self.planes_prev.clone();
        }

        debug!(
            width = header.width,
            height = header.height,
            colorspace = ?header.colorspace,
            version = header.version,
            "parsed stream header"
        );
        self.header = Some(header);
        Ok(())
    }

    /// Walk chunk headers from offset 24, assigning frame indices and
    /// collecting keyframe positions, until the END chunk.
    ///
    /// Resumable: on [`Error::NotYetAvailable`] the scan position is kept
    /// and the next call continues from it.
    pub fn build_index(&mut self) -> Result<()> {
        self.parse_header()?;
        if self.index_done {
            return Ok(());
        }
        let version = self.header.as_ref().map(|h| h.version).unwrap_or(0);
        let header_len = ChunkHeader::size_for_version(version);

        loop {
            if let Some(total) = self.source.total_size() {
                if self.scan_offset >= total {
                    return self.finish_index_without_end();
                }
                if self.scan_offset + header_len as u64 > total {
                    return self.truncated_index("chunk header extends past end of file");
                }
            }
            if !self.source.is_available(self.scan_offset, header_len) {
                return Err(Error::NotYetAvailable);
            }
            let raw = self.source.read(self.scan_offset, header_len)?;
            let chunk = ChunkHeader::parse(version, &raw)?;

            if let Some(total) = self.source.total_size() {
                let end = self.scan_offset + header_len as u64 + chunk.size as u64;
                if end > total {
                    return self.truncated_index("chunk payload extends past end of file");
                }
            }

            if chunk.chunk_type == ChunkType::End {
                // Settle the trailing marker before committing any state so
                // an interrupted call can simply be retried
                let marker_off = self.scan_offset + header_len as u64 + chunk.size as u64;
                let marker_ok = self.check_trailing_marker(marker_off)?;
                self.chunks.push(ChunkInfo {
                    offset: self.scan_offset,
                    chunk_type: chunk.chunk_type,
                    flags: chunk.flags,
                    size_with_header: header_len as u32 + chunk.size,
                    timestamp_us: chunk.timestamp_us,
                    frame_index: None,
                });
                self.scan_offset = marker_off;
                if marker_ok {
                    self.scan_offset += END_MARKER.len() as u64;
                }
                self.index_done = true;
                debug!(
                    chunks = self.chunks.len(),
                    frames = self.frame_chunks.len(),
                    keyframes = self.keyframe_indices.len(),
                    "chunk index complete"
                );
                return Ok(());
            }

            let frame_index = if chunk.chunk_type.is_frame() {
                let idx = self.next_frame_index;
                self.next_frame_index += 1;
                self.frame_chunks.push(self.chunks.len());
                if chunk.chunk_type == ChunkType::Keyframe {
                    self.keyframe_indices.push(idx as usize);
                }
                Some(idx)
            } else {
                None
            };

            trace!(
                offset = self.scan_offset,
                chunk_type = ?chunk.chunk_type,
                size = chunk.size,
                ?frame_index,
                "indexed chunk"
            );
            self.chunks.push(ChunkInfo {
                offset: self.scan_offset,
                chunk_type: chunk.chunk_type,
                flags: chunk.flags,
                size_with_header: header_len as u32 + chunk.size,
                timestamp_us: chunk.timestamp_us,
                frame_index,
            });
            self.scan_offset += header_len as u64 + chunk.size as u64;
        }
    }

    /// Settle the 8-byte marker expected at `offset`, after the END chunk.
    ///
    /// Returns whether the marker bytes were actually read (tolerant mode
    /// may accept a stream that stops short of them). Does not mutate any
    /// scan state, so a transient failure is safely retryable.
    fn check_trailing_marker(&mut self, offset: u64) -> Result<bool> {
        let missing = match self.source.total_size() {
            Some(total) => offset + END_MARKER.len() as u64 > total,
            None => false,
        };
        if missing {
            if self.strict {
                return Err(Error::truncated("stream ends before the end marker"));
            }
            warn!("stream ends before the end marker");
            return Ok(false);
        }
        if !self.source.is_available(offset, END_MARKER.len()) {
            return Err(Error::NotYetAvailable);
        }
        let marker = self.source.read(offset, END_MARKER.len())?;
        if marker.as_ref() != END_MARKER {
            return Err(Error::corrupted("bad end marker after END chunk"));
        }
        Ok(true)
    }

    fn finish_index_without_end(&mut self) -> Result<()> {
        if self.strict {
            return Err(Error::truncated("file ends without an END chunk"));
        }
        warn!(
            chunks = self.chunks.len(),
            "file ends without an END chunk, finishing index"
        );
        self.index_done = true;
        Ok(())
    }

    fn truncated_index(&mut self, msg: &str) -> Result<()> {
        if self.strict {
            return Err(Error::truncated(msg));
        }
        warn!("{}, finishing index", msg);
        self.index_done = true;
        Ok(())
    }

    /// Number of frames known so far (final once the index is complete)
    pub fn frame_count(&self) -> usize {
        self.frame_chunks.len()
    }

    /// Frame numbers of all keyframes seen so far
    pub fn keyframe_indices(&self) -> &[usize] {
        &self.keyframe_indices
    }

    /// Decode frame `index`, seeking via keyframe replay when the request
    /// is not sequential. Returns `Ok(None)` past the end of the stream.
    pub fn decode_frame(&mut self, index: usize) -> Result<Option<VideoFrame>> {
        // Re-entry guard; a concurrent awaiter retries once the current
        // decode has released it
        if self.decoding {
            return Err(Error::NotYetAvailable);
        }
        if index >= self.frame_chunks.len() {
            if !self.index_done {
                self.build_index()?;
            }
            if index >= self.frame_chunks.len() {
                return if self.index_done {
                    Ok(None)
                } else {
                    Err(Error::NotYetAvailable)
                };
            }
        }

        self.decoding = true;
        let result = self.decode_frame_at(index);
        self.decoding = false;
        if let Err(e) = &result {
            // A failure mid-frame leaves the buffers unspecified; force the
            // next request down the reset-and-replay path
            if !e.is_transient() {
                self.last_decoded = None;
            }
        }
        result
    }

    fn decode_frame_at(&mut self, index: usize) -> Result<Option<VideoFrame>> {
        if self.last_decoded.map(|l| l + 1) == Some(index) {
            self.decode_one(index)?;
        } else {
            let keyframe = self
                .keyframe_indices
                .iter()
                .rev()
                .find(|&&k| k <= index)
                .copied()
                .ok_or_else(|| {
                    Error::corrupted(format!("no keyframe at or before frame {}", index))
                })?;
            debug!(target_frame = index, from_keyframe = keyframe, "seek replay");
            self.reset_decode_state();
            for j in keyframe..=index {
                self.decode_one(j)?;
            }
        }

        let header = self.header.as_ref().ok_or(Error::NotYetAvailable)?;
        let info = self.chunks[self.frame_chunks[index]];
        Ok(Some(VideoFrame {
            width: header.width,
            height: header.height,
            pixels: Bytes::copy_from_slice(&self.frame_prev),
            timestamp_us: info.timestamp_us,
            keyframe: info.chunk_type == ChunkType::Keyframe,
            frame_number: index as u32,
        }))
    }

    /// Reset caches and frame/plane buffers to their initial state
    fn reset_decode_state(&mut self) {
        self.rgb.reset();
        for px in self.frame_prev.chunks_exact_mut(4) {
            px.copy_from_slice(&[0, 0, 0, 255]);
        }
        for px in self.frame_cur.chunks_exact_mut(4) {
            px.copy_from_slice(&[0, 0, 0, 255]);
        }
        for planes in [&mut self.planes_prev, &mut self.planes_cur] {
            planes.y.fill(0);
            planes.u.fill(0);
            planes.v.fill(0);
            if let Some(a) = planes.a.as_mut() {
                a.fill(0);
            }
        }
        self.last_decoded = None;
    }

    /// Decode the chunk of frame `index` and rotate the frame buffers
    fn decode_one(&mut self, index: usize) -> Result<()> {
        let header = self.header.as_ref().ok_or(Error::NotYetAvailable)?;
        let version = header.version;
        let yuv_mode = header.colorspace.is_yuv();
        let info = self.chunks[self.frame_chunks[index]];

        let payload_len = info.payload_size(version) as usize;
        let payload_off = info.payload_offset(version);
        if !self.source.is_available(payload_off, payload_len) {
            if let Some(total) = self.source.total_size() {
                if payload_off + payload_len as u64 > total {
                    return Err(Error::truncated("frame payload extends past end of file"));
                }
            }
            return Err(Error::NotYetAvailable);
        }
        let payload = self.source.read(payload_off, payload_len)?;

        // Unwrap the optional LZ4 layer
        let decompressed;
        let body: &[u8] = if info.flags & CHUNK_FLAG_COMPRESSED != 0 {
            if payload.len() < 4 {
                return Err(Error::corrupted("compressed chunk shorter than its prefix"));
            }
            let uncompressed_len = BigEndian::read_u32(&payload[0..4]) as usize;
            decompressed = lz4::decompress(&payload[4..], uncompressed_len)?;
            &decompressed
        } else {
            &payload
        };

        if (info.flags & CHUNK_FLAG_YUV != 0) != yuv_mode {
            return Err(Error::corrupted(
                "chunk YUV flag disagrees with the header colorspace",
            ));
        }

        let keyframe = match info.chunk_type {
            ChunkType::Keyframe => true,
            ChunkType::Pframe => false,
            ChunkType::Bframe => {
                return Err(Error::corrupted("B-frame chunks are reserved and undecodable"))
            }
            other => {
                return Err(Error::corrupted(format!(
                    "chunk type {:?} indexed as a frame",
                    other
                )))
            }
        };

        trace!(
            frame = index,
            keyframe,
            yuv = yuv_mode,
            body_len = body.len(),
            "decoding frame chunk"
        );

        let mut cursor = 0usize;
        if yuv_mode {
            self.decode_yuv_body(body, &mut cursor, keyframe)?;
        } else {
            self.decode_rgb_body(body, &mut cursor, keyframe)?;
        }
        verify_end_marker(body, cursor)?;

        std::mem::swap(&mut self.frame_prev, &mut self.frame_cur);
        if yuv_mode {
            std::mem::swap(&mut self.planes_prev, &mut self.planes_cur);
        }
        self.last_decoded = Some(index);
        Ok(())
    }

    fn decode_rgb_body(&mut self, body: &[u8], cursor: &mut usize, keyframe: bool) -> Result<()> {
        if keyframe {
            self.rgb.decode_keyframe(body, cursor, &mut self.frame_cur)
        } else {
            self.frame_cur.copy_from_slice(&self.frame_prev);
            self.rgb
                .decode_pframe(body, cursor, &mut self.frame_cur, &self.frame_prev)
        }
    }

    fn decode_yuv_body(&mut self, body: &[u8], cursor: &mut usize, keyframe: bool) -> Result<()> {
        let header = self.header.as_ref().ok_or(Error::NotYetAvailable)?;
        let subsampling = header
            .colorspace
            .subsampling()
            .ok_or_else(|| Error::corrupted("YUV chunk in an RGB stream"))?;
        let width = header.width as usize;
        let height = header.height as usize;

        if keyframe {
            yuv::decode_plane_keyframe(body, cursor, &mut self.planes_cur.y)?;
            yuv::decode_plane_keyframe(body, cursor, &mut self.planes_cur.u)?;
            yuv::decode_plane_keyframe(body, cursor, &mut self.planes_cur.v)?;
            if let Some(a) = self.planes_cur.a.as_mut() {
                yuv::decode_plane_keyframe(body, cursor, a)?;
            }
        } else {
            self.planes_cur.y.copy_from_slice(&self.planes_prev.y);
            self.planes_cur.u.copy_from_slice(&self.planes_prev.u);
            self.planes_cur.v.copy_from_slice(&self.planes_prev.v);
            yuv::decode_plane_pframe(body, cursor, &mut self.planes_cur.y, &self.planes_prev.y)?;
            yuv::decode_plane_pframe(body, cursor, &mut self.planes_cur.u, &self.planes_prev.u)?;
            yuv::decode_plane_pframe(body, cursor, &mut self.planes_cur.v, &self.planes_prev.v)?;
            if let (Some(a), Some(prev_a)) = (self.planes_cur.a.as_mut(), self.planes_prev.a.as_ref())
            {
                a.copy_from_slice(prev_a);
                yuv::decode_plane_pframe(body, cursor, a, prev_a)?;
            }
        }

        color::planes_to_rgba(&self.planes_cur, width, height, subsampling, &mut self.frame_cur)
    }

    /// Header plus everything the index scan has recorded so far
    pub fn file_stats(&self) -> Result<FileStats> {
        let header = self
            .header
            .clone()
            .ok_or_else(|| Error::invalid_argument("header not parsed"))?;

        let mut counts = ChunkCounts::default();
        let mut duration_us = 0;
        for info in &self.chunks {
            match info.chunk_type {
                ChunkType::Sync => counts.sync += 1,
                ChunkType::Keyframe => counts.keyframe += 1,
                ChunkType::Pframe => counts.pframe += 1,
                ChunkType::Bframe => counts.bframe += 1,
                ChunkType::Audio => counts.audio += 1,
                ChunkType::Index => counts.index += 1,
                ChunkType::End => counts.end += 1,
            }
            if info.chunk_type.is_frame() {
                duration_us = info.timestamp_us;
            }
        }

        Ok(FileStats {
            header,
            chunks: self.chunks.clone(),
            keyframe_indices: self.keyframe_indices.clone(),
            frame_count: self.frame_chunks.len(),
            duration_us,
            chunk_counts: counts,
        })
    }
}

fn empty_planes() -> YuvPlanes {
    YuvPlanes {
        y: Vec::new(),
        u: Vec::new(),
        v: Vec::new(),
        a: None,
    }
}

/// A frame body must end with the 8-byte marker, exactly at the cursor
fn verify_end_marker(body: &[u8], cursor: usize) -> Result<()> {
    if body.len() != cursor + END_MARKER.len() || body[cursor..] != END_MARKER {
        return Err(Error::corrupted(
            "frame body does not end with the end marker",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::encoder::QovEncoder;
    use crate::format::header::{Colorspace, VERSION_2};
    use crate::format::source::MemorySource;
    use crate::util::ByteWriter;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Source whose visible prefix is controlled by the test
    struct PartialSource {
        data: Bytes,
        available: Rc<Cell<usize>>,
        total: Option<u64>,
    }

    impl DataSource for PartialSource {
        fn total_size(&self) -> Option<u64> {
            self.total
        }

        fn read(&mut self, offset: u64, len: usize) -> Result<Bytes> {
            let end = offset + len as u64;
            if end > self.data.len() as u64 {
                return Err(Error::truncated("past end of stream"));
            }
            if end > self.available.get() as u64 {
                return Err(Error::NotYetAvailable);
            }
            Ok(self.data.slice(offset as usize..end as usize))
        }

        fn is_available(&self, offset: u64, len: usize) -> bool {
            offset + len as u64 <= self.available.get().min(self.data.len()) as u64
        }
    }

    fn encode_two_black_frames() -> Bytes {
        let mut enc = QovEncoder::new(2, 2, 30, 1, 0, Colorspace::Srgb, false).unwrap();
        enc.write_header().unwrap();
        let frame = vec![0u8, 0, 0, 255].repeat(4);
        enc.encode_keyframe(&frame, 0).unwrap();
        enc.encode_pframe(&frame, 1000).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_verify_end_marker() {
        let mut body = vec![0xC3];
        body.extend_from_slice(&END_MARKER);
        assert!(verify_end_marker(&body, 1).is_ok());
        // marker not exactly at the cursor
        assert!(matches!(
            verify_end_marker(&body, 0),
            Err(Error::CorruptedStream(_))
        ));
        // trailing garbage after the marker
        body.push(0);
        assert!(matches!(
            verify_end_marker(&body, 1),
            Err(Error::CorruptedStream(_))
        ));
        // body shorter than a marker
        assert!(matches!(
            verify_end_marker(&[0u8; 4], 0),
            Err(Error::CorruptedStream(_))
        ));
        // right length, wrong bytes
        let mut bad = END_MARKER.to_vec();
        bad[7] = 2;
        assert!(matches!(
            verify_end_marker(&bad, 0),
            Err(Error::CorruptedStream(_))
        ));
    }

    #[test]
    fn test_check_trailing_marker_reads_marker() {
        let mut dec = QovDecoder::new(MemorySource::from(END_MARKER.to_vec()));
        assert!(dec.check_trailing_marker(0).unwrap());
    }

    #[test]
    fn test_check_trailing_marker_bad_bytes() {
        let mut dec = QovDecoder::new(MemorySource::from(vec![0u8; 8]));
        assert!(matches!(
            dec.check_trailing_marker(0),
            Err(Error::CorruptedStream(_))
        ));
    }

    #[test]
    fn test_check_trailing_marker_missing_strict_vs_tolerant() {
        // Final size known and too small: strict errors, tolerant accepts
        let mut strict = QovDecoder::with_strict(MemorySource::from(vec![0u8; 4]));
        assert!(matches!(
            strict.check_trailing_marker(0),
            Err(Error::TruncatedInput(_))
        ));
        let mut tolerant = QovDecoder::new(MemorySource::from(vec![0u8; 4]));
        assert!(!tolerant.check_trailing_marker(0).unwrap());
    }

    #[test]
    fn test_check_trailing_marker_not_yet_available() {
        // Unknown final size and nothing delivered: transient in both modes
        let source = PartialSource {
            data: Bytes::from_static(&END_MARKER),
            available: Rc::new(Cell::new(0)),
            total: None,
        };
        let mut dec = QovDecoder::with_strict(source);
        assert!(matches!(
            dec.check_trailing_marker(0),
            Err(Error::NotYetAvailable)
        ));
    }

    #[test]
    fn test_finish_index_without_end() {
        let mut strict = QovDecoder::with_strict(MemorySource::from(Vec::new()));
        assert!(matches!(
            strict.finish_index_without_end(),
            Err(Error::TruncatedInput(_))
        ));
        assert!(!strict.index_done);

        let mut tolerant = QovDecoder::new(MemorySource::from(Vec::new()));
        tolerant.finish_index_without_end().unwrap();
        assert!(tolerant.index_done);
    }

    #[test]
    fn test_truncated_index() {
        let mut strict = QovDecoder::with_strict(MemorySource::from(Vec::new()));
        assert!(matches!(
            strict.truncated_index("payload cut short"),
            Err(Error::TruncatedInput(_))
        ));
        assert!(!strict.index_done);

        let mut tolerant = QovDecoder::new(MemorySource::from(Vec::new()));
        tolerant.truncated_index("payload cut short").unwrap();
        assert!(tolerant.index_done);
    }

    #[test]
    fn test_parse_header_allocates_rgb_buffers() {
        let mut dec = QovDecoder::new(MemorySource::from(encode_two_black_frames()));
        dec.parse_header().unwrap();
        assert_eq!(dec.frame_prev.len(), 2 * 2 * 4);
        assert!(dec.frame_prev.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
        assert!(dec.planes_prev.y.is_empty());
        // idempotent once parsed
        dec.parse_header().unwrap();
    }

    #[test]
    fn test_parse_header_allocates_yuv_planes() {
        let header = FileHeader {
            version: VERSION_2,
            flags: 0,
            width: 5,
            height: 3,
            fps_num: 30,
            fps_den: 1,
            total_frames: 0,
            audio_channels: 0,
            audio_rate_hz: 0,
            colorspace: Colorspace::Yuva420,
        };
        let mut w = ByteWriter::new();
        header.write(&mut w);
        let mut dec = QovDecoder::new(MemorySource::from(w.into_vec()));
        dec.parse_header().unwrap();
        assert_eq!(dec.planes_prev.y.len(), 15);
        assert_eq!(dec.planes_prev.u.len(), 6);
        assert_eq!(dec.planes_prev.v.len(), 6);
        assert_eq!(dec.planes_prev.a.as_ref().map(Vec::len), Some(15));
        assert_eq!(dec.planes_cur.y.len(), 15);
    }

    #[test]
    fn test_index_scan_resumes_from_stall() {
        let bytes = encode_two_black_frames();
        let available = Rc::new(Cell::new(0usize));
        let source = PartialSource {
            data: bytes.clone(),
            available: available.clone(),
            total: Some(bytes.len() as u64),
        };
        let mut dec = QovDecoder::new(source);

        // Header not delivered yet
        assert!(matches!(dec.build_index(), Err(Error::NotYetAvailable)));

        // Header, SYNC and the keyframe header visible; the scan indexes
        // the keyframe and then stalls on the P-frame header
        available.set(60);
        assert!(matches!(dec.build_index(), Err(Error::NotYetAvailable)));
        let stalled_at = dec.scan_offset;
        assert_eq!(dec.frame_chunks.len(), 1);
        assert!(!dec.index_done);

        // Full delivery: the scan continues from where it stopped
        available.set(bytes.len());
        dec.build_index().unwrap();
        assert!(dec.scan_offset > stalled_at);
        assert_eq!(dec.frame_chunks.len(), 2);
        assert_eq!(dec.keyframe_indices, vec![0]);
        assert!(dec.index_done);
    }

    #[test]
    fn test_reentry_guard_is_transient() {
        let mut dec = QovDecoder::new(MemorySource::from(encode_two_black_frames()));
        dec.build_index().unwrap();
        dec.decoding = true;
        assert!(matches!(dec.decode_frame(0), Err(Error::NotYetAvailable)));
        dec.decoding = false;
        assert!(dec.decode_frame(0).unwrap().is_some());
    }

    #[test]
    fn test_reset_decode_state_restores_initial_buffers() {
        let mut dec = QovDecoder::new(MemorySource::from(encode_two_black_frames()));
        dec.build_index().unwrap();
        dec.decode_frame(1).unwrap().unwrap();
        assert_eq!(dec.last_decoded, Some(1));

        dec.frame_prev[0] = 42;
        dec.reset_decode_state();
        assert!(dec.frame_prev.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
        assert!(dec.frame_cur.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
        assert_eq!(dec.last_decoded, None);
    }
}
