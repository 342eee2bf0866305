//! Single-channel plane opcode codec for YUV mode
//!
//! Each plane (Y, U, V, optional A) is coded independently with a fresh
//! 64-entry value cache and a previous-value predictor starting at 0.
//! Planes carry no length prefix; the expected sample count follows from
//! colorspace and resolution. Keyframe planes predict from the previously
//! emitted value, P-frame planes from the co-located value of the previous
//! frame's plane.

use super::cache::ValueCache;
use super::{MAX_RUN, OP_FULL, OP_LUMA, OP_PLANE_DIFF, OP_RUN, OP_SKIP_LONG};
use crate::error::{Error, Result};
use crate::util::ByteWriter;

/// Encode one keyframe plane (opcodes only)
pub fn encode_plane_keyframe(samples: &[u8], out: &mut ByteWriter) {
    let mut cache = ValueCache::new();
    let mut prev = 0u8;
    let mut run = 0usize;

    for &v in samples {
        if v == prev {
            run += 1;
            if run == MAX_RUN {
                out.write_u8(OP_RUN | (run as u8 - 1));
                run = 0;
            }
            continue;
        }
        if run > 0 {
            out.write_u8(OP_RUN | (run as u8 - 1));
            run = 0;
        }
        if let Some(slot) = cache.lookup(v) {
            out.write_u8(slot as u8);
        } else {
            cache.put(v);
            encode_value_delta(v, prev, out);
        }
        prev = v;
    }
    if run > 0 {
        out.write_u8(OP_RUN | (run as u8 - 1));
    }
}

/// Encode one P-frame plane against the co-located previous plane
pub fn encode_plane_pframe(samples: &[u8], reference: &[u8], out: &mut ByteWriter) {
    let mut cache = ValueCache::new();
    let mut skip = 0usize;

    for (&v, &r) in samples.iter().zip(reference.iter()) {
        if v == r {
            skip += 1;
            continue;
        }
        flush_skip(&mut skip, out);
        match cache.lookup(v) {
            // Slot 0 is unreachable in a P-frame (0x00 is SKIP_LONG)
            Some(slot) if slot != 0 => out.write_u8(slot as u8),
            _ => {
                cache.put(v);
                encode_value_delta(v, r, out);
            }
        }
    }
    flush_skip(&mut skip, out);
}

fn flush_skip(skip: &mut usize, out: &mut ByteWriter) {
    let mut count = *skip;
    while count > u16::MAX as usize {
        out.write_u8(OP_SKIP_LONG);
        out.write_u16(u16::MAX);
        count -= u16::MAX as usize;
    }
    if count > MAX_RUN {
        out.write_u8(OP_SKIP_LONG);
        out.write_u16(count as u16);
    } else if count > 0 {
        out.write_u8(OP_RUN | (count as u8 - 1));
    }
    *skip = 0;
}

/// DIFF, LUMA or FULL relative to `base`
fn encode_value_delta(v: u8, base: u8, out: &mut ByteWriter) {
    let d = v.wrapping_sub(base) as i8;
    if (-8..=7).contains(&d) {
        out.write_u8(OP_PLANE_DIFF | (d + 8) as u8);
    } else if (-32..=31).contains(&d) {
        out.write_u8(OP_LUMA | (d + 32) as u8);
    } else {
        out.write_u8(OP_FULL);
        out.write_u8(v);
    }
}

/// Decode one keyframe plane into `out`
pub fn decode_plane_keyframe(data: &[u8], cursor: &mut usize, out: &mut [u8]) -> Result<()> {
    let mut cache = ValueCache::new();
    let mut prev = 0u8;
    let mut pos = 0usize;

    while pos < out.len() {
        let op = next_byte(data, cursor)?;
        match op {
            0x00..=0x3F => {
                let v = cache.get(op as usize);
                out[pos] = v;
                prev = v;
                pos += 1;
            }
            0x40..=0x4F => {
                let v = prev.wrapping_add((op & 0x0F).wrapping_sub(8));
                cache.put(v);
                out[pos] = v;
                prev = v;
                pos += 1;
            }
            0x80..=0xBF => {
                let v = prev.wrapping_add((op & 0x3F).wrapping_sub(32));
                cache.put(v);
                out[pos] = v;
                prev = v;
                pos += 1;
            }
            0xC0..=0xFD => {
                let run = (op & 0x3F) as usize + 1;
                if pos + run > out.len() {
                    return Err(Error::corrupted("plane RUN past end of plane"));
                }
                out[pos..pos + run].fill(prev);
                pos += run;
            }
            OP_FULL => {
                let v = next_byte(data, cursor)?;
                cache.put(v);
                out[pos] = v;
                prev = v;
                pos += 1;
            }
            _ => {
                return Err(Error::corrupted(format!(
                    "unknown keyframe plane opcode 0x{:02X}",
                    op
                )))
            }
        }
    }
    Ok(())
}

/// Decode one P-frame plane into `out`, which must already hold a copy of
/// the reference plane
pub fn decode_plane_pframe(
    data: &[u8],
    cursor: &mut usize,
    out: &mut [u8],
    reference: &[u8],
) -> Result<()> {
    let mut cache = ValueCache::new();
    let mut pos = 0usize;

    while pos < out.len() {
        let op = next_byte(data, cursor)?;
        match op {
            OP_SKIP_LONG => {
                let hi = next_byte(data, cursor)? as usize;
                let lo = next_byte(data, cursor)? as usize;
                let count = (hi << 8) | lo;
                if count == 0 {
                    return Err(Error::corrupted("plane SKIP_LONG with zero count"));
                }
                if pos + count > out.len() {
                    return Err(Error::corrupted("plane SKIP_LONG past end of plane"));
                }
                pos += count;
            }
            0x01..=0x3F => {
                out[pos] = cache.get(op as usize);
                pos += 1;
            }
            0x40..=0x4F => {
                let v = reference[pos].wrapping_add((op & 0x0F).wrapping_sub(8));
                cache.put(v);
                out[pos] = v;
                pos += 1;
            }
            0x80..=0xBF => {
                let v = reference[pos].wrapping_add((op & 0x3F).wrapping_sub(32));
                cache.put(v);
                out[pos] = v;
                pos += 1;
            }
            0xC0..=0xFD => {
                let count = (op & 0x3F) as usize + 1;
                if pos + count > out.len() {
                    return Err(Error::corrupted("plane SKIP past end of plane"));
                }
                pos += count;
            }
            OP_FULL => {
                let v = next_byte(data, cursor)?;
                cache.put(v);
                out[pos] = v;
                pos += 1;
            }
            _ => {
                return Err(Error::corrupted(format!(
                    "unknown P-frame plane opcode 0x{:02X}",
                    op
                )))
            }
        }
    }
    Ok(())
}

#[inline]
fn next_byte(data: &[u8], cursor: &mut usize) -> Result<u8> {
    let b = *data
        .get(*cursor)
        .ok_or_else(|| Error::corrupted("plane body ended before expected sample count"))?;
    *cursor += 1;
    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_keyframe(samples: &[u8]) -> Vec<u8> {
        let mut w = ByteWriter::new();
        encode_plane_keyframe(samples, &mut w);
        let mut out = vec![0u8; samples.len()];
        let mut cursor = 0;
        decode_plane_keyframe(w.as_slice(), &mut cursor, &mut out).unwrap();
        assert_eq!(cursor, w.size());
        assert_eq!(out, samples);
        w.into_vec()
    }

    #[test]
    fn test_zero_plane_is_single_run() {
        let bytes = roundtrip_keyframe(&[0u8; 16]);
        assert_eq!(bytes, vec![0xCF]); // prev starts at 0, so all RUN
    }

    #[test]
    fn test_small_delta_is_diff() {
        let bytes = roundtrip_keyframe(&[5]);
        assert_eq!(bytes, vec![0x40 | (5 + 8)]);
    }

    #[test]
    fn test_medium_delta_is_luma() {
        let bytes = roundtrip_keyframe(&[20]);
        assert_eq!(bytes, vec![0x80 | (20 + 32)]);
    }

    #[test]
    fn test_large_delta_is_full() {
        let bytes = roundtrip_keyframe(&[200]);
        assert_eq!(bytes, vec![0xFE, 200]);
    }

    #[test]
    fn test_index_hit() {
        // 100 cached, 0 run, then 100 again hits the cache
        let bytes = roundtrip_keyframe(&[100, 0, 100]);
        let slot = ValueCache::hash_index(100) as u8;
        assert_eq!(*bytes.last().unwrap(), slot);
    }

    #[test]
    fn test_gradient_roundtrip() {
        let samples: Vec<u8> = (0..=255u8).chain((0..=255u8).rev()).collect();
        roundtrip_keyframe(&samples);
    }

    #[test]
    fn test_pframe_identical_is_skip() {
        let plane = vec![42u8; 30];
        let mut w = ByteWriter::new();
        encode_plane_pframe(&plane, &plane, &mut w);
        assert_eq!(w.as_slice(), &[0xC0 | 29]);
    }

    #[test]
    fn test_pframe_roundtrip() {
        let reference: Vec<u8> = (0..128).map(|i| (i * 2) as u8).collect();
        let mut samples = reference.clone();
        samples[3] = samples[3].wrapping_add(5);
        samples[90] = 250;
        samples[127] = 0;

        let mut w = ByteWriter::new();
        encode_plane_pframe(&samples, &reference, &mut w);

        let mut out = reference.clone();
        let mut cursor = 0;
        decode_plane_pframe(w.as_slice(), &mut cursor, &mut out, &reference).unwrap();
        assert_eq!(cursor, w.size());
        assert_eq!(out, samples);
    }

    #[test]
    fn test_pframe_long_skip() {
        let reference = vec![7u8; 300];
        let mut samples = reference.clone();
        samples[299] = 8;
        let mut w = ByteWriter::new();
        encode_plane_pframe(&samples, &reference, &mut w);
        // SKIP_LONG 299 then DIFF +1
        assert_eq!(&w.as_slice()[..3], &[0x00, 0x01, 0x2B]);

        let mut out = reference.clone();
        let mut cursor = 0;
        decode_plane_pframe(w.as_slice(), &mut cursor, &mut out, &reference).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut out = vec![0u8; 4];
        let mut cursor = 0;
        assert!(matches!(
            decode_plane_keyframe(&[0x60], &mut cursor, &mut out),
            Err(Error::CorruptedStream(_))
        ));
        let reference = vec![0u8; 4];
        let mut cursor = 0;
        assert!(matches!(
            decode_plane_pframe(&[0xFF], &mut cursor, &mut out, &reference),
            Err(Error::CorruptedStream(_))
        ));
    }
}
