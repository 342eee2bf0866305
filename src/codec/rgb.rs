//! RGB opcode codec: keyframe and P-frame bitstreams
//!
//! Keyframes predict each pixel from the previously emitted pixel and the
//! 64-entry color cache. P-frames predict from the co-located pixel of the
//! previous frame and express unchanged stretches as SKIP runs. The decoder
//! mirrors the encoder's state machine exactly, including every cache
//! mutation, so encoder and decoder caches stay byte-identical.
//!
//! Delta opcodes use wrapping (mod-256) channel arithmetic.

use super::cache::{ColorCache, Pixel};
use super::{MAX_RUN, OP_LUMA, OP_RGB, OP_RGBA, OP_RGB_DIFF, OP_RUN, OP_SKIP_LONG};
use crate::error::{Error, Result};
use crate::util::ByteWriter;

/// Encoder state for the RGB opcode stream.
///
/// The cache and previous pixel live here so they can persist across the
/// P-frames of a GOP; `encode_keyframe` resets them.
#[derive(Debug, Default)]
pub struct RgbEncoder {
    pub(crate) cache: ColorCache,
    prev_pixel: Pixel,
}

impl RgbEncoder {
    pub fn new() -> Self {
        RgbEncoder {
            cache: ColorCache::new(),
            prev_pixel: Pixel::opaque_black(),
        }
    }

    /// Encode a keyframe body (opcodes only, no end marker) from raster RGBA
    pub fn encode_keyframe(&mut self, pixels: &[u8], out: &mut ByteWriter) {
        self.cache.reset();
        self.prev_pixel = Pixel::opaque_black();

        let mut run = 0usize;
        for chunk in pixels.chunks_exact(4) {
            let px = Pixel::from_slice(chunk);
            if px == self.prev_pixel {
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
            self.encode_intra_pixel(px, out);
            self.prev_pixel = px;
        }
        if run > 0 {
            out.write_u8(OP_RUN | (run as u8 - 1));
        }
    }

    /// Encode a P-frame body from raster RGBA, predicting from `reference`
    /// (the previous frame, same layout)
    pub fn encode_pframe(&mut self, pixels: &[u8], reference: &[u8], out: &mut ByteWriter) {
        let mut skip = 0usize;
        for (chunk, ref_chunk) in pixels.chunks_exact(4).zip(reference.chunks_exact(4)) {
            let px = Pixel::from_slice(chunk);
            let ref_px = Pixel::from_slice(ref_chunk);
            if px == ref_px {
                skip += 1;
                continue;
            }
            flush_skip(&mut skip, out);
            self.encode_inter_pixel(px, ref_px, out);
        }
        flush_skip(&mut skip, out);
    }

    /// Intra path: INDEX, DIFF, LUMA, RGB, RGBA against the previous pixel
    fn encode_intra_pixel(&mut self, px: Pixel, out: &mut ByteWriter) {
        if let Some(slot) = self.cache.lookup(px) {
            out.write_u8(slot as u8);
            return;
        }
        self.cache.put(px);
        encode_delta_or_literal(px, self.prev_pixel, out);
    }

    /// Inter path: INDEX (slots 1..), TDIFF, TLUMA, RGB, RGBA against the
    /// reference pixel. Slot 0 cannot be expressed in a P-frame because
    /// opcode 0x00 is SKIP_LONG there.
    fn encode_inter_pixel(&mut self, px: Pixel, ref_px: Pixel, out: &mut ByteWriter) {
        if let Some(slot) = self.cache.lookup(px) {
            if slot != 0 {
                out.write_u8(slot as u8);
                return;
            }
        }
        self.cache.put(px);
        encode_delta_or_literal(px, ref_px, out);
    }
}

/// Emit the pending SKIP count as SKIP and/or SKIP_LONG opcodes
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

/// DIFF, LUMA, RGB or RGBA relative to `base`, whichever is shortest
fn encode_delta_or_literal(px: Pixel, base: Pixel, out: &mut ByteWriter) {
    if px.a == base.a {
        let dr = px.r.wrapping_sub(base.r) as i8;
        let dg = px.g.wrapping_sub(base.g) as i8;
        let db = px.b.wrapping_sub(base.b) as i8;

        if (-2..=1).contains(&dr) && (-2..=1).contains(&dg) && (-2..=1).contains(&db) {
            out.write_u8(
                OP_RGB_DIFF
                    | (((dr + 2) as u8) << 4)
                    | (((dg + 2) as u8) << 2)
                    | ((db + 2) as u8),
            );
            return;
        }

        let dg_r = dr.wrapping_sub(dg);
        let dg_b = db.wrapping_sub(dg);
        if (-32..=31).contains(&dg) && (-8..=7).contains(&dg_r) && (-8..=7).contains(&dg_b) {
            out.write_u8(OP_LUMA | (dg + 32) as u8);
            out.write_u8((((dg_r + 8) as u8) << 4) | ((dg_b + 8) as u8));
            return;
        }

        out.write_u8(OP_RGB);
        out.write_u8(px.r);
        out.write_u8(px.g);
        out.write_u8(px.b);
        return;
    }

    out.write_u8(OP_RGBA);
    out.write_u8(px.r);
    out.write_u8(px.g);
    out.write_u8(px.b);
    out.write_u8(px.a);
}

/// Decoder state for the RGB opcode stream; mirrors [`RgbEncoder`]
#[derive(Debug, Default)]
pub struct RgbDecoder {
    pub(crate) cache: ColorCache,
    prev_pixel: Pixel,
}

impl RgbDecoder {
    pub fn new() -> Self {
        RgbDecoder {
            cache: ColorCache::new(),
            prev_pixel: Pixel::opaque_black(),
        }
    }

    /// Reset cache state, as a keyframe would
    pub fn reset(&mut self) {
        self.cache.reset();
        self.prev_pixel = Pixel::opaque_black();
    }

    /// Decode a keyframe body from `data` starting at `*cursor` into `out`
    /// (raster RGBA). Stops once `out` is full; the end marker is not
    /// consumed here.
    pub fn decode_keyframe(
        &mut self,
        data: &[u8],
        cursor: &mut usize,
        out: &mut [u8],
    ) -> Result<()> {
        self.reset();

        let npix = out.len() / 4;
        let mut pos = 0usize;
        while pos < npix {
            let op = next_byte(data, cursor)?;
            match op {
                0x00..=0x3F => {
                    let px = self.cache.get(op as usize);
                    px.write_to(&mut out[pos * 4..pos * 4 + 4]);
                    self.prev_pixel = px;
                    pos += 1;
                }
                0x40..=0x7F => {
                    let px = apply_diff(self.prev_pixel, op);
                    self.cache.put(px);
                    px.write_to(&mut out[pos * 4..pos * 4 + 4]);
                    self.prev_pixel = px;
                    pos += 1;
                }
                0x80..=0xBF => {
                    let px = apply_luma(self.prev_pixel, op, next_byte(data, cursor)?);
                    self.cache.put(px);
                    px.write_to(&mut out[pos * 4..pos * 4 + 4]);
                    self.prev_pixel = px;
                    pos += 1;
                }
                0xC0..=0xFD => {
                    let run = (op & 0x3F) as usize + 1;
                    if pos + run > npix {
                        return Err(Error::corrupted("RUN past end of frame"));
                    }
                    for _ in 0..run {
                        self.prev_pixel.write_to(&mut out[pos * 4..pos * 4 + 4]);
                        pos += 1;
                    }
                }
                OP_RGB => {
                    let px = Pixel::new(
                        next_byte(data, cursor)?,
                        next_byte(data, cursor)?,
                        next_byte(data, cursor)?,
                        self.prev_pixel.a,
                    );
                    self.cache.put(px);
                    px.write_to(&mut out[pos * 4..pos * 4 + 4]);
                    self.prev_pixel = px;
                    pos += 1;
                }
                OP_RGBA => {
                    let px = Pixel::new(
                        next_byte(data, cursor)?,
                        next_byte(data, cursor)?,
                        next_byte(data, cursor)?,
                        next_byte(data, cursor)?,
                    );
                    self.cache.put(px);
                    px.write_to(&mut out[pos * 4..pos * 4 + 4]);
                    self.prev_pixel = px;
                    pos += 1;
                }
            }
        }
        Ok(())
    }

    /// Decode a P-frame body into `out`, which must already hold a copy of
    /// the previous frame (SKIP leaves it untouched)
    pub fn decode_pframe(
        &mut self,
        data: &[u8],
        cursor: &mut usize,
        out: &mut [u8],
        reference: &[u8],
    ) -> Result<()> {
        let npix = out.len() / 4;
        let mut pos = 0usize;
        while pos < npix {
            let op = next_byte(data, cursor)?;
            match op {
                OP_SKIP_LONG => {
                    let hi = next_byte(data, cursor)? as usize;
                    let lo = next_byte(data, cursor)? as usize;
                    let count = (hi << 8) | lo;
                    if count == 0 {
                        return Err(Error::corrupted("SKIP_LONG with zero count"));
                    }
                    if pos + count > npix {
                        return Err(Error::corrupted("SKIP_LONG past end of frame"));
                    }
                    pos += count;
                }
                0x01..=0x3F => {
                    let px = self.cache.get(op as usize);
                    px.write_to(&mut out[pos * 4..pos * 4 + 4]);
                    pos += 1;
                }
                0x40..=0x7F => {
                    let px = apply_diff(Pixel::from_slice(&reference[pos * 4..pos * 4 + 4]), op);
                    self.cache.put(px);
                    px.write_to(&mut out[pos * 4..pos * 4 + 4]);
                    pos += 1;
                }
                0x80..=0xBF => {
                    let ref_px = Pixel::from_slice(&reference[pos * 4..pos * 4 + 4]);
                    let px = apply_luma(ref_px, op, next_byte(data, cursor)?);
                    self.cache.put(px);
                    px.write_to(&mut out[pos * 4..pos * 4 + 4]);
                    pos += 1;
                }
                0xC0..=0xFD => {
                    let count = (op & 0x3F) as usize + 1;
                    if pos + count > npix {
                        return Err(Error::corrupted("SKIP past end of frame"));
                    }
                    pos += count;
                }
                OP_RGB => {
                    let a = reference[pos * 4 + 3];
                    let px = Pixel::new(
                        next_byte(data, cursor)?,
                        next_byte(data, cursor)?,
                        next_byte(data, cursor)?,
                        a,
                    );
                    self.cache.put(px);
                    px.write_to(&mut out[pos * 4..pos * 4 + 4]);
                    pos += 1;
                }
                OP_RGBA => {
                    let px = Pixel::new(
                        next_byte(data, cursor)?,
                        next_byte(data, cursor)?,
                        next_byte(data, cursor)?,
                        next_byte(data, cursor)?,
                    );
                    self.cache.put(px);
                    px.write_to(&mut out[pos * 4..pos * 4 + 4]);
                    pos += 1;
                }
            }
        }
        Ok(())
    }
}

#[inline]
fn next_byte(data: &[u8], cursor: &mut usize) -> Result<u8> {
    let b = *data
        .get(*cursor)
        .ok_or_else(|| Error::corrupted("frame body ended before expected pixel count"))?;
    *cursor += 1;
    Ok(b)
}

#[inline]
fn apply_diff(base: Pixel, op: u8) -> Pixel {
    let dr = ((op >> 4) & 0x03).wrapping_sub(2);
    let dg = ((op >> 2) & 0x03).wrapping_sub(2);
    let db = (op & 0x03).wrapping_sub(2);
    Pixel::new(
        base.r.wrapping_add(dr),
        base.g.wrapping_add(dg),
        base.b.wrapping_add(db),
        base.a,
    )
}

#[inline]
fn apply_luma(base: Pixel, op: u8, second: u8) -> Pixel {
    let dg = (op & 0x3F).wrapping_sub(32);
    let dr = dg.wrapping_add((second >> 4).wrapping_sub(8));
    let db = dg.wrapping_add((second & 0x0F).wrapping_sub(8));
    Pixel::new(
        base.r.wrapping_add(dr),
        base.g.wrapping_add(dg),
        base.b.wrapping_add(db),
        base.a,
    )
}
