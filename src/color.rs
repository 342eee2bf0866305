//! Color space conversion between RGBA and planar YUV
//!
//! Uses BT.601 full-range coefficients. Forward conversion produces the
//! planar layout the plane codec consumes: a full-resolution Y plane,
//! subsampled U and V planes (4:2:0, 4:2:2 or 4:4:4) and an optional
//! full-resolution alpha plane carrying the source alpha verbatim.
//!
//! The conversion itself is lossy (rounding plus chroma averaging); the
//! opcode layer on top of it is lossless, so decode(encode(f)) equals
//! yuv_to_rgba(rgba_to_yuv(f)) exactly.

use crate::error::{Error, Result};

/// Chroma subsampling factor of a YUV colorspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsampling {
    /// 4:2:0 — chroma halved in both dimensions
    Yuv420,
    /// 4:2:2 — chroma halved horizontally
    Yuv422,
    /// 4:4:4 — full-resolution chroma
    Yuv444,
}

impl Subsampling {
    /// Chroma plane dimensions for a frame of `width` x `height`
    pub fn chroma_dimensions(&self, width: usize, height: usize) -> (usize, usize) {
        match self {
            Subsampling::Yuv420 => ((width + 1) / 2, (height + 1) / 2),
            Subsampling::Yuv422 => ((width + 1) / 2, height),
            Subsampling::Yuv444 => (width, height),
        }
    }

    /// Samples in one chroma plane
    pub fn chroma_plane_len(&self, width: usize, height: usize) -> usize {
        let (w, h) = self.chroma_dimensions(width, height);
        w * h
    }
}

/// Planar YUV image, optionally with an alpha plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvPlanes {
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub a: Option<Vec<u8>>,
}

#[inline]
fn clamp_round(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// BT.601 RGB to YUV for a single pixel
#[inline]
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.147 * r - 0.289 * g + 0.436 * b + 128.0;
    let v = 0.615 * r - 0.515 * g - 0.100 * b + 128.0;
    (clamp_round(y), clamp_round(u), clamp_round(v))
}

/// BT.601 YUV to RGB for a single pixel
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let (y, u, v) = (y as f32, u as f32 - 128.0, v as f32 - 128.0);
    let r = y + 1.140 * v;
    let g = y - 0.395 * u - 0.581 * v;
    let b = y + 2.032 * u;
    (clamp_round(r), clamp_round(g), clamp_round(b))
}

/// Convert a raster RGBA buffer into planar YUV with the given subsampling.
///
/// Chroma samples are the rounded integer mean of the U (respectively V)
/// values of the source pixels of each block that fall inside the frame.
pub fn rgba_to_planes(
    pixels: &[u8],
    width: usize,
    height: usize,
    subsampling: Subsampling,
    with_alpha: bool,
) -> Result<YuvPlanes> {
    if pixels.len() != width * height * 4 {
        return Err(Error::invalid_argument(format!(
            "RGBA buffer is {} bytes, expected {} for {}x{}",
            pixels.len(),
            width * height * 4,
            width,
            height
        )));
    }

    // Full-resolution conversion first; chroma averaging reads from these
    let npix = width * height;
    let mut y_plane = vec![0u8; npix];
    let mut u_full = vec![0u8; npix];
    let mut v_full = vec![0u8; npix];
    let mut a_plane = if with_alpha { vec![0u8; npix] } else { Vec::new() };

    for i in 0..npix {
        let off = i * 4;
        let (y, u, v) = rgb_to_yuv(pixels[off], pixels[off + 1], pixels[off + 2]);
        y_plane[i] = y;
        u_full[i] = u;
        v_full[i] = v;
        if with_alpha {
            a_plane[i] = pixels[off + 3];
        }
    }

    let (step_x, step_y) = match subsampling {
        Subsampling::Yuv420 => (2, 2),
        Subsampling::Yuv422 => (2, 1),
        Subsampling::Yuv444 => (1, 1),
    };
    let (cw, ch) = subsampling.chroma_dimensions(width, height);
    let mut u_plane = vec![0u8; cw * ch];
    let mut v_plane = vec![0u8; cw * ch];

    for cy in 0..ch {
        for cx in 0..cw {
            let mut u_sum = 0u32;
            let mut v_sum = 0u32;
            let mut count = 0u32;
            for dy in 0..step_y {
                for dx in 0..step_x {
                    let x = cx * step_x + dx;
                    let y = cy * step_y + dy;
                    if x < width && y < height {
                        u_sum += u_full[y * width + x] as u32;
                        v_sum += v_full[y * width + x] as u32;
                        count += 1;
                    }
                }
            }
            u_plane[cy * cw + cx] = ((u_sum + count / 2) / count) as u8;
            v_plane[cy * cw + cx] = ((v_sum + count / 2) / count) as u8;
        }
    }

    Ok(YuvPlanes {
        y: y_plane,
        u: u_plane,
        v: v_plane,
        a: with_alpha.then_some(a_plane),
    })
}

/// Convert planar YUV back into a raster RGBA buffer.
///
/// Missing alpha yields 255 everywhere.
pub fn planes_to_rgba(
    planes: &YuvPlanes,
    width: usize,
    height: usize,
    subsampling: Subsampling,
    out: &mut [u8],
) -> Result<()> {
    if out.len() != width * height * 4 {
        return Err(Error::invalid_argument(format!(
            "RGBA output is {} bytes, expected {} for {}x{}",
            out.len(),
            width * height * 4,
            width,
            height
        )));
    }
    let (cw, _ch) = subsampling.chroma_dimensions(width, height);
    let expected_chroma = subsampling.chroma_plane_len(width, height);
    if planes.y.len() != width * height
        || planes.u.len() != expected_chroma
        || planes.v.len() != expected_chroma
    {
        return Err(Error::invalid_argument("plane dimensions mismatch"));
    }

    let (step_x, step_y) = match subsampling {
        Subsampling::Yuv420 => (2, 2),
        Subsampling::Yuv422 => (2, 1),
        Subsampling::Yuv444 => (1, 1),
    };

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let ci = (y / step_y) * cw + x / step_x;
            let (r, g, b) = yuv_to_rgb(planes.y[i], planes.u[ci], planes.v[ci]);
            let a = planes.a.as_ref().map_or(255, |ap| ap[i]);
            let off = i * 4;
            out[off] = r;
            out[off + 1] = g;
            out[off + 2] = b;
            out[off + 3] = a;
        }
    }
    Ok(())
}
