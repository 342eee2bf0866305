//! QOV opcode codecs (RGB and per-plane YUV)

pub mod cache;
pub mod frame;
pub mod rgb;
pub mod yuv;

pub use cache::{ColorCache, Pixel, ValueCache};
pub use frame::VideoFrame;
pub use rgb::{RgbDecoder, RgbEncoder};

/// Marker appended after the last opcode of every frame body and after the
/// END chunk: seven zero bytes and a one.
pub const END_MARKER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

// Shared opcode layout. Keyframe and P-frame streams reuse the same byte
// ranges with different meanings; the constants below name the boundaries.

/// `0x00..=0x3F` — INDEX in keyframes; `0x00` alone is SKIP_LONG in P-frames
pub const OP_INDEX_MASK: u8 = 0x3F;
/// `0x00` — two big-endian count bytes follow (P-frames only)
pub const OP_SKIP_LONG: u8 = 0x00;
/// `0x40..=0x7F` — RGB DIFF/TDIFF (two-bit deltas, bias 2)
pub const OP_RGB_DIFF: u8 = 0x40;
/// `0x40..=0x4F` — plane DIFF/TDIFF (four-bit delta, bias 8)
pub const OP_PLANE_DIFF: u8 = 0x40;
/// `0x80..=0xBF` — LUMA/TLUMA (six-bit green or value delta, bias 32)
pub const OP_LUMA: u8 = 0x80;
/// `0xC0..=0xFD` — RUN in keyframes, SKIP in P-frames (count 1..=62)
pub const OP_RUN: u8 = 0xC0;
/// Longest count a single RUN/SKIP opcode can carry
pub const MAX_RUN: usize = 62;
/// `0xFE` — literal RGB triple (alpha unchanged)
pub const OP_RGB: u8 = 0xFE;
/// `0xFE` — literal plane byte (plane streams)
pub const OP_FULL: u8 = 0xFE;
/// `0xFF` — literal RGBA quad
pub const OP_RGBA: u8 = 0xFF;
