//! QOV - a "Quite OK Video" codec in pure Rust
//!
//! QOV is a simple container-plus-opcode video format: frames are coded
//! with QOI-style opcode streams (RGB, or per-plane YUV with temporal
//! prediction) inside a chunked container with sync markers, optional LZ4
//! block compression per chunk, and a trailing keyframe index for seeking.
//!
//! # Architecture
//!
//! - `codec`: opcode bitstreams — RGB keyframe/P-frame and YUV plane codecs
//! - `color`: BT.601 RGBA<->YUV conversion and chroma subsampling
//! - `lz4`: LZ4 block compression used per chunk
//! - `format`: container framing, the encoder and the streaming decoder
//! - `util`: byte writer and shared helpers
//!
//! # Example
//!
//! ```
//! use qov::format::{Colorspace, MemorySource, QovDecoder, QovEncoder};
//!
//! let mut encoder = QovEncoder::new(2, 2, 30, 1, 0, Colorspace::Srgb, false)?;
//! encoder.write_header()?;
//! let frame = vec![0, 0, 0, 255].repeat(4);
//! encoder.encode_keyframe(&frame, 0)?;
//! let bytes = encoder.finish()?;
//!
//! let mut decoder = QovDecoder::new(MemorySource::from(bytes));
//! decoder.parse_header()?;
//! decoder.build_index()?;
//! let decoded = decoder.decode_frame(0)?.expect("frame 0 exists");
//! assert_eq!(decoded.pixels, frame);
//! # Ok::<(), qov::Error>(())
//! ```

pub mod codec;
pub mod color;
pub mod error;
pub mod format;
pub mod lz4;
pub mod util;

pub use codec::VideoFrame;
pub use error::{Error, Result};
pub use format::{Colorspace, DataSource, MemorySource, QovDecoder, QovEncoder};

/// QOV library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
