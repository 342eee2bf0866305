//! QOV file header (24 bytes, big-endian fields)

use crate::color::Subsampling;
use crate::error::{Error, Result};
use crate::util::ByteWriter;
use byteorder::{BigEndian, ByteOrder};
use tracing::warn;

/// Magic bytes at offset 0
pub const MAGIC: &[u8; 4] = b"qovf";

/// Total header length
pub const HEADER_SIZE: usize = 24;

/// Byte offset of the patched `total_frames` field
pub const TOTAL_FRAMES_OFFSET: usize = 14;

/// Container version with 16-bit chunk sizes
pub const VERSION_1: u8 = 0x01;

/// Container version with 32-bit chunk sizes; what the encoder emits
pub const VERSION_2: u8 = 0x02;

// Header flag bits
pub const FLAG_HAS_ALPHA: u8 = 0x01;
pub const FLAG_HAS_MOTION: u8 = 0x02;
pub const FLAG_HAS_INDEX: u8 = 0x04;
pub const FLAG_HAS_BFRAMES: u8 = 0x08;
pub const FLAG_ENHANCED_COMP: u8 = 0x10;

/// Pixel colorspace byte of the file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    /// 0x00 — sRGB
    Srgb,
    /// 0x01 — sRGB with alpha
    Srgba,
    /// 0x02 — linear RGB
    Linear,
    /// 0x03 — linear RGB with alpha
    LinearAlpha,
    /// 0x10 — YUV 4:2:0
    Yuv420,
    /// 0x11 — YUV 4:2:2
    Yuv422,
    /// 0x12 — YUV 4:4:4
    Yuv444,
    /// 0x13 — YUV 4:2:0 with alpha plane
    Yuva420,
}

impl Colorspace {
    /// Parse the colorspace byte
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0x00 => Ok(Colorspace::Srgb),
            0x01 => Ok(Colorspace::Srgba),
            0x02 => Ok(Colorspace::Linear),
            0x03 => Ok(Colorspace::LinearAlpha),
            0x10 => Ok(Colorspace::Yuv420),
            0x11 => Ok(Colorspace::Yuv422),
            0x12 => Ok(Colorspace::Yuv444),
            0x13 => Ok(Colorspace::Yuva420),
            other => Err(Error::invalid_header(format!(
                "unknown colorspace 0x{:02X}",
                other
            ))),
        }
    }

    /// Byte value written to the file header
    pub fn as_byte(&self) -> u8 {
        match self {
            Colorspace::Srgb => 0x00,
            Colorspace::Srgba => 0x01,
            Colorspace::Linear => 0x02,
            Colorspace::LinearAlpha => 0x03,
            Colorspace::Yuv420 => 0x10,
            Colorspace::Yuv422 => 0x11,
            Colorspace::Yuv444 => 0x12,
            Colorspace::Yuva420 => 0x13,
        }
    }

    /// Whether frames are coded as YUV planes rather than RGB opcodes
    pub fn is_yuv(&self) -> bool {
        self.as_byte() >= 0x10
    }

    /// Chroma subsampling in YUV mode
    pub fn subsampling(&self) -> Option<Subsampling> {
        match self {
            Colorspace::Yuv420 | Colorspace::Yuva420 => Some(Subsampling::Yuv420),
            Colorspace::Yuv422 => Some(Subsampling::Yuv422),
            Colorspace::Yuv444 => Some(Subsampling::Yuv444),
            _ => None,
        }
    }

    /// Whether the colorspace itself implies an alpha plane
    pub fn implies_alpha(&self) -> bool {
        matches!(self, Colorspace::Yuva420)
    }
}

/// Parsed QOV file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    pub flags: u8,
    pub width: u16,
    pub height: u16,
    pub fps_num: u16,
    pub fps_den: u16,
    pub total_frames: u32,
    pub audio_channels: u8,
    pub audio_rate_hz: u32,
    pub colorspace: Colorspace,
}

impl FileHeader {
    /// Serialize the 24-byte header
    pub fn write(&self, out: &mut ByteWriter) {
        out.write_bytes(MAGIC);
        out.write_u8(self.version);
        out.write_u8(self.flags);
        out.write_u16(self.width);
        out.write_u16(self.height);
        out.write_u16(self.fps_num);
        out.write_u16(self.fps_den);
        out.write_u32(self.total_frames);
        out.write_u8(self.audio_channels);
        // 24-bit audio rate
        out.write_u8((self.audio_rate_hz >> 16) as u8);
        out.write_u16((self.audio_rate_hz & 0xFFFF) as u16);
        out.write_u8(self.colorspace.as_byte());
        out.write_u8(0); // reserved
    }

    /// Parse a 24-byte header, validating magic, version and colorspace
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::truncated(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                data.len()
            )));
        }
        if &data[0..4] != MAGIC {
            return Err(Error::invalid_header("magic mismatch, not a QOV file"));
        }
        let version = data[4];
        if version != VERSION_1 && version != VERSION_2 {
            return Err(Error::invalid_header(format!(
                "unknown version 0x{:02X}",
                version
            )));
        }
        let fps_den = BigEndian::read_u16(&data[12..14]);
        if fps_den == 0 {
            return Err(Error::invalid_header("fps denominator is zero"));
        }
        let audio_channels = data[18];
        if audio_channels > 8 {
            return Err(Error::invalid_header(format!(
                "audio channel count {} out of range",
                audio_channels
            )));
        }
        let colorspace = Colorspace::from_byte(data[22])?;
        if data[23] != 0 {
            // Reserved for future versions; readable files keep it zero
            warn!(reserved = data[23], "nonzero reserved header byte");
        }

        Ok(FileHeader {
            version,
            flags: data[5],
            width: BigEndian::read_u16(&data[6..8]),
            height: BigEndian::read_u16(&data[8..10]),
            fps_num: BigEndian::read_u16(&data[10..12]),
            fps_den,
            total_frames: BigEndian::read_u32(&data[14..18]),
            audio_channels,
            audio_rate_hz: ((data[19] as u32) << 16) | BigEndian::read_u16(&data[20..22]) as u32,
            colorspace,
        })
    }

    /// Whether frames carry an alpha plane in YUV mode (flag bit 0 or the
    /// alpha-bearing YUV colorspace)
    pub fn has_alpha(&self) -> bool {
        self.flags & FLAG_HAS_ALPHA != 0 || self.colorspace.implies_alpha()
    }

    /// Whether the keyframe index chunk is expected before END
    pub fn has_index(&self) -> bool {
        self.flags & FLAG_HAS_INDEX != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> FileHeader {
        FileHeader {
            version: VERSION_2,
            flags: FLAG_HAS_INDEX,
            width: 640,
            height: 480,
            fps_num: 30,
            fps_den: 1,
            total_frames: 0,
            audio_channels: 0,
            audio_rate_hz: 0,
            colorspace: Colorspace::Srgb,
        }
    }

    #[test]
    fn test_write_parse_roundtrip() {
        let header = sample_header();
        let mut w = ByteWriter::new();
        header.write(&mut w);
        assert_eq!(w.size(), HEADER_SIZE);
        assert_eq!(&w.as_slice()[0..4], b"qovf");
        let parsed = FileHeader::parse(w.as_slice()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_audio_rate_24bit() {
        let mut header = sample_header();
        header.audio_channels = 2;
        header.audio_rate_hz = 48_000;
        let mut w = ByteWriter::new();
        header.write(&mut w);
        let parsed = FileHeader::parse(w.as_slice()).unwrap();
        assert_eq!(parsed.audio_rate_hz, 48_000);
    }

    #[test]
    fn test_bad_magic() {
        let mut w = ByteWriter::new();
        sample_header().write(&mut w);
        let mut bytes = w.into_vec();
        bytes[0] = b'x';
        assert!(matches!(
            FileHeader::parse(&bytes),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_bad_version() {
        let mut w = ByteWriter::new();
        sample_header().write(&mut w);
        let mut bytes = w.into_vec();
        bytes[4] = 0x03;
        assert!(matches!(
            FileHeader::parse(&bytes),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_zero_fps_den() {
        let mut w = ByteWriter::new();
        sample_header().write(&mut w);
        let mut bytes = w.into_vec();
        bytes[12] = 0;
        bytes[13] = 0;
        assert!(matches!(
            FileHeader::parse(&bytes),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_too_many_audio_channels() {
        let mut w = ByteWriter::new();
        sample_header().write(&mut w);
        let mut bytes = w.into_vec();
        bytes[18] = 9;
        assert!(matches!(
            FileHeader::parse(&bytes),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_colorspace_properties() {
        assert!(!Colorspace::Srgb.is_yuv());
        assert!(Colorspace::Yuv420.is_yuv());
        assert!(Colorspace::Yuva420.implies_alpha());
        assert_eq!(
            Colorspace::Yuv422.subsampling(),
            Some(Subsampling::Yuv422)
        );
        assert!(Colorspace::from_byte(0x42).is_err());
        for b in [0x00u8, 0x01, 0x02, 0x03, 0x10, 0x11, 0x12, 0x13] {
            assert_eq!(Colorspace::from_byte(b).unwrap().as_byte(), b);
        }
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            FileHeader::parse(&[0u8; 10]),
            Err(Error::TruncatedInput(_))
        ));
    }
}
