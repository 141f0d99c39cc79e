use std::fmt;
use std::str::FromStr;

use crate::error::MediaError;

/// Output codecs, named the way users pass fourcc-style codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    Mpeg4,
    Hevc,
    Vp9,
}

impl Codec {
    /// ffmpeg encoder for this codec.
    pub fn encoder(&self) -> &'static str {
        match self {
            Codec::H264 => "libx264",
            Codec::Mpeg4 => "mpeg4",
            Codec::Hevc => "libx265",
            Codec::Vp9 => "libvpx-vp9",
        }
    }
}

impl FromStr for Codec {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avc1" | "h264" | "x264" => Ok(Codec::H264),
            "mp4v" | "mpeg4" => Ok(Codec::Mpeg4),
            "hevc" | "h265" | "hvc1" => Ok(Codec::Hevc),
            "vp9" | "vp09" => Ok(Codec::Vp9),
            _ => Err(MediaError::UnknownCodec(s.to_string())),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Codec::H264 => "avc1",
            Codec::Mpeg4 => "mp4v",
            Codec::Hevc => "hevc",
            Codec::Vp9 => "vp9",
        };
        f.write_str(name)
    }
}

/// yuv420p needs even dimensions; rounds down to the nearest even value of at least 2.
pub fn even_dimension(dim: u32) -> u32 {
    let dim = dim.max(2);
    dim - dim % 2
}
