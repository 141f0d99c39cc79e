//! Video probing, decoding and encoding behind the [`MediaBackend`] seam.

pub mod codec;
pub mod ffmpeg;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::MediaError;

pub use codec::{even_dimension, Codec};
pub use ffmpeg::FfmpegBackend;

/// Stream properties of an existing video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
    pub codec: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriterSpec {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: Codec,
}

/// Encodes RGB frames into a video file.
///
/// The target path only appears once [`VideoWriter::finish`] succeeds; a writer
/// dropped before that leaves nothing behind.
pub trait VideoWriter: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), MediaError>;

    fn frames_written(&self) -> u64;

    fn finish(self: Box<Self>) -> Result<PathBuf, MediaError>;
}

/// Decodes a video into RGB frames scaled to a fixed size.
pub trait VideoReader: Send {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, MediaError>;
}

pub trait MediaBackend: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoProbe, MediaError>;

    fn open_reader(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn VideoReader>, MediaError>;

    fn open_writer(&self, spec: &WriterSpec) -> Result<Box<dyn VideoWriter>, MediaError>;
}
