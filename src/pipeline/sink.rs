use std::path::PathBuf;

use image::ImageFormat;

use super::types::RenderedFrame;
use crate::error::MediaError;
use crate::media::VideoWriter;

/// Destination of sequenced frames.
pub trait FrameSink {
    fn write(&mut self, frame: &RenderedFrame) -> Result<(), MediaError>;
}

/// Decodes each rendered JPEG and feeds it to a video writer.
pub struct VideoSink {
    writer: Box<dyn VideoWriter>,
}

impl VideoSink {
    pub fn new(writer: Box<dyn VideoWriter>) -> Self {
        Self { writer }
    }

    pub fn frames_written(&self) -> u64 {
        self.writer.frames_written()
    }

    pub fn finish(self) -> Result<PathBuf, MediaError> {
        self.writer.finish()
    }
}

impl FrameSink for VideoSink {
    fn write(&mut self, frame: &RenderedFrame) -> Result<(), MediaError> {
        let image = image::load_from_memory_with_format(&frame.jpeg, ImageFormat::Jpeg)?.to_rgb8();
        self.writer.write_frame(&image)
    }
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemorySink {
    pub frames: Vec<RenderedFrame>,
}

#[cfg(test)]
impl MemorySink {
    pub fn indexes(&self) -> Vec<u64> {
        self.frames.iter().map(|f| f.index).collect()
    }
}

#[cfg(test)]
impl FrameSink for MemorySink {
    fn write(&mut self, frame: &RenderedFrame) -> Result<(), MediaError> {
        self.frames.push(frame.clone());
        Ok(())
    }
}
