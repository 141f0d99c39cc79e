//! In-memory [`MediaBackend`] for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use super::{MediaBackend, VideoProbe, VideoReader, VideoWriter, WriterSpec};
use crate::error::MediaError;

#[derive(Debug, Clone)]
pub(crate) struct WrittenVideo {
    pub spec: WriterSpec,
    pub frames: Vec<RgbImage>,
}

#[derive(Default, Clone)]
pub(crate) struct MemoryBackend {
    clips: ClipStore,
    pub written: Arc<Mutex<Vec<WrittenVideo>>>,
}

impl MemoryBackend {
    /// Registers a solid-color clip and creates an empty file for it.
    pub fn add_clip(&self, path: &Path, seconds: f64, fps: f64, color: [u8; 3]) {
        let (width, height) = (4, 4);
        let count = (seconds * fps).round() as usize;
        let frames = vec![RgbImage::from_pixel(width, height, Rgb(color)); count];
        let probe = VideoProbe {
            width,
            height,
            fps,
            duration_secs: seconds,
            codec: "h264".into(),
        };
        std::fs::write(path, b"").unwrap();
        self.clips
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), (probe, frames));
    }

    pub fn written(&self) -> Vec<WrittenVideo> {
        self.written.lock().unwrap().clone()
    }
}

impl MediaBackend for MemoryBackend {
    fn probe(&self, path: &Path) -> Result<VideoProbe, MediaError> {
        self.clips
            .lock()
            .unwrap()
            .get(path)
            .map(|(probe, _)| probe.clone())
            .ok_or_else(|| MediaError::VideoNotFound(path.to_path_buf()))
    }

    fn open_reader(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn VideoReader>, MediaError> {
        let frames = self
            .clips
            .lock()
            .unwrap()
            .get(path)
            .map(|(_, frames)| frames.clone())
            .ok_or_else(|| MediaError::VideoNotFound(path.to_path_buf()))?;
        Ok(Box::new(MemoryReader {
            frames: frames.into_iter(),
            width,
            height,
        }))
    }

    fn open_writer(&self, spec: &WriterSpec) -> Result<Box<dyn VideoWriter>, MediaError> {
        Ok(Box::new(MemoryWriter {
            spec: spec.clone(),
            frames: Vec::new(),
            sink: self.written.clone(),
            clips: self.clips.clone(),
        }))
    }
}

struct MemoryReader {
    frames: std::vec::IntoIter<RgbImage>,
    width: u32,
    height: u32,
}

impl VideoReader for MemoryReader {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, MediaError> {
        Ok(self.frames.next().map(|frame| {
            if frame.dimensions() == (self.width, self.height) {
                frame
            } else {
                imageops::resize(&frame, self.width, self.height, FilterType::Nearest)
            }
        }))
    }
}

type ClipStore = Arc<Mutex<HashMap<PathBuf, (VideoProbe, Vec<RgbImage>)>>>;

/// Finished videos become readable clips of the same backend.
struct MemoryWriter {
    spec: WriterSpec,
    frames: Vec<RgbImage>,
    sink: Arc<Mutex<Vec<WrittenVideo>>>,
    clips: ClipStore,
}

impl VideoWriter for MemoryWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), MediaError> {
        if frame.dimensions() != (self.spec.width, self.spec.height) {
            return Err(MediaError::FrameSize {
                width: self.spec.width,
                height: self.spec.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames.len() as u64
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, MediaError> {
        let MemoryWriter {
            spec,
            frames,
            sink,
            clips,
        } = *self;
        std::fs::write(&spec.path, frames.len().to_string())?;
        let probe = VideoProbe {
            width: spec.width,
            height: spec.height,
            fps: spec.fps,
            duration_secs: frames.len() as f64 / spec.fps,
            codec: spec.codec.to_string(),
        };
        clips
            .lock()
            .unwrap()
            .insert(spec.path.clone(), (probe, frames.clone()));
        let path = spec.path.clone();
        sink.lock().unwrap().push(WrittenVideo { spec, frames });
        Ok(path)
    }
}
