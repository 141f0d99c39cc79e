use std::path::PathBuf;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::clip::ClipRef;
use super::divider::DividerStyle;
use super::grouping::{group_clips, random_suffix, GroupingMode, VideoGroup};
use crate::config::CombineSettings;
use crate::error::CombineError;
use crate::media::{even_dimension, Codec, MediaBackend, VideoProbe, WriterSpec};

#[derive(Debug, Clone)]
pub struct CombineOptions {
    pub divider_seconds: f64,
    /// Clips shorter than this are left out.
    pub skip_duration_secs: f64,
    pub grouping: GroupingMode,
    pub vehicle: Option<String>,
    pub codec: Codec,
    pub output_dir: PathBuf,
}

impl CombineOptions {
    pub fn from_settings(settings: &CombineSettings, codec: Codec, output_dir: PathBuf) -> Self {
        Self {
            divider_seconds: settings.divider_seconds.max(0.0),
            skip_duration_secs: settings.skip_duration_secs,
            grouping: settings.grouping,
            vehicle: None,
            codec,
            output_dir,
        }
    }

    pub fn with_vehicle(mut self, vehicle: Option<String>) -> Self {
        self.vehicle = vehicle;
        self
    }
}

/// Metadata of one combined output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedVideo {
    pub path: PathBuf,
    pub subject: String,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub codec: String,
    pub fps: f64,
    pub clips: usize,
}

/// Concatenates per-bag clips into grouped outputs with a title card before each clip.
pub struct VideoCombiner<'a> {
    backend: &'a dyn MediaBackend,
    options: CombineOptions,
    divider: DividerStyle,
}

impl<'a> VideoCombiner<'a> {
    pub fn new(backend: &'a dyn MediaBackend, options: CombineOptions) -> Self {
        Self {
            backend,
            options,
            divider: DividerStyle::solid(),
        }
    }

    // Replaces the solid divider fill
    pub fn with_divider(mut self, divider: DividerStyle) -> Self {
        self.divider = divider;
        self
    }

    pub fn group(&self, clips: Vec<ClipRef>) -> Vec<VideoGroup> {
        group_clips(
            clips,
            self.options.grouping,
            self.options.vehicle.as_deref(),
            random_suffix,
        )
    }

    /// Groups `clips` and writes one output per group that keeps at least one clip.
    pub fn combine(
        &self,
        clips: Vec<ClipRef>,
        cancel: &CancellationToken,
    ) -> Result<Vec<CombinedVideo>, CombineError> {
        let groups = self.group(clips);
        tracing::info!(
            "Combining into {} group(s) by {:?}",
            groups.len(),
            self.options.grouping
        );
        std::fs::create_dir_all(&self.options.output_dir)?;

        let mut outputs = Vec::new();
        for group in &groups {
            if let Some(video) = self.combine_group(group, cancel)? {
                outputs.push(video);
            }
        }
        Ok(outputs)
    }

    pub fn combine_group(
        &self,
        group: &VideoGroup,
        cancel: &CancellationToken,
    ) -> Result<Option<CombinedVideo>, CombineError> {
        let mut included: Vec<(&ClipRef, VideoProbe)> = Vec::with_capacity(group.clips.len());
        for clip in &group.clips {
            let probe = self.backend.probe(&clip.path)?;
            if probe.duration_secs < self.options.skip_duration_secs {
                tracing::warn!(
                    "Skipping {} ({:.1}s is shorter than {:.1}s)",
                    clip.path.display(),
                    probe.duration_secs,
                    self.options.skip_duration_secs
                );
                continue;
            }
            included.push((clip, probe));
        }

        let Some((_, first)) = included.first() else {
            tracing::info!("No clip long enough for {}, nothing written", group.output_name);
            return Ok(None);
        };
        let width = even_dimension(first.width);
        let height = even_dimension(first.height);
        let fps = if first.fps > 0.0 { first.fps } else { 15.0 };
        let divider_frames = if self.options.divider_seconds > 0.0 {
            ((self.options.divider_seconds * fps).round() as u64).max(1)
        } else {
            0
        };

        let mut writer = self.backend.open_writer(&WriterSpec {
            path: self.options.output_dir.join(&group.output_name),
            width,
            height,
            fps,
            codec: self.options.codec,
        })?;

        for (clip, _) in &included {
            let card = self
                .divider
                .render(width, height, &clip.subject, &clip.model, clip.timestamp);
            for _ in 0..divider_frames {
                writer.write_frame(&card)?;
            }

            let mut reader = self.backend.open_reader(&clip.path, width, height)?;
            let mut copied = 0u64;
            while let Some(frame) = reader.next_frame()? {
                if cancel.is_cancelled() {
                    return Err(CombineError::Cancelled);
                }
                writer.write_frame(&frame)?;
                copied += 1;
            }
            tracing::debug!("Copied {} frames from {}", copied, clip.path.display());
        }

        let frames = writer.frames_written();
        let path = writer.finish()?;
        let video = CombinedVideo {
            path,
            subject: group.key.subject.clone(),
            width,
            height,
            duration_secs: frames as f64 / fps,
            codec: self.options.codec.to_string(),
            fps,
            clips: included.len(),
        };
        tracing::info!(
            "Combined {} clip(s) into {} ({:.1}s)",
            video.clips,
            video.path.display(),
            video.duration_secs
        );
        Ok(Some(video))
    }
}
