use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::context::BatchContext;
use super::job::{BagEntry, JobDescriptor};
use crate::bag::analyze_bag;
use crate::combine::{
    clip_file_name, ClipRef, CombineOptions, CombinedVideo, DividerStyle, VideoCombiner,
};
use crate::error::{AppError, CombineError, PipelineError};
use crate::media::Codec;
use crate::pipeline::{render_video, RenderOptions};

const REGISTER_VIDEO: &str =
    "mutation RegisterVideo($input: VideoInput!) { registerVideo(input: $input) { id } }";

/// A combined video stored at its destination.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedVideo {
    pub remote: String,
    pub video: CombinedVideo,
    /// Whether the catalog acknowledged the registration.
    pub registered: bool,
}

/// Renders every bag of a job, combines the clips per subject, then uploads and registers them.
pub struct BatchOrchestrator {
    context: BatchContext,
}

impl BatchOrchestrator {
    pub fn new(context: BatchContext) -> Self {
        Self { context }
    }

    /// Any download or render failure aborts the batch; catalog failures never do.
    #[tracing::instrument(skip_all, fields(event = %job.event_id))]
    pub async fn run(
        &self,
        job: &JobDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Vec<UploadedVideo>, AppError> {
        let work = self.context.configuration.batch.work_dir.join(&job.event_id);
        tokio::fs::create_dir_all(&work).await?;
        tracing::info!(
            "Batch {} started: {} bag(s), work dir {}",
            job.event_id,
            job.entries.len(),
            work.display()
        );

        let codec = self.codec(job)?;
        let background = match &job.options.background {
            Some(remote) => Some(
                self.context
                    .storage
                    .download(remote, &work.join("assets"))
                    .await?,
            ),
            None => None,
        };

        let mut clips: IndexMap<String, IndexMap<String, Vec<ClipRef>>> = IndexMap::new();
        for (index, entry) in job.entries.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled.into());
            }
            let options = self.render_options(job, entry, codec, background.clone());
            let clip = self
                .render_entry(job, entry, &work.join(index.to_string()), options, cancel)
                .await?;
            clips
                .entry(clip.subject.clone())
                .or_default()
                .entry(clip.model.clone())
                .or_default()
                .push(clip);
        }

        let mut uploaded = Vec::new();
        for (subject, models) in clips {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled.into());
            }
            let subject_clips: Vec<ClipRef> = models.into_values().flatten().collect();
            tracing::info!("Combining {} clip(s) for {}", subject_clips.len(), subject);
            let videos = self
                .combine(job, subject_clips, codec, background.clone(), &work, cancel)
                .await?;

            let stored =
                try_join_all(videos.into_iter().map(|video| self.upload(job, video))).await?;
            uploaded.extend(stored);
        }

        tracing::info!(
            "Batch {} finished: {} video(s) uploaded",
            job.event_id,
            uploaded.len()
        );
        Ok(uploaded)
    }

    fn codec(&self, job: &JobDescriptor) -> Result<Codec, AppError> {
        let name = job
            .options
            .codec
            .as_deref()
            .unwrap_or(&self.context.configuration.render.codec);
        Ok(name.parse()?)
    }

    fn render_options(
        &self,
        job: &JobDescriptor,
        entry: &BagEntry,
        codec: Codec,
        background: Option<PathBuf>,
    ) -> RenderOptions {
        let mut options = RenderOptions::from_settings(&self.context.configuration.render);
        options.codec = codec;
        options.frame_limit = job.options.frame_limit;
        options.relative_labels = job.options.relative_labels;
        options.subject = entry.subject.clone();
        if background.is_some() {
            options.background = background;
        }
        options
    }

    async fn render_entry(
        &self,
        job: &JobDescriptor,
        entry: &BagEntry,
        work: &Path,
        options: RenderOptions,
        cancel: &CancellationToken,
    ) -> Result<ClipRef, AppError> {
        let storage = &self.context.storage;
        let model_path = storage.download(&entry.model, &work.join("model")).await?;
        let bag_path = storage.download(&entry.bag, &work.join("bag")).await?;

        let models = self.context.models.clone();
        let media = self.context.media.clone();
        let subject = entry.subject.clone();
        let model_label = entry.model_label();
        let vehicle = job.options.vehicle.clone();
        let clips_dir = work.join("clips");
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || -> Result<ClipRef, AppError> {
            let model = models.open(&model_path)?;
            let info = analyze_bag(&bag_path, &options.topic, model.metadata.as_ref())?;
            let output = clips_dir.join(clip_file_name(
                &subject,
                &model_label,
                vehicle.as_deref(),
                info.start_time,
            ));
            let outcome = render_video(
                &bag_path,
                info,
                model.loader.clone(),
                &output,
                &options,
                media.as_ref(),
                &cancel,
            )?;
            Ok(ClipRef::new(
                outcome.output,
                &subject,
                &model_label,
                vehicle.as_deref(),
                outcome.info.start_time,
            ))
        })
        .await?
    }

    async fn combine(
        &self,
        job: &JobDescriptor,
        clips: Vec<ClipRef>,
        codec: Codec,
        background: Option<PathBuf>,
        work: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<CombinedVideo>, AppError> {
        let settings = &self.context.configuration.combine;
        let mut options = CombineOptions::from_settings(settings, codec, work.join("combined"))
            .with_vehicle(job.options.vehicle.clone());
        if let Some(grouping) = job.options.grouping {
            options.grouping = grouping;
        }
        if let Some(skip) = job.options.skip_duration_secs {
            options.skip_duration_secs = skip;
        }
        let divider = background.or_else(|| settings.divider_background.clone());

        let media = self.context.media.clone();
        let cancel = cancel.clone();
        let videos = tokio::task::spawn_blocking(move || -> Result<_, CombineError> {
            let mut combiner = VideoCombiner::new(media.as_ref(), options);
            if let Some(path) = divider {
                combiner = combiner.with_divider(DividerStyle::with_background(&path)?);
            }
            combiner.combine(clips, &cancel)
        })
        .await??;
        Ok(videos)
    }

    async fn upload(
        &self,
        job: &JobDescriptor,
        video: CombinedVideo,
    ) -> Result<UploadedVideo, AppError> {
        let destination = job
            .options
            .destination
            .as_deref()
            .unwrap_or(&self.context.configuration.batch.destination);
        let file = video
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let remote = format!(
            "{}/{}/{}",
            destination.trim_end_matches('/'),
            job.event_id,
            file
        );
        let remote = self.context.storage.upload(&video.path, &remote).await?;
        let registered = self.register(job, &remote, &video).await;

        Ok(UploadedVideo {
            remote,
            video,
            registered,
        })
    }

    /// Best effort: a failed registration is logged and the batch carries on.
    async fn register(&self, job: &JobDescriptor, remote: &str, video: &CombinedVideo) -> bool {
        let variables = json!({
            "input": {
                "eventId": job.event_id,
                "subject": video.subject,
                "path": remote,
                "width": video.width,
                "height": video.height,
                "fps": video.fps,
                "durationSecs": video.duration_secs,
                "codec": video.codec,
                "clips": video.clips,
            }
        });
        match self.context.catalog.send_mutation(REGISTER_VIDEO, variables).await {
            Some(_) => {
                tracing::info!("Registered {}", remote);
                true
            }
            None => {
                tracing::warn!("Registration of {} failed, continuing", remote);
                false
            }
        }
    }
}
