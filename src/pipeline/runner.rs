use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::describe::StepSummary;
use super::sequencer::{Sequencer, SequencerReport, SequencerSettings};
use super::sink::{FrameSink, VideoSink};
use super::source::spawn_source;
use super::worker::{join_until, WorkerContext, WorkerPool};
use crate::bag::{analyze_bag, BagInfo};
use crate::config::RenderSettings;
use crate::error::{MediaError, PipelineError};
use crate::media::{even_dimension, Codec, FfmpegBackend, MediaBackend, WriterSpec};
use crate::model::{ModelLoader, ModelMetadata, ModelPackage, OnnxLoader};
use crate::render::{Background, ComposerSettings};

/// Knobs of a single-bag render.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
    /// Zero picks one worker per core, minus one for the sequencer.
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub poll_interval: Duration,
    pub max_worker_errors: usize,
    pub attention_patch: u32,
    pub topic: String,
    pub codec: Codec,
    pub frame_limit: Option<u64>,
    pub relative_labels: bool,
    pub background: Option<PathBuf>,
    pub subject: String,
    /// Also log and write a JSON [`StepSummary`] next to the video.
    pub describe: bool,
    pub join_timeout: Duration,
    pub progress_every: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_settings(&RenderSettings::default())
    }
}

impl RenderOptions {
    pub fn builder() -> RenderOptionsBuilder {
        RenderOptionsBuilder::default()
    }

    /// Options from the `[render]` configuration section. An unknown codec falls back to H.264.
    pub fn from_settings(settings: &RenderSettings) -> Self {
        let codec = settings.codec.parse().unwrap_or_else(|e| {
            tracing::warn!("{}, using {}", e, Codec::H264);
            Codec::H264
        });
        Self {
            width: settings.width,
            height: settings.height,
            jpeg_quality: settings.jpeg_quality,
            worker_count: settings.worker_count,
            queue_capacity: settings.queue_capacity,
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            max_worker_errors: settings.max_worker_errors,
            attention_patch: settings.attention_patch,
            topic: settings.topic.clone(),
            codec,
            frame_limit: None,
            relative_labels: false,
            background: settings.background_image.clone(),
            subject: String::new(),
            describe: false,
            join_timeout: Duration::from_secs(settings.join_timeout_secs),
            progress_every: settings.progress_every,
        }
    }

    /// Output frame size, rounded down to even dimensions.
    pub fn frame_size(&self) -> (u32, u32) {
        (even_dimension(self.width), even_dimension(self.height))
    }

    pub fn resolved_workers(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        std::thread::available_parallelism()
            .map(|cores| cores.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptionsBuilder {
    options: RenderOptions,
}

impl RenderOptionsBuilder {
    // Sets the output frame size
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.options.width = width;
        self.options.height = height;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.options.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.options.worker_count = count;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.options.queue_capacity = capacity.max(1);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    pub fn max_worker_errors(mut self, threshold: usize) -> Self {
        self.options.max_worker_errors = threshold;
        self
    }

    pub fn attention_patch(mut self, patch: u32) -> Self {
        self.options.attention_patch = patch.max(1);
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.options.topic = topic.into();
        self
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.options.codec = codec;
        self
    }

    pub fn frame_limit(mut self, limit: Option<u64>) -> Self {
        self.options.frame_limit = limit;
        self
    }

    pub fn relative_labels(mut self, relative: bool) -> Self {
        self.options.relative_labels = relative;
        self
    }

    pub fn background(mut self, path: Option<PathBuf>) -> Self {
        self.options.background = path;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.options.subject = subject.into();
        self
    }

    pub fn describe(mut self, describe: bool) -> Self {
        self.options.describe = describe;
        self
    }

    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.options.join_timeout = timeout;
        self
    }

    pub fn progress_every(mut self, every: u64) -> Self {
        self.options.progress_every = every;
        self
    }

    pub fn build(self) -> RenderOptions {
        self.options
    }
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub output: PathBuf,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub info: BagInfo,
    pub summary: Option<StepSummary>,
}

/// Runs source, worker pool and sequencer over one bag, writing into `sink`.
///
/// Blocks until every frame up to the limit is written or dropped, or the run
/// aborts. Threads are stopped and joined on every path.
pub fn render_frames<S: FrameSink + ?Sized>(
    bag: &Path,
    info: &BagInfo,
    loader: Arc<dyn ModelLoader>,
    sink: &mut S,
    options: &RenderOptions,
    cancel: &CancellationToken,
) -> Result<SequencerReport, PipelineError> {
    let total = options
        .frame_limit
        .map_or(info.total_frames, |limit| limit.min(info.total_frames));
    let (width, height) = options.frame_size();
    let background = options
        .background
        .as_deref()
        .map(|path| Background::load(path, width, height))
        .transpose()
        .map_err(MediaError::from)?;

    let context = Arc::new(WorkerContext {
        loader,
        info: info.clone(),
        composer: ComposerSettings {
            width,
            height,
            jpeg_quality: options.jpeg_quality,
            relative_labels: options.relative_labels,
            subject: options.subject.clone(),
        },
        background,
        attention_patch: options.attention_patch,
        poll_interval: options.poll_interval,
    });

    let run = cancel.child_token();
    // Stops source and workers however this function returns.
    let stop = run.clone().drop_guard();

    let (task_tx, task_rx) = crossbeam_channel::bounded(options.queue_capacity.max(1));
    let (result_tx, result_rx) = crossbeam_channel::unbounded();
    let (error_tx, error_rx) = crossbeam_channel::unbounded();

    let source = spawn_source(
        bag.to_path_buf(),
        options.topic.clone(),
        Some(total),
        task_tx,
        run.clone(),
        options.poll_interval,
    )?;
    let mut pool = WorkerPool::spawn(
        options.resolved_workers(),
        context,
        &task_rx,
        &result_tx,
        &error_tx,
        &run,
    )?;
    drop((task_rx, result_tx, error_tx));

    let sequenced = Sequencer::new(SequencerSettings {
        total,
        max_worker_errors: options.max_worker_errors,
        poll_interval: options.poll_interval,
        progress_every: options.progress_every,
    })
    .run(&result_rx, &error_rx, sink, &mut pool, &run);

    drop(stop);
    let deadline = Instant::now() + options.join_timeout;
    pool.join(options.join_timeout);
    let source_result = match join_until(source, deadline) {
        Some(Ok(result)) => Some(result),
        Some(Err(_)) => {
            tracing::warn!("Frame source panicked");
            None
        }
        None => {
            tracing::warn!("Frame source did not stop in time, detaching");
            None
        }
    };

    match (sequenced, source_result) {
        (Ok(report), _) => Ok(report),
        // Workers drain and exit once a failed source closes the queue early.
        (Err(PipelineError::WorkersExited { .. }), Some(Err(e))) => Err(e.into()),
        (Err(e), _) => Err(e),
    }
}

/// Analyzes `bag`, renders it and finalizes the video at `output`.
///
/// The output file only exists when the whole run succeeds.
pub fn render_session(
    bag: &Path,
    loader: Arc<dyn ModelLoader>,
    metadata: Option<&ModelMetadata>,
    output: &Path,
    options: &RenderOptions,
    backend: &dyn MediaBackend,
    cancel: &CancellationToken,
) -> Result<RenderOutcome, PipelineError> {
    let info = analyze_bag(bag, &options.topic, metadata)?;
    render_video(bag, info, loader, output, options, backend, cancel)
}

/// Renders an already analyzed bag into `output`.
pub fn render_video(
    bag: &Path,
    info: BagInfo,
    loader: Arc<dyn ModelLoader>,
    output: &Path,
    options: &RenderOptions,
    backend: &dyn MediaBackend,
    cancel: &CancellationToken,
) -> Result<RenderOutcome, PipelineError> {
    tracing::info!(
        "Bag {}: {} frames at {:.2} fps, {}x{}x{} images",
        info.name,
        info.total_frames,
        info.fps,
        info.image_shape.width,
        info.image_shape.height,
        info.image_shape.channels
    );

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(MediaError::from)?;
    }
    let (width, height) = options.frame_size();
    let writer = backend.open_writer(&WriterSpec {
        path: output.to_path_buf(),
        width,
        height,
        fps: info.fps,
        codec: options.codec,
    })?;
    let mut sink = VideoSink::new(writer);

    let report = render_frames(bag, &info, loader, &mut sink, options, cancel)?;
    let output = sink.finish()?;
    tracing::info!(
        "Wrote {} ({} frames, {} dropped)",
        output.display(),
        report.written,
        report.dropped
    );

    let summary = if options.describe {
        let summary = StepSummary::from_steps(&report.steps);
        summary.log();
        summary
            .write_json(&output.with_extension("json"))
            .map_err(MediaError::from)?;
        Some(summary)
    } else {
        None
    };

    Ok(RenderOutcome {
        output,
        frames_written: report.written,
        frames_dropped: report.dropped,
        info,
        summary,
    })
}

/// Renders a bag with an ONNX model package through ffmpeg.
#[tracing::instrument(skip(options, cancel), fields(bag = %bag.display()))]
pub fn run_render(
    bag: &Path,
    model: &Path,
    output: &Path,
    options: &RenderOptions,
    cancel: &CancellationToken,
) -> Result<RenderOutcome, PipelineError> {
    let package = ModelPackage::open(model)?;
    let loader: Arc<dyn ModelLoader> = Arc::new(OnnxLoader::from_package(&package));
    render_session(
        bag,
        loader,
        Some(&package.metadata),
        output,
        options,
        &FfmpegBackend::default(),
        cancel,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::fixtures::sample_bag;
    use crate::error::BagError;
    use crate::media::testing::MemoryBackend;
    use crate::model::testing::ScriptedLoader;

    fn options() -> RenderOptions {
        RenderOptions::builder()
            .size(65, 48)
            .workers(3)
            .queue_capacity(2)
            .attention_patch(4)
            .poll_interval(Duration::from_millis(5))
            .join_timeout(Duration::from_secs(5))
            .subject("tester")
            .build()
    }

    #[test]
    fn renders_every_frame_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let bag = sample_bag(dir.path(), 7, 10.0, 3);
        let output = dir.path().join("out").join("clip.mp4");
        let backend = MemoryBackend::default();

        let outcome = render_session(
            &bag,
            Arc::new(ScriptedLoader::new(3)),
            None,
            &output,
            &options(),
            &backend,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(outcome.frames_written, 7);
        assert_eq!(outcome.frames_dropped, 0);
        assert!(output.exists());
        assert!(outcome.summary.is_none());

        let written = backend.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].frames.len(), 7);
        assert_eq!((written[0].spec.width, written[0].spec.height), (64, 48));
        assert!((written[0].spec.fps - 10.0).abs() < 1e-6);
    }

    #[test]
    fn frame_limit_and_describe() {
        let dir = tempfile::tempdir().unwrap();
        let bag = sample_bag(dir.path(), 8, 10.0, 3);
        let output = dir.path().join("clip.mp4");
        let backend = MemoryBackend::default();
        let options = RenderOptions::builder()
            .size(64, 48)
            .workers(2)
            .attention_patch(4)
            .poll_interval(Duration::from_millis(5))
            .frame_limit(Some(3))
            .describe(true)
            .build();

        let outcome = render_session(
            &bag,
            Arc::new(ScriptedLoader::new(3)),
            None,
            &output,
            &options,
            &backend,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(outcome.frames_written, 3);
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.vehicle_histogram, vec![1, 1, 1]);
        assert!(dir.path().join("clip.json").exists());
    }

    #[test]
    fn dropped_frames_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bag = sample_bag(dir.path(), 5, 10.0, 3);
        let output = dir.path().join("clip.mp4");
        let backend = MemoryBackend::default();

        let outcome = render_session(
            &bag,
            Arc::new(ScriptedLoader::new(3).fail_on_level(20.0)),
            None,
            &output,
            &options(),
            &backend,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!((outcome.frames_written, outcome.frames_dropped), (4, 1));
        assert_eq!(backend.written()[0].frames.len(), 4);
    }

    #[test]
    fn worker_setup_errors_abort_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let bag = sample_bag(dir.path(), 5, 10.0, 3);
        let output = dir.path().join("clip.mp4");
        let backend = MemoryBackend::default();

        let result = render_session(
            &bag,
            Arc::new(ScriptedLoader::new(3).failing()),
            None,
            &output,
            &options(),
            &backend,
            &CancellationToken::new(),
        );

        assert!(matches!(
            result,
            Err(PipelineError::TooManyWorkerErrors { threshold: 0, .. })
        ));
        assert!(!output.exists());
        assert!(backend.written().is_empty());
    }

    #[test]
    fn cancelled_runs_leave_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let bag = sample_bag(dir.path(), 5, 10.0, 3);
        let output = dir.path().join("clip.mp4");
        let backend = MemoryBackend::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = render_session(
            &bag,
            Arc::new(ScriptedLoader::new(3)),
            None,
            &output,
            &options(),
            &backend,
            &cancel,
        );
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(!output.exists());
    }

    #[test]
    fn missing_bag_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = render_session(
            &dir.path().join("missing"),
            Arc::new(ScriptedLoader::new(3)),
            None,
            &dir.path().join("clip.mp4"),
            &options(),
            &MemoryBackend::default(),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(PipelineError::Bag(BagError::NotFound(_)))));
    }

    #[test]
    fn zero_workers_resolve_to_at_least_one() {
        let options = RenderOptions::builder().workers(0).build();
        assert!(options.resolved_workers() >= 1);
        assert_eq!(RenderOptions::builder().size(641, 3).build().frame_size(), (640, 2));
    }
}
