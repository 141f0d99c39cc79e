use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::RgbImage;
use tokio_util::sync::CancellationToken;

use super::types::{FrameTask, RenderedFrame, Step, WorkerFailure, WorkerMessage};
use crate::bag::{BagInfo, CameraImage, InferenceMessage};
use crate::error::{BagError, PipelineError, RenderError};
use crate::model::{occlusion_map, ModelLoader, Observation, PolicyModel};
use crate::render::{Background, ComposerSettings, FrameComposer};

/// Everything a worker needs to build its renderer.
pub struct WorkerContext {
    pub loader: Arc<dyn ModelLoader>,
    pub info: BagInfo,
    pub composer: ComposerSettings,
    pub background: Option<Background>,
    pub attention_patch: u32,
    pub poll_interval: Duration,
}

/// Per-worker state: one model session and one composer.
pub struct FrameRenderer {
    model: Box<dyn PolicyModel>,
    composer: FrameComposer,
    attention_patch: u32,
    start_ns: i64,
    action_count: usize,
}

impl FrameRenderer {
    pub fn new(context: &WorkerContext) -> Result<Self, RenderError> {
        let model = context.loader.load()?;
        let composer = FrameComposer::new(
            context.composer.clone(),
            &context.info,
            context.background.clone(),
        );
        Ok(Self {
            model,
            composer,
            attention_patch: context.attention_patch,
            start_ns: context
                .info
                .start_time
                .timestamp_nanos_opt()
                .unwrap_or_default(),
            action_count: context
                .info
                .action_space
                .as_ref()
                .map(|space| space.len())
                .unwrap_or(0),
        })
    }

    pub fn render(&mut self, task: &FrameTask) -> Result<RenderedFrame, RenderError> {
        let message = InferenceMessage::decode(&task.payload)?;
        let images = message
            .images
            .iter()
            .map(CameraImage::to_rgb)
            .collect::<Result<Vec<RgbImage>, BagError>>()?;
        let camera = images.first().ok_or(BagError::NoImage)?;

        let observation = Observation::from_images(&images, self.model.input_shape())
            .ok_or(BagError::NoImage)?;
        let attention = occlusion_map(self.model.as_mut(), &observation, self.attention_patch)?;

        let timestamp = (task.timestamp_ns - self.start_ns) as f64 / 1e9;
        let step = Step::new(
            task.index,
            timestamp.max(0.0),
            message.probabilities(self.action_count),
            attention.probabilities.clone(),
        );
        let jpeg = self.composer.render_jpeg(camera, &attention, &step)?;

        Ok(RenderedFrame {
            index: task.index,
            step,
            jpeg: Bytes::from(jpeg),
        })
    }
}

/// Reports the in-flight frame as dropped unless completed, so the sequencer
/// never waits on an index a dying worker was holding.
struct InFlight<'a> {
    index: u64,
    results: &'a Sender<WorkerMessage>,
    done: bool,
}

impl<'a> InFlight<'a> {
    fn new(index: u64, results: &'a Sender<WorkerMessage>) -> Self {
        Self {
            index,
            results,
            done: false,
        }
    }

    fn complete(mut self, message: WorkerMessage) -> bool {
        self.done = true;
        self.results.send(message).is_ok()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.results.send(WorkerMessage::Dropped { index: self.index });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_worker(
    id: usize,
    context: Arc<WorkerContext>,
    tasks: Receiver<FrameTask>,
    results: Sender<WorkerMessage>,
    errors: Sender<WorkerFailure>,
    cancel: CancellationToken,
) {
    let mut renderer = match FrameRenderer::new(&context) {
        Ok(renderer) => renderer,
        Err(e) => {
            tracing::error!("Worker {} failed to start: {}", id, e);
            let _ = errors.send(WorkerFailure {
                worker: id,
                message: e.to_string(),
            });
            return;
        }
    };
    tracing::debug!("Worker {} ready", id);

    let mut rendered = 0u64;
    while !cancel.is_cancelled() {
        let task = match tasks.recv_timeout(context.poll_interval) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let guard = InFlight::new(task.index, &results);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| renderer.render(&task)))
            .unwrap_or_else(|payload| Err(RenderError::Panicked(panic_message(payload.as_ref()))));
        let message = match outcome {
            Ok(frame) => {
                rendered += 1;
                tracing::debug!("Worker {} rendered frame {}", id, frame.index);
                WorkerMessage::Rendered(frame)
            }
            Err(e) => {
                tracing::warn!("Worker {} dropped frame {}: {}", id, task.index, e);
                WorkerMessage::Dropped { index: task.index }
            }
        };
        if !guard.complete(message) {
            tracing::debug!("Result channel closed, worker {} stopping", id);
            break;
        }
    }
    tracing::debug!("Worker {} exiting after {} frames", id, rendered);
}

/// Liveness view of the render workers, polled by the sequencer.
pub trait WorkerMonitor {
    /// Number of workers still running. Workers that exited abnormally are logged.
    fn live_workers(&mut self) -> usize;
}

pub struct WorkerPool {
    handles: Vec<(usize, Option<JoinHandle<()>>)>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        context: Arc<WorkerContext>,
        tasks: &Receiver<FrameTask>,
        results: &Sender<WorkerMessage>,
        errors: &Sender<WorkerFailure>,
        cancel: &CancellationToken,
    ) -> Result<Self, PipelineError> {
        let mut pool = Self {
            handles: Vec::with_capacity(count),
        };
        for id in 0..count.max(1) {
            let (context, tasks, results, errors, cancel) = (
                context.clone(),
                tasks.clone(),
                results.clone(),
                errors.clone(),
                cancel.clone(),
            );
            let handle = std::thread::Builder::new()
                .name(format!("bagviz-worker-{id}"))
                .spawn(move || run_worker(id, context, tasks, results, errors, cancel))
                .map_err(PipelineError::Spawn)?;
            pool.handles.push((id, Some(handle)));
        }
        tracing::info!("Started {} render workers", pool.handles.len());
        Ok(pool)
    }

    /// Joins every worker, giving up on stragglers after `timeout`.
    pub fn join(mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        for (id, handle) in self.handles.iter_mut() {
            let Some(handle) = handle.take() else {
                continue;
            };
            match join_until(handle, deadline) {
                Some(Ok(())) => {}
                Some(Err(_)) => tracing::warn!("Worker {} panicked", id),
                None => tracing::warn!("Worker {} did not stop in time, detaching", id),
            }
        }
    }
}

impl WorkerMonitor for WorkerPool {
    fn live_workers(&mut self) -> usize {
        let mut live = 0;
        for (id, slot) in self.handles.iter_mut() {
            let finished = match slot {
                Some(handle) => handle.is_finished(),
                None => continue,
            };
            if !finished {
                live += 1;
                continue;
            }
            if let Some(handle) = slot.take() {
                if handle.join().is_err() {
                    tracing::warn!("Worker {} exited abnormally", id);
                }
            }
        }
        live
    }
}

/// Joins `handle` if it finishes before `deadline`; otherwise leaves it detached.
pub(crate) fn join_until<T>(handle: JoinHandle<T>, deadline: Instant) -> Option<std::thread::Result<T>> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    Some(handle.join())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::fixtures::{encode_message, sample_bag, TOPIC};
    use crate::bag::analyze_bag;
    use crate::model::testing::ScriptedLoader;

    fn context(loader: ScriptedLoader) -> (tempfile::TempDir, Arc<WorkerContext>) {
        let dir = tempfile::tempdir().unwrap();
        let bag = sample_bag(dir.path(), 4, 10.0, 3);
        let info = analyze_bag(&bag, TOPIC, None).unwrap();
        let context = WorkerContext {
            loader: Arc::new(loader),
            info,
            composer: ComposerSettings {
                width: 64,
                height: 48,
                jpeg_quality: 70,
                relative_labels: false,
                subject: "test".into(),
            },
            background: None,
            attention_patch: 4,
            poll_interval: Duration::from_millis(5),
        };
        (dir, Arc::new(context))
    }

    fn task(index: u64, level: u8) -> FrameTask {
        FrameTask {
            index,
            timestamp_ns: crate::bag::fixtures::START_NS + index as i64 * 100_000_000,
            payload: Bytes::from(encode_message(8, 6, [level, level, level], &[0.1, 0.8, 0.1])),
        }
    }

    #[test]
    fn renders_a_step_and_a_jpeg() {
        let (_dir, context) = context(ScriptedLoader::new(3));
        let mut renderer = FrameRenderer::new(&context).unwrap();

        let frame = renderer.render(&task(2, 20)).unwrap();
        assert_eq!(frame.index, 2);
        assert_eq!(frame.step.vehicle_action, Some(1));
        assert_eq!(frame.step.model_action, Some(2));
        assert!((frame.step.timestamp - 0.2).abs() < 1e-6);
        assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn undecodable_payload_is_an_error() {
        let (_dir, context) = context(ScriptedLoader::new(3));
        let mut renderer = FrameRenderer::new(&context).unwrap();
        let bad = FrameTask {
            index: 1,
            timestamp_ns: 0,
            payload: Bytes::from_static(&[0x00, 0x01, 0x00, 0x00, 0x01]),
        };
        assert!(matches!(renderer.render(&bad), Err(RenderError::Decode(_))));
    }

    #[test]
    fn panics_and_failures_drop_frames_and_the_pool_keeps_going() {
        let loader = ScriptedLoader::new(3).panic_on_level(30.0).fail_on_level(50.0);
        let (_dir, context) = context(loader);
        let (task_tx, task_rx) = crossbeam_channel::bounded(8);
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let (error_tx, error_rx) = crossbeam_channel::unbounded();
        let cancel = CancellationToken::new();

        let pool = WorkerPool::spawn(2, context, &task_rx, &result_tx, &error_tx, &cancel).unwrap();
        drop((task_rx, result_tx, error_tx));
        for (index, level) in [(1, 10), (2, 30), (3, 50), (4, 70)] {
            task_tx.send(task(index, level)).unwrap();
        }
        drop(task_tx);

        let mut messages: Vec<WorkerMessage> = result_rx.iter().collect();
        messages.sort_by_key(WorkerMessage::index);
        let dropped: Vec<u64> = messages
            .iter()
            .filter(|m| matches!(m, WorkerMessage::Dropped { .. }))
            .map(WorkerMessage::index)
            .collect();
        assert_eq!(messages.len(), 4);
        assert_eq!(dropped, vec![2, 3]);
        assert!(error_rx.try_recv().is_err());
        pool.join(Duration::from_secs(5));
    }

    #[test]
    fn setup_failure_is_reported_once_per_worker() {
        let loader = ScriptedLoader::new(3).failing();
        let loads = loader.loads.clone();
        let (_dir, context) = context(loader);
        let (_task_tx, task_rx) = crossbeam_channel::bounded::<FrameTask>(1);
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let (error_tx, error_rx) = crossbeam_channel::unbounded();

        let mut pool = WorkerPool::spawn(
            3,
            context,
            &task_rx,
            &result_tx,
            &error_tx,
            &CancellationToken::new(),
        )
        .unwrap();
        drop((result_tx, error_tx));

        let failures: Vec<WorkerFailure> = error_rx.iter().collect();
        assert_eq!(failures.len(), 3);
        assert!(result_rx.try_recv().is_err());
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 3);
        while pool.live_workers() > 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn in_flight_guard_reports_a_drop_when_abandoned() {
        let (tx, rx) = crossbeam_channel::unbounded();
        {
            let _guard = InFlight::new(7, &tx);
        }
        assert!(matches!(rx.try_recv(), Ok(WorkerMessage::Dropped { index: 7 })));

        let guard = InFlight::new(8, &tx);
        assert!(guard.complete(WorkerMessage::Dropped { index: 8 }));
        assert_eq!(rx.len(), 1);
    }
}
