use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crossbeam_channel::{never, select, Receiver};
use tokio_util::sync::CancellationToken;

use super::sink::FrameSink;
use super::types::{Step, WorkerFailure, WorkerMessage};
use super::worker::WorkerMonitor;
use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct SequencerSettings {
    pub total: u64,
    /// Worker setup errors tolerated before aborting.
    pub max_worker_errors: usize,
    pub poll_interval: Duration,
    /// Log progress every this many written frames; zero disables it.
    pub progress_every: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SequencerReport {
    pub steps: Vec<Step>,
    pub written: u64,
    pub dropped: u64,
    pub worker_errors: usize,
}

struct Pending(WorkerMessage);

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.0.index() == other.0.index()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.index().cmp(&other.0.index())
    }
}

/// Reorders worker results by index and hands them to the sink strictly in
/// ascending order. Dropped frames advance the cursor without being written.
pub struct Sequencer {
    settings: SequencerSettings,
    heap: BinaryHeap<Reverse<Pending>>,
    expected: u64,
    report: SequencerReport,
    started: Instant,
}

impl Sequencer {
    pub fn new(settings: SequencerSettings) -> Self {
        Self {
            heap: BinaryHeap::new(),
            expected: 1,
            report: SequencerReport {
                steps: Vec::with_capacity(settings.total.min(1 << 16) as usize),
                ..SequencerReport::default()
            },
            started: Instant::now(),
            settings,
        }
    }

    fn done(&self) -> bool {
        self.expected > self.settings.total
    }

    fn outstanding(&self) -> u64 {
        (self.settings.total + 1).saturating_sub(self.expected)
    }

    pub fn run<S: FrameSink + ?Sized>(
        mut self,
        results: &Receiver<WorkerMessage>,
        errors: &Receiver<WorkerFailure>,
        sink: &mut S,
        monitor: &mut dyn WorkerMonitor,
        cancel: &CancellationToken,
    ) -> Result<SequencerReport, PipelineError> {
        let no_errors = never::<WorkerFailure>();
        let mut errors_open = true;

        while !self.done() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let errors = if errors_open { errors } else { &no_errors };

            select! {
                recv(results) -> message => match message {
                    Ok(message) => {
                        self.heap.push(Reverse(Pending(message)));
                        self.flush(sink)?;
                    }
                    Err(_) => self.check_workers(results, errors, sink, monitor, true)?,
                },
                recv(errors) -> failure => match failure {
                    Ok(failure) => self.record_failure(failure)?,
                    Err(_) => errors_open = false,
                },
                default(self.settings.poll_interval) => {
                    self.check_workers(results, errors, sink, monitor, false)?
                }
            }
        }

        tracing::info!(
            "Sequenced {} frames ({} written, {} dropped) in {:.1}s",
            self.settings.total,
            self.report.written,
            self.report.dropped,
            self.started.elapsed().as_secs_f64()
        );
        Ok(self.report)
    }

    fn flush<S: FrameSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), PipelineError> {
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(pending)| pending.0.index() <= self.expected)
        {
            let Some(Reverse(Pending(message))) = self.heap.pop() else {
                break;
            };
            if message.index() < self.expected {
                tracing::warn!("Ignoring duplicate result for frame {}", message.index());
                continue;
            }
            match message {
                WorkerMessage::Rendered(frame) => {
                    sink.write(&frame)?;
                    self.report.steps.push(frame.step);
                    self.report.written += 1;
                    self.log_progress();
                }
                WorkerMessage::Dropped { index } => {
                    tracing::warn!("Frame {} dropped", index);
                    self.report.dropped += 1;
                }
            }
            self.expected += 1;
        }
        Ok(())
    }

    fn log_progress(&self) {
        let every = self.settings.progress_every;
        if every == 0 || self.report.written % every != 0 {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64().max(1e-6);
        tracing::info!(
            "Progress {}/{} frames, {} buffered, {:.1} fps",
            self.expected,
            self.settings.total,
            self.heap.len(),
            self.report.written as f64 / elapsed
        );
    }

    fn record_failure(&mut self, failure: WorkerFailure) -> Result<(), PipelineError> {
        self.report.worker_errors += 1;
        tracing::error!("Worker {} failed: {}", failure.worker, failure.message);
        if self.report.worker_errors > self.settings.max_worker_errors {
            return Err(PipelineError::TooManyWorkerErrors {
                count: self.report.worker_errors,
                threshold: self.settings.max_worker_errors,
            });
        }
        Ok(())
    }

    /// Aborts once no worker is left to produce the outstanding frames. Results
    /// published before the last worker exited are sequenced first, then queued
    /// failures are counted so a setup error outranks the exit.
    fn check_workers<S: FrameSink + ?Sized>(
        &mut self,
        results: &Receiver<WorkerMessage>,
        errors: &Receiver<WorkerFailure>,
        sink: &mut S,
        monitor: &mut dyn WorkerMonitor,
        disconnected: bool,
    ) -> Result<(), PipelineError> {
        if self.done() {
            return Ok(());
        }
        if disconnected || monitor.live_workers() == 0 {
            while let Ok(message) = results.try_recv() {
                self.heap.push(Reverse(Pending(message)));
            }
            self.flush(sink)?;
            if self.done() {
                return Ok(());
            }
            while let Ok(failure) = errors.try_recv() {
                self.record_failure(failure)?;
            }
            return Err(PipelineError::WorkersExited {
                remaining: self.outstanding(),
            });
        }
        Ok(())
    }
}
