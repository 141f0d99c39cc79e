//! Single-bag rendering: frame source, render worker pool and the ordering sequencer.

pub mod describe;
pub mod runner;
pub mod sequencer;
pub mod sink;
pub mod source;
pub mod types;
pub mod worker;

pub use describe::StepSummary;
pub use runner::{
    render_frames, render_session, render_video, run_render, RenderOptions, RenderOptionsBuilder,
    RenderOutcome,
};
pub use sequencer::{Sequencer, SequencerReport, SequencerSettings};
pub use sink::{FrameSink, VideoSink};
pub use types::{FrameTask, RenderedFrame, Step, WorkerMessage};
pub use worker::{FrameRenderer, WorkerContext, WorkerPool};
