pub mod bag;
pub mod batch;
pub mod collab;
pub mod combine;
pub mod config;
pub mod error;
pub mod media;
pub mod model;
pub mod pipeline;
pub mod render;

pub use error::{AppError, BagError, CombineError, MediaError, ModelError, PipelineError};

pub use bag::{analyze_bag, BagInfo};
pub use batch::{BatchContext, BatchOrchestrator, JobDescriptor};
pub use combine::{CombineOptions, GroupingMode, VideoCombiner};
pub use config::Configuration;
pub use pipeline::{run_render, RenderOptions, RenderOutcome};
