//! Batch runs: download, render every bag, combine per subject, upload and register.

pub mod context;
pub mod job;
pub mod orchestrator;

pub use context::{BatchContext, LoadedModel, ModelProvider, OnnxModels};
pub use job::{BagEntry, JobDescriptor, JobOptions};
pub use orchestrator::{BatchOrchestrator, UploadedVideo};
