use std::path::PathBuf;

use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Bag error: {0}")]
    Bag(#[from] BagError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Combine error: {0}")]
    Combine(#[from] CombineError),
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Job error: {0}")]
    Job(#[from] JobError),
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid argument: {0}")]
    Usage(String),
}

impl AppError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Usage(_) | AppError::Job(_) => 2,
            AppError::Bag(_) | AppError::Model(_) => 3,
            AppError::Pipeline(PipelineError::Cancelled)
            | AppError::Combine(CombineError::Cancelled) => 130,
            AppError::Pipeline(PipelineError::Bag(_) | PipelineError::Model(_)) => 3,
            AppError::Pipeline(_) | AppError::Combine(_) | AppError::Media(_) => 4,
            AppError::Storage(_) | AppError::Join(_) | AppError::Io(_) => 1,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum CdrError {
    #[error("Unexpected end of payload at offset {offset}, needed {needed} bytes")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("Unknown CDR encapsulation {0:#04x} {1:#04x}")]
    InvalidEncapsulation(u8, u8),
    #[error("String at offset {0} is not valid UTF-8")]
    InvalidString(usize),
    #[error("Sequence length {0} exceeds remaining payload")]
    SequenceTooLong(u32),
}

#[derive(Error, Debug)]
pub enum BagError {
    #[error("Bag not found: {0}")]
    NotFound(PathBuf),
    #[error("No .db3 storage file inside bag directory {0}")]
    NoStorage(PathBuf),
    #[error("Topic {0} not present in bag")]
    TopicNotFound(String),
    #[error("Bag {0} contains no messages on the selected topic")]
    Empty(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to decode message: {0}")]
    Cdr(#[from] CdrError),
    #[error("Message carries no camera image")]
    NoImage,
    #[error("Unsupported image payload ({encoding}, {width}x{height}, {len} bytes)")]
    BadImage {
        encoding: String,
        width: u32,
        height: u32,
        len: usize,
    },
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model path not found: {0}")]
    NotFound(PathBuf),
    #[error("model_metadata.json missing under {0}")]
    MetadataMissing(PathBuf),
    #[error("Model weights (.onnx) missing under {0}")]
    WeightsMissing(PathBuf),
    #[error("Invalid model metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("Failed to unpack model archive: {0}")]
    Archive(std::io::Error),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Inference runtime error: {0}")]
    Runtime(#[from] ort::Error),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to decode frame: {0}")]
    Decode(#[from] BagError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Render panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),
    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("Failed to parse ffprobe output: {0}")]
    Parse(String),
    #[error("Video file not found: {0}")]
    VideoNotFound(PathBuf),
    #[error("Frame is {got_width}x{got_height}, writer expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Bag error: {0}")]
    Bag(#[from] BagError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
    #[error("{count} worker errors exceed the threshold of {threshold}")]
    TooManyWorkerErrors { count: usize, threshold: usize },
    #[error("All workers exited with {remaining} frames outstanding")]
    WorkersExited { remaining: u64 },
    #[error("Failed to spawn thread: {0}")]
    Spawn(std::io::Error),
    #[error("Render cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum CombineError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
    #[error("Cannot parse clip name {0}")]
    ClipName(String),
    #[error("Failed to load divider background: {0}")]
    Background(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Combine cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Remote object not found: {0}")]
    NotFound(String),
    #[error("Invalid remote reference: {0}")]
    InvalidRef(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Catalog returned errors: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid job description: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Job has no entries")]
    Empty,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_input_from_pipeline_failures() {
        let missing = AppError::Bag(BagError::NotFound(PathBuf::from("x.db3")));
        assert_eq!(missing.exit_code(), 3);

        let abort = AppError::Pipeline(PipelineError::TooManyWorkerErrors {
            count: 3,
            threshold: 2,
        });
        assert_eq!(abort.exit_code(), 4);

        assert_eq!(AppError::Pipeline(PipelineError::Cancelled).exit_code(), 130);
        assert_eq!(AppError::Usage("bad".into()).exit_code(), 2);
    }
}
