use bytes::Bytes;
use serde::Serialize;

use crate::model::attention::argmax;

/// One raw bag message queued for rendering. Indexes start at 1 and are dense.
#[derive(Debug, Clone)]
pub struct FrameTask {
    pub index: u64,
    pub timestamp_ns: i64,
    pub payload: Bytes,
}

/// What the vehicle chose and what the re-run model chose for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub index: u64,
    /// Seconds since the start of the bag.
    pub timestamp: f64,
    pub vehicle_action: Option<usize>,
    pub vehicle_probabilities: Vec<f32>,
    pub model_action: Option<usize>,
    pub model_probabilities: Vec<f32>,
}

impl Step {
    pub fn new(
        index: u64,
        timestamp: f64,
        vehicle_probabilities: Vec<f32>,
        model_probabilities: Vec<f32>,
    ) -> Self {
        Self {
            index,
            timestamp,
            vehicle_action: argmax(&vehicle_probabilities),
            vehicle_probabilities,
            model_action: argmax(&model_probabilities),
            model_probabilities,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub index: u64,
    pub step: Step,
    pub jpeg: Bytes,
}

/// Result channel payload. A dropped frame still advances the sequencer.
#[derive(Debug)]
pub enum WorkerMessage {
    Rendered(RenderedFrame),
    Dropped { index: u64 },
}

impl WorkerMessage {
    pub fn index(&self) -> u64 {
        match self {
            WorkerMessage::Rendered(frame) => frame.index,
            WorkerMessage::Dropped { index } => *index,
        }
    }
}

/// Setup failure reported once by a worker before it exits.
#[derive(Debug)]
pub struct WorkerFailure {
    pub worker: usize,
    pub message: String,
}
