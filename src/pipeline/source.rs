use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{SendTimeoutError, Sender};
use tokio_util::sync::CancellationToken;

use super::types::FrameTask;
use crate::bag::BagReader;
use crate::error::{BagError, PipelineError};

/// Reads the bag in timestamp order and queues one task per message, indexes from 1.
///
/// Returns the number of tasks queued. Stops early when `cancel` trips or every
/// receiver is gone. Dropping `tasks` on return closes the queue for the workers.
pub fn read_frames(
    bag: &Path,
    topic: &str,
    limit: Option<u64>,
    tasks: Sender<FrameTask>,
    cancel: &CancellationToken,
    poll_interval: Duration,
) -> Result<u64, BagError> {
    let reader = BagReader::open(bag, topic)?;
    let mut emitted = 0u64;

    reader.for_each(limit, |message| {
        let mut task = FrameTask {
            index: emitted + 1,
            timestamp_ns: message.timestamp_ns,
            payload: Bytes::from(message.data),
        };
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            match tasks.send_timeout(task, poll_interval) {
                Ok(()) => {
                    emitted += 1;
                    return true;
                }
                Err(SendTimeoutError::Timeout(returned)) => task = returned,
                Err(SendTimeoutError::Disconnected(_)) => {
                    tracing::debug!("Task queue closed, frame source stopping");
                    return false;
                }
            }
        }
    })?;

    tracing::debug!("Frame source queued {} tasks", emitted);
    Ok(emitted)
}

pub fn spawn_source(
    bag: PathBuf,
    topic: String,
    limit: Option<u64>,
    tasks: Sender<FrameTask>,
    cancel: CancellationToken,
    poll_interval: Duration,
) -> Result<JoinHandle<Result<u64, BagError>>, PipelineError> {
    std::thread::Builder::new()
        .name("bagviz-source".into())
        .spawn(move || read_frames(&bag, &topic, limit, tasks, &cancel, poll_interval))
        .map_err(PipelineError::Spawn)
}
