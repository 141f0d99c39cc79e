use std::path::PathBuf;

use async_trait::async_trait;

use crate::batch::JobDescriptor;
use crate::error::JobError;

/// Hands a job to the batch queue. Submission is never polled for completion.
#[async_trait]
pub trait BatchSubmitter: Send + Sync {
    async fn submit_batch_job(&self, job: &JobDescriptor) -> Result<String, JobError>;
}

/// Queues jobs as `{uuid}.json` files in a spool directory.
#[derive(Debug, Clone)]
pub struct SpoolSubmitter {
    dir: PathBuf,
}

impl SpoolSubmitter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BatchSubmitter for SpoolSubmitter {
    async fn submit_batch_job(&self, job: &JobDescriptor) -> Result<String, JobError> {
        let id = uuid::Uuid::new_v4().to_string();
        let json = serde_json::to_vec_pretty(job)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let staging = self.dir.join(format!(".{id}.json.partial"));
        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, self.dir.join(format!("{id}.json"))).await?;

        tracing::info!(
            "Submitted job {} for event {} ({} entries)",
            id,
            job.event_id,
            job.entries.len()
        );
        Ok(id)
    }
}
