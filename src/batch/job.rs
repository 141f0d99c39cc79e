use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::combine::GroupingMode;
use crate::error::JobError;

/// One batch request: bags to render plus shared options. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub event_id: String,
    pub entries: Vec<BagEntry>,
    #[serde(default)]
    pub options: JobOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BagEntry {
    /// Storage reference of the bag file or directory.
    pub bag: String,
    /// Storage reference of the model directory or archive.
    pub model: String,
    pub subject: String,
    /// Display name of the model; defaults to the model reference's file name.
    #[serde(default)]
    pub model_name: Option<String>,
}

impl BagEntry {
    pub fn model_label(&self) -> String {
        if let Some(name) = self.model_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        let file = self
            .model
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.model);
        file.trim_end_matches(".tar.gz")
            .trim_end_matches(".tgz")
            .to_string()
    }
}

/// Per-job overrides of the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    pub codec: Option<String>,
    pub frame_limit: Option<u64>,
    pub relative_labels: bool,
    /// Storage reference of a background image for frames and dividers.
    pub background: Option<String>,
    pub grouping: Option<GroupingMode>,
    pub vehicle: Option<String>,
    pub skip_duration_secs: Option<f64>,
    pub destination: Option<String>,
}

impl JobDescriptor {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, JobError> {
        let job: JobDescriptor = serde_json::from_slice(bytes)?;
        if job.entries.is_empty() {
            return Err(JobError::Empty);
        }
        Ok(job)
    }

    pub fn from_file(path: &Path) -> Result<Self, JobError> {
        Self::from_slice(&std::fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entries_and_defaults_options() {
        let job = JobDescriptor::from_slice(
            br#"{
                "event_id": "race-7",
                "entries": [
                    {"bag": "bags/run1", "model": "models/fast-v2.tar.gz", "subject": "ann"},
                    {"bag": "bags/run2", "model": "models/slow", "subject": "bob", "model_name": "Slow One"}
                ],
                "options": {"grouping": "subject", "frame_limit": 100}
            }"#,
        )
        .unwrap();

        assert_eq!(job.event_id, "race-7");
        assert_eq!(job.entries[0].model_label(), "fast-v2");
        assert_eq!(job.entries[1].model_label(), "Slow One");
        assert_eq!(job.options.grouping, Some(GroupingMode::Subject));
        assert_eq!(job.options.frame_limit, Some(100));
        assert!(!job.options.relative_labels);
    }

    #[test]
    fn empty_and_malformed_jobs_are_rejected() {
        assert!(matches!(
            JobDescriptor::from_slice(br#"{"event_id": "e", "entries": []}"#),
            Err(JobError::Empty)
        ));
        assert!(matches!(
            JobDescriptor::from_slice(b"{"),
            Err(JobError::Parse(_))
        ));
    }
}
