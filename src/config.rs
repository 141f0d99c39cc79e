use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::combine::GroupingMode;

const DEFAULT_CONFIG_FILE: &str = "bagviz.toml";
const ENV_PREFIX: &str = "BAGVIZ";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub render: RenderSettings,
    pub combine: CombineSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
    /// Zero means one worker per available core, minus one for the sequencer.
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub poll_interval_ms: u64,
    pub max_worker_errors: usize,
    pub attention_patch: u32,
    pub topic: String,
    pub codec: String,
    pub background_image: Option<PathBuf>,
    pub join_timeout_secs: u64,
    pub progress_every: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            jpeg_quality: 90,
            worker_count: 0,
            queue_capacity: 64,
            poll_interval_ms: 100,
            max_worker_errors: 0,
            attention_patch: 16,
            topic: "/inference_pkg/rl_results".to_string(),
            codec: "avc1".to_string(),
            background_image: None,
            join_timeout_secs: 10,
            progress_every: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CombineSettings {
    pub divider_seconds: f64,
    pub skip_duration_secs: f64,
    pub grouping: GroupingMode,
    pub divider_background: Option<PathBuf>,
}

impl Default for CombineSettings {
    fn default() -> Self {
        Self {
            divider_seconds: 2.0,
            skip_duration_secs: 20.0,
            grouping: GroupingMode::SubjectModelDate,
            divider_background: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub work_dir: PathBuf,
    pub storage_root: PathBuf,
    pub destination: String,
    pub catalog_endpoint: Option<String>,
    pub catalog_api_key: Option<String>,
    pub catalog_timeout_secs: u64,
    pub spool_dir: PathBuf,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("bagviz"),
            storage_root: PathBuf::from("storage"),
            destination: "videos".to_string(),
            catalog_endpoint: None,
            catalog_api_key: None,
            catalog_timeout_secs: 10,
            spool_dir: PathBuf::from("spool"),
        }
    }
}

impl Configuration {
    /// Layers defaults, an optional TOML file and `BAGVIZ__SECTION__KEY` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[render]\nworker_count = 3\ncodec = \"mp4v\"").unwrap();

        let configuration = Configuration::load(Some(file.path())).unwrap();
        assert_eq!(configuration.render.worker_count, 3);
        assert_eq!(configuration.render.codec, "mp4v");
        assert_eq!(configuration.render.width, 1280);
        assert_eq!(configuration.combine.grouping, GroupingMode::SubjectModelDate);
        assert_eq!(configuration.combine.skip_duration_secs, 20.0);
    }

    #[test]
    fn grouping_mode_reads_kebab_case() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[combine]\ngrouping = \"subject-model\"").unwrap();

        let configuration = Configuration::load(Some(file.path())).unwrap();
        assert_eq!(configuration.combine.grouping, GroupingMode::SubjectModel);
    }
}
