use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::TempDir;
use walkdir::WalkDir;

use super::metadata::{ModelMetadata, METADATA_FILE};
use crate::error::ModelError;

/// A resolved model package: metadata plus the path of the ONNX weights.
///
/// Packages are either a directory or a `.tar.gz` archive. Archives are
/// unpacked into a temporary directory that lives as long as the package.
#[derive(Debug)]
pub struct ModelPackage {
    pub root: PathBuf,
    pub metadata: ModelMetadata,
    pub weights: PathBuf,
    _unpacked: Option<TempDir>,
}

impl ModelPackage {
    pub fn open(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }

        let (root, unpacked) = if path.is_dir() {
            (path.to_path_buf(), None)
        } else if is_archive(path) {
            let dir = unpack(path)?;
            (dir.path().to_path_buf(), Some(dir))
        } else {
            return Err(ModelError::MetadataMissing(path.to_path_buf()));
        };

        let metadata_path = find_file(&root, |p| {
            p.file_name().is_some_and(|name| name == METADATA_FILE)
        })
        .ok_or_else(|| ModelError::MetadataMissing(root.clone()))?;
        let weights = find_file(&root, |p| p.extension().is_some_and(|ext| ext == "onnx"))
            .ok_or_else(|| ModelError::WeightsMissing(root.clone()))?;

        let bytes = std::fs::read(&metadata_path).map_err(ModelError::Archive)?;
        let metadata = ModelMetadata::from_slice(&bytes)?;

        tracing::info!(
            "Loaded model package {} ({} actions, sensors {:?})",
            path.display(),
            metadata.action_count(),
            metadata.sensor
        );

        Ok(Self {
            root,
            metadata,
            weights,
            _unpacked: unpacked,
        })
    }
}

fn is_archive(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

fn unpack(path: &Path) -> Result<TempDir, ModelError> {
    let dir = tempfile::Builder::new()
        .prefix("bagviz-model-")
        .tempdir()
        .map_err(ModelError::Archive)?;
    let file = File::open(path).map_err(ModelError::Archive)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.unpack(dir.path()).map_err(ModelError::Archive)?;
    tracing::debug!("Unpacked {} into {}", path.display(), dir.path().display());
    Ok(dir)
}

/// First matching file in path order, so lookups are deterministic.
fn find_file(root: &Path, matches: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .find(|p| matches(p))
}
