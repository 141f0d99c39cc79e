use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::StorageError;

/// Object storage as seen by the batch orchestrator.
///
/// Both operations are idempotent and atomic for the caller: a target path
/// either holds the complete object or nothing.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetches `remote` into `local_dir` and returns the local path.
    async fn download(&self, remote: &str, local_dir: &Path) -> Result<PathBuf, StorageError>;

    /// Stores `local` under `remote` and returns the stored reference.
    async fn upload(&self, local: &Path, remote: &str) -> Result<String, StorageError>;
}

/// Storage backed by a directory tree. Objects may be files or directories.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, remote: &str) -> Result<PathBuf, StorageError> {
        let trimmed = remote.trim().trim_start_matches("file://");
        let relative = Path::new(trimmed);
        let clean = !trimmed.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !clean {
            return Err(StorageError::InvalidRef(remote.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn download(&self, remote: &str, local_dir: &Path) -> Result<PathBuf, StorageError> {
        let source = self.resolve(remote)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(StorageError::NotFound(remote.to_string()));
        }
        let name = source
            .file_name()
            .ok_or_else(|| StorageError::InvalidRef(remote.to_string()))?;
        let target = local_dir.join(name);

        let (src, dst) = (source.clone(), target.clone());
        let copied = tokio::task::spawn_blocking(move || -> std::io::Result<bool> {
            if dst.exists() && tree_size(&dst)? == tree_size(&src)? {
                return Ok(false);
            }
            std::fs::create_dir_all(dst.parent().unwrap_or(Path::new(".")))?;
            copy_atomic(&src, &dst)?;
            Ok(true)
        })
        .await
        .map_err(std::io::Error::other)??;

        if copied {
            tracing::info!("Downloaded {} to {}", remote, target.display());
        } else {
            tracing::debug!("{} already present at {}", remote, target.display());
        }
        Ok(target)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<String, StorageError> {
        let target = self.resolve(remote)?;
        if !tokio::fs::try_exists(local).await? {
            return Err(StorageError::NotFound(local.display().to_string()));
        }

        let (src, dst) = (local.to_path_buf(), target.clone());
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(dst.parent().unwrap_or(Path::new(".")))?;
            copy_atomic(&src, &dst)
        })
        .await
        .map_err(std::io::Error::other)??;

        tracing::info!("Uploaded {} to {}", local.display(), remote);
        Ok(remote.to_string())
    }
}

/// Total bytes of a file, or of every file under a directory.
fn tree_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(path) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Copies into a sibling temp path first, then renames over `dst`.
fn copy_atomic(src: &Path, dst: &Path) -> std::io::Result<()> {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = dst.with_file_name(format!(".{}.{}.partial", name, uuid::Uuid::new_v4()));

    let result = if src.is_dir() {
        copy_tree(src, &staging)
    } else {
        std::fs::copy(src, &staging).map(|_| ())
    };
    if let Err(e) = result {
        let _ = remove_any(&staging);
        return Err(e);
    }

    if dst.is_dir() {
        std::fs::remove_dir_all(dst)?;
    }
    std::fs::rename(&staging, dst)
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn remove_any(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("remote"));
        std::fs::create_dir_all(dir.path().join("remote/bags/run1")).unwrap();
        std::fs::write(dir.path().join("remote/bags/run1/run1_0.db3"), b"sqlite").unwrap();
        std::fs::write(dir.path().join("remote/model.tar.gz"), b"archive").unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn downloads_files_and_directories() {
        let (dir, storage) = storage();
        let local = dir.path().join("work");

        let model = storage.download("model.tar.gz", &local).await.unwrap();
        assert_eq!(model, local.join("model.tar.gz"));
        assert_eq!(std::fs::read(&model).unwrap(), b"archive");

        let bag = storage.download("bags/run1", &local).await.unwrap();
        assert_eq!(std::fs::read(bag.join("run1_0.db3")).unwrap(), b"sqlite");
    }

    #[tokio::test]
    async fn repeated_downloads_keep_same_size_copies() {
        let (dir, storage) = storage();
        let local = dir.path().join("work");
        let first = storage.download("model.tar.gz", &local).await.unwrap();
        let modified = std::fs::metadata(&first).unwrap().modified().unwrap();

        let second = storage.download("model.tar.gz", &local).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::metadata(&second).unwrap().modified().unwrap(), modified);
    }

    #[tokio::test]
    async fn uploads_create_parents_and_leave_no_staging_files() {
        let (dir, storage) = storage();
        let local = dir.path().join("out.mp4");
        std::fs::write(&local, b"video").unwrap();

        let remote = storage.upload(&local, "videos/event/out.mp4").await.unwrap();
        assert_eq!(remote, "videos/event/out.mp4");
        let stored = dir.path().join("remote/videos/event");
        assert_eq!(std::fs::read(stored.join("out.mp4")).unwrap(), b"video");
        assert_eq!(std::fs::read_dir(&stored).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn rejects_missing_and_escaping_references() {
        let (dir, storage) = storage();
        let local = dir.path().join("work");
        assert!(matches!(
            storage.download("nope.db3", &local).await,
            Err(StorageError::NotFound(_))
        ));
        for remote in ["../secret", "/etc/passwd", ""] {
            assert!(matches!(
                storage.download(remote, &local).await,
                Err(StorageError::InvalidRef(_))
            ));
        }
    }
}
