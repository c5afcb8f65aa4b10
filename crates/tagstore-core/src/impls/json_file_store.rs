//! JsonFileTaskStore - JSON ファイルを正本とする TaskStore
//!
//! Writes go to a sibling temp file first and are then renamed over the
//! target, so readers see either the old or the new document, never a
//! partial one. Each write gets its own temp file; concurrent writers never
//! share one.

use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::domain::{StoreError, TaggedStore};
use crate::ports::TaskStore;

pub struct JsonFileTaskStore {
    path: PathBuf,
}

impl JsonFileTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `path` with `suffix` appended to its file name.
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "tasks.json".into());
    name.push(suffix);
    path.with_file_name(name)
}

/// Temp file for one write: `<name>.<ulid>.tmp` next to `path`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    sibling_path(path, &format!(".{}.tmp", Ulid::new()))
}

/// Write `bytes` to `path` through a temp file of its own and a rename.
/// Creates the parent directory when missing. The temp file is removed when
/// the write fails.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    let temp = temp_path(path);
    let written = match tokio::fs::write(&temp, bytes).await {
        Ok(()) => tokio::fs::rename(&temp, path)
            .await
            .map_err(|e| StoreError::io(path, e)),
        Err(e) => Err(StoreError::io(&temp, e)),
    };
    if written.is_err()
        && let Err(e) = tokio::fs::remove_file(&temp).await
        && e.kind() != IoErrorKind::NotFound
    {
        warn!(temp = %temp.display(), error = %e, "could not remove temp file");
    }
    written
}

#[async_trait]
impl TaskStore for JsonFileTaskStore {
    async fn read(&self) -> Result<TaggedStore, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptDocument {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    async fn write(&self, store: &TaggedStore) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec_pretty(store)?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes).await?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "tasks document written");
        Ok(())
    }
}

/// Whether an error from [`JsonFileTaskStore::read`] means the file is simply
/// not there yet.
pub fn is_missing_file(err: &StoreError) -> bool {
    matches!(err, StoreError::Io { source, .. } if source.kind() == IoErrorKind::NotFound)
}
