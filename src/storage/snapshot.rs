//! Local wizard snapshot used to resume an in-progress task.
//!
//! The snapshot is a single JSON file. Writes go to a temporary file in the
//! same directory and are persisted with a rename, so a crash never leaves a
//! half-written snapshot behind.

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::pin::Pin;

use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::AppError;
use crate::workflow::task::UploadTask;

/// Persistence for the in-progress task.
pub trait SnapshotStore: Send + Sync {
    /// Replaces the stored snapshot.
    fn save<'a>(
        &'a self,
        task: &'a UploadTask,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Returns the stored snapshot, if any.
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Option<UploadTask>, AppError>> + Send + '_>>;

    /// Removes the stored snapshot. Clearing a missing snapshot succeeds.
    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + '_>>;
}

/// Snapshot kept in a JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

fn write_atomically(path: &PathBuf, contents: &[u8]) -> Result<(), AppError> {
    let parent_dir = path.parent().ok_or_else(|| {
        AppError::Storage(format!(
            "Cannot determine parent directory for: {}",
            path.display()
        ))
    })?;
    std::fs::create_dir_all(parent_dir)
        .map_err(|e| AppError::Storage(format!("Failed to create snapshot directory: {}", e)))?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .map_err(|e| AppError::Storage(format!("Failed to create temporary file: {}", e)))?;
    temp_file
        .write_all(contents)
        .map_err(|e| AppError::Storage(format!("Failed to write snapshot: {}", e)))?;
    temp_file
        .persist(path)
        .map_err(|e| AppError::Storage(format!("Failed to persist snapshot: {}", e.error)))?;

    Ok(())
}

impl SnapshotStore for FileSnapshotStore {
    fn save<'a>(
        &'a self,
        task: &'a UploadTask,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            let json = serde_json::to_vec_pretty(task)
                .map_err(|e| AppError::Internal(format!("Failed to serialize snapshot: {}", e)))?;
            let path = self.path.clone();

            tokio::task::spawn_blocking(move || write_atomically(&path, &json))
                .await
                .map_err(|e| AppError::Internal(format!("Snapshot write task failed: {}", e)))?
        })
    }

    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Option<UploadTask>, AppError>> + Send + '_>> {
        Box::pin(async move {
            let bytes = match tokio::fs::read(&self.path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(AppError::Storage(format!("Failed to read snapshot: {}", e))),
            };

            match serde_json::from_slice::<UploadTask>(&bytes) {
                Ok(task) => Ok(Some(task)),
                Err(e) => {
                    warn!("[WIZARD] Ignoring unreadable snapshot: {}", e);
                    Ok(None)
                }
            }
        })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + '_>> {
        Box::pin(async move {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(AppError::Storage(format!("Failed to remove snapshot: {}", e))),
            }
        })
    }
}
