//! Atomic CSV export of a dataset.
//!
//! Writes to a temporary file in the same directory as the destination,
//! then atomically replaces the destination on `finish()`. If dropped
//! before finishing, the temporary file is automatically cleaned up.

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::Writer;
use tempfile::NamedTempFile;

use crate::error::AppError;
use crate::sheet::dataset::{cell_text, Dataset};

/// An atomic CSV writer.
pub struct AtomicCsvWriter {
    writer: Writer<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
}

impl AtomicCsvWriter {
    /// Creates a writer whose temporary file lives next to `final_path`.
    pub fn new(final_path: impl AsRef<Path>) -> Result<Self, AppError> {
        let final_path = final_path.as_ref().to_path_buf();

        let parent_dir = match final_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            Some(_) => PathBuf::from("."),
            None => {
                return Err(AppError::Storage(format!(
                    "Cannot determine parent directory for: {}",
                    final_path.display()
                )))
            }
        };

        let temp_file = NamedTempFile::new_in(&parent_dir)
            .map_err(|e| AppError::Storage(format!("Failed to create temporary file: {}", e)))?;

        Ok(Self {
            writer: Writer::from_writer(BufWriter::new(temp_file)),
            final_path,
        })
    }

    pub fn writer_mut(&mut self) -> &mut Writer<BufWriter<NamedTempFile>> {
        &mut self.writer
    }

    /// Flushes and atomically persists the file. Returns the final path.
    pub fn finish(self) -> Result<PathBuf, AppError> {
        let buf_writer = self.writer.into_inner().map_err(|e| {
            AppError::Storage(format!("Failed to flush CSV writer: {}", e.error()))
        })?;

        let named_temp = buf_writer
            .into_inner()
            .map_err(|e| AppError::Storage(format!("Failed to flush buffer: {}", e.error())))?;

        named_temp.persist(&self.final_path).map_err(|e| {
            AppError::Storage(format!(
                "Failed to persist file to {}: {}",
                self.final_path.display(),
                e.error
            ))
        })?;

        Ok(self.final_path)
    }
}

fn write_dataset_blocking(path: &Path, dataset: &Dataset) -> Result<PathBuf, AppError> {
    let mut writer = AtomicCsvWriter::new(path)?;

    writer
        .writer_mut()
        .write_record(dataset.columns())
        .map_err(|e| AppError::Storage(format!("Failed to write CSV header: {}", e)))?;

    for row in dataset.rows() {
        let fields: Vec<String> = dataset
            .columns()
            .iter()
            .map(|column| row.get(column).map(cell_text).unwrap_or_default())
            .collect();
        writer
            .writer_mut()
            .write_record(&fields)
            .map_err(|e| AppError::Storage(format!("Failed to write CSV record: {}", e)))?;
    }

    writer.finish()
}

/// Writes `dataset` as CSV to `path` on a blocking thread.
pub async fn write_dataset(path: &Path, dataset: &Dataset) -> Result<PathBuf, AppError> {
    let path = path.to_owned();
    let dataset = dataset.clone();
    tokio::task::spawn_blocking(move || write_dataset_blocking(&path, &dataset))
        .await
        .map_err(|e| AppError::Internal(format!("Export task failed: {}", e)))?
}
