//! The upload task: the wizard's persistent state.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::UserProfile;
use crate::error::AppError;
use crate::storage::records::{JobRecord, RecordStatus};
use crate::workflow::step::Step;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// "1.50 MB" above one mebibyte, "12.00 KB" otherwise.
pub fn format_file_size(bytes: u64) -> String {
    let size = bytes as f64;
    if size > MIB {
        format!("{:.2} MB", size / MIB)
    } else {
        format!("{:.2} KB", size / KIB)
    }
}

/// Everything needed to resume a wizard.
///
/// This is what the snapshot file holds and what a job record is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    pub task_id: String,
    #[serde(default)]
    pub file_name: String,
    /// Display string produced by `format_file_size`.
    #[serde(default)]
    pub file_size: String,
    #[serde(default)]
    pub total_rows: u64,
    /// Catalog option value, or the raw input if it is not in the catalog.
    #[serde(default)]
    pub selected_source: String,
    #[serde(default)]
    pub selected_source_id: String,
    #[serde(rename = "currentStepIndex")]
    pub current_step: usize,
    #[serde(default)]
    pub upload_completed: bool,
    #[serde(default)]
    pub owner: Option<UserProfile>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub sheet_name: Option<String>,
}

impl Default for UploadTask {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadTask {
    /// An empty task at step 0 with a fresh id.
    pub fn new() -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            file_name: String::new(),
            file_size: String::new(),
            total_rows: 0,
            selected_source: String::new(),
            selected_source_id: String::new(),
            current_step: 0,
            upload_completed: false,
            owner: None,
            file_path: None,
            sheet_name: None,
        }
    }

    pub fn step(&self) -> Step {
        Step::clamped(self.current_step)
    }

    pub fn has_file(&self) -> bool {
        !self.file_name.is_empty()
    }

    pub fn has_source(&self) -> bool {
        !self.selected_source_id.is_empty()
    }

    /// Builds the durable record for this task.
    ///
    /// # Errors
    /// `NotAuthenticated` when the task has no owner.
    pub fn to_record(&self, status: RecordStatus, now: i64) -> Result<JobRecord, AppError> {
        let owner = self.owner.clone().ok_or(AppError::NotAuthenticated)?;
        Ok(JobRecord {
            task_id: self.task_id.clone(),
            file_name: self.file_name.clone(),
            file_size: self.file_size.clone(),
            total_rows: self.total_rows,
            selected_source: self.selected_source.clone(),
            selected_source_id: self.selected_source_id.clone(),
            current_step: self.step().index(),
            upload_completed: self.upload_completed,
            status,
            owner,
            file_path: self
                .file_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            sheet_name: self.sheet_name.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds a task from a stored record.
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            task_id: record.task_id.clone(),
            file_name: record.file_name.clone(),
            file_size: record.file_size.clone(),
            total_rows: record.total_rows,
            selected_source: record.selected_source.clone(),
            selected_source_id: record.selected_source_id.clone(),
            current_step: Step::clamped(record.current_step).index(),
            upload_completed: record.upload_completed,
            owner: Some(record.owner.clone()),
            file_path: record.file_path.as_ref().map(PathBuf::from),
            sheet_name: record.sheet_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_size_switches_unit_above_one_mebibyte() {
        assert_eq!(format_file_size(0), "0.00 KB");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(1024 * 1024), "1024.00 KB");
        assert_eq!(format_file_size(1024 * 1024 * 3 / 2), "1.50 MB");
    }

    #[test]
    fn new_tasks_get_distinct_ids() {
        let a = UploadTask::new();
        let b = UploadTask::new();

        assert_ne!(a.task_id, b.task_id);
        assert_eq!(a.step(), Step::FIRST);
        assert!(!a.upload_completed);
    }

    #[test]
    fn snapshot_json_uses_camel_case_keys() {
        let mut task = UploadTask::new();
        task.current_step = 2;
        task.selected_source_id = "Google".to_string();

        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["currentStepIndex"], 2);
        assert_eq!(json["selectedSourceId"], "Google");
        assert!(json.get("uploadCompleted").is_some());
    }

    #[test]
    fn to_record_requires_owner() {
        let task = UploadTask::new();

        let result = task.to_record(RecordStatus::Paused, 0);

        assert!(matches!(result, Err(AppError::NotAuthenticated)));
    }

    #[test]
    fn record_conversion_keeps_progress_fields() {
        let mut task = UploadTask::new();
        task.file_name = "sales.xlsx".to_string();
        task.current_step = 4;
        task.upload_completed = true;
        task.owner = Some(UserProfile {
            id: "7".to_string(),
            username: "ana".to_string(),
            email: "ana@mdc.io".to_string(),
        });
        task.file_path = Some(PathBuf::from("/data/sales.xlsx"));

        let record = task.to_record(RecordStatus::Paused, 50).unwrap();
        assert_eq!(record.current_step, 4);
        assert_eq!(record.status, RecordStatus::Paused);
        assert_eq!(record.file_path.as_deref(), Some("/data/sales.xlsx"));

        let back = UploadTask::from_record(&record);
        assert_eq!(back, task);
    }
}
