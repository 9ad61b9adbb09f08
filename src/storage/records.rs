//! Durable job records: one row per upload task, upserted by task id.
//!
//! Records are written when a task is paused or completed and listed per owner
//! for history and the dashboard. `JobRecordStore` decouples the wizard from
//! where the rows live (local SQLite or the MDC backend).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::UserProfile;
use crate::error::AppError;
use crate::storage::database::Database;

// ─────────────────────────────────────────────────────────────────────────────
// RecordStatus
// ─────────────────────────────────────────────────────────────────────────────

/// Integer status code stored with each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
pub enum RecordStatus {
    /// Paused by the user; can be resumed.
    Paused,
    /// The notebook run finished and the result was fetched.
    Completed,
}

impl RecordStatus {
    pub fn code(&self) -> i64 {
        match self {
            RecordStatus::Paused => 0,
            RecordStatus::Completed => 1,
        }
    }

    /// Unknown codes read back as `Paused`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => RecordStatus::Completed,
            _ => RecordStatus::Paused,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordStatus::Paused => "paused",
            RecordStatus::Completed => "completed",
        }
    }
}

impl From<RecordStatus> for i64 {
    fn from(status: RecordStatus) -> Self {
        status.code()
    }
}

impl From<i64> for RecordStatus {
    fn from(code: i64) -> Self {
        RecordStatus::from_code(code)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JobRecord
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted upload task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub task_id: String,
    pub file_name: String,
    /// Human-readable size, e.g. "1.50 MB".
    pub file_size: String,
    pub total_rows: u64,
    /// Catalog option value (e.g. "google_ads").
    pub selected_source: String,
    /// Data id sent to the notebook lookup (e.g. "Google").
    pub selected_source_id: String,
    pub current_step: usize,
    pub upload_completed: bool,
    pub status: RecordStatus,
    pub owner: UserProfile,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub sheet_name: Option<String>,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub updated_at: i64,
}

/// Returns current unix timestamp in seconds.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage Functions
// ─────────────────────────────────────────────────────────────────────────────

const RECORD_COLUMNS: &str = "task_id, file_name, file_size, total_rows, selected_source, \
     selected_source_id, current_step, upload_completed, status, owner_id, owner_username, \
     owner_email, file_path, sheet_name, created_at, updated_at";

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let total_rows: i64 = row.get(3)?;
    let current_step: i64 = row.get(6)?;
    let status: i64 = row.get(8)?;
    Ok(JobRecord {
        task_id: row.get(0)?,
        file_name: row.get(1)?,
        file_size: row.get(2)?,
        total_rows: total_rows.max(0) as u64,
        selected_source: row.get(4)?,
        selected_source_id: row.get(5)?,
        current_step: current_step.max(0) as usize,
        upload_completed: row.get(7)?,
        status: RecordStatus::from_code(status),
        owner: UserProfile {
            id: row.get(9)?,
            username: row.get(10)?,
            email: row.get(11)?,
        },
        file_path: row.get(12)?,
        sheet_name: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

/// Inserts a record or replaces the row with the same task id.
/// Preserves the original `created_at` on conflict.
pub async fn upsert_record(db: &Database, record: &JobRecord) -> Result<(), AppError> {
    let db_path = db.db_path().clone();
    let record = record.clone();

    tokio::task::spawn_blocking(move || {
        let conn = crate::storage::database::open_connection(&db_path)?;

        conn.execute(
            r#"
            INSERT INTO job_records (task_id, file_name, file_size, total_rows, selected_source,
                selected_source_id, current_step, upload_completed, status, owner_id,
                owner_username, owner_email, file_path, sheet_name, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(task_id) DO UPDATE SET
                file_name = excluded.file_name,
                file_size = excluded.file_size,
                total_rows = excluded.total_rows,
                selected_source = excluded.selected_source,
                selected_source_id = excluded.selected_source_id,
                current_step = excluded.current_step,
                upload_completed = excluded.upload_completed,
                status = excluded.status,
                owner_id = excluded.owner_id,
                owner_username = excluded.owner_username,
                owner_email = excluded.owner_email,
                file_path = excluded.file_path,
                sheet_name = excluded.sheet_name,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![
                record.task_id,
                record.file_name,
                record.file_size,
                record.total_rows as i64,
                record.selected_source,
                record.selected_source_id,
                record.current_step as i64,
                record.upload_completed,
                record.status.code(),
                record.owner.id,
                record.owner.username,
                record.owner.email,
                record.file_path,
                record.sheet_name,
                record.created_at,
                record.updated_at,
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to upsert job record: {e}")))?;

        Ok::<_, AppError>(())
    })
    .await
    .map_err(|e| AppError::Internal(format!("Upsert record task failed: {e}")))??;

    Ok(())
}

/// Gets a single record by task id.
pub async fn get_record(db: &Database, task_id: &str) -> Result<Option<JobRecord>, AppError> {
    let db_path = db.db_path().clone();
    let task_id = task_id.to_string();

    tokio::task::spawn_blocking(move || {
        let conn = crate::storage::database::open_connection(&db_path)?;

        let sql = format!("SELECT {RECORD_COLUMNS} FROM job_records WHERE task_id = ?1");
        conn.query_row(&sql, [&task_id], row_to_record)
            .optional()
            .map_err(|e| AppError::Storage(format!("Failed to query job record: {e}")))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Get record task failed: {e}")))?
}

/// Lists an owner's records, newest first.
pub async fn list_records_for_owner(db: &Database, owner_id: &str) -> Result<Vec<JobRecord>, AppError> {
    let db_path = db.db_path().clone();
    let owner_id = owner_id.to_string();

    tokio::task::spawn_blocking(move || {
        let conn = crate::storage::database::open_connection(&db_path)?;

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM job_records WHERE owner_id = ?1 \
             ORDER BY created_at DESC, updated_at DESC"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {e}")))?;

        let records = stmt
            .query_map([&owner_id], row_to_record)
            .map_err(|e| AppError::Storage(format!("Failed to query job records: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to collect job records: {e}")))?;

        Ok::<_, AppError>(records)
    })
    .await
    .map_err(|e| AppError::Internal(format!("List records task failed: {e}")))?
}

// ─────────────────────────────────────────────────────────────────────────────
// JobRecordStore Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Where job records are kept.
///
/// The wizard and the history/dashboard commands only see this trait; tests
/// provide an in-memory implementation.
pub trait JobRecordStore: Send + Sync {
    /// Upserts a record keyed by its task id.
    fn save<'a>(
        &'a self,
        record: &'a JobRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Lists an owner's records, newest first.
    fn list_for_owner<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<JobRecord>, AppError>> + Send + 'a>>;
}

/// Finds one of the owner's records by task id.
pub async fn find_record(
    store: &dyn JobRecordStore,
    owner_id: &str,
    task_id: &str,
) -> Result<JobRecord, AppError> {
    store
        .list_for_owner(owner_id)
        .await?
        .into_iter()
        .find(|r| r.task_id == task_id)
        .ok_or_else(|| AppError::NotFound(format!("No upload task with id {}", task_id)))
}

/// Record store backed by the local SQLite database.
#[derive(Debug, Clone)]
pub struct LocalRecordStore {
    db: Arc<Database>,
}

impl LocalRecordStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl JobRecordStore for LocalRecordStore {
    fn save<'a>(
        &'a self,
        record: &'a JobRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            upsert_record(&self.db, record).await?;
            info!(
                "[DB] Saved task {} as {}",
                record.task_id,
                record.status.label()
            );
            Ok(())
        })
    }

    fn list_for_owner<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<JobRecord>, AppError>> + Send + 'a>> {
        Box::pin(list_records_for_owner(&self.db, owner_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_db() -> (TempDir, Arc<Database>) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::init(temp_dir.path().join("records.db"))
            .await
            .expect("Failed to init DB");
        (temp_dir, Arc::new(db))
    }

    fn owner(id: &str) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            username: format!("user{id}"),
            email: format!("user{id}@mdc.io"),
        }
    }

    fn record(task_id: &str, owner_id: &str, created_at: i64) -> JobRecord {
        JobRecord {
            task_id: task_id.to_string(),
            file_name: "sales.xlsx".to_string(),
            file_size: "1.50 MB".to_string(),
            total_rows: 120,
            selected_source: "google_ads".to_string(),
            selected_source_id: "Google".to_string(),
            current_step: 4,
            upload_completed: true,
            status: RecordStatus::Paused,
            owner: owner(owner_id),
            file_path: Some("/data/sales.xlsx".to_string()),
            sheet_name: Some("Sheet1".to_string()),
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn status_codes_match_wire_values() {
        assert_eq!(RecordStatus::Paused.code(), 0);
        assert_eq!(RecordStatus::Completed.code(), 1);
        assert_eq!(RecordStatus::from_code(7), RecordStatus::Paused);
        assert_eq!(serde_json::to_value(RecordStatus::Completed).unwrap(), serde_json::json!(1));
    }

    #[tokio::test]
    async fn upsert_replaces_rather_than_duplicates() {
        let (_tmp, db) = test_db().await;

        let first = record("task-1", "7", 1_000);
        upsert_record(&db, &first).await.unwrap();

        let mut second = first.clone();
        second.status = RecordStatus::Completed;
        second.current_step = 5;
        second.created_at = 9_999;
        second.updated_at = 2_000;
        upsert_record(&db, &second).await.unwrap();

        let all = list_records_for_owner(&db, "7").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, RecordStatus::Completed);
        assert_eq!(all[0].current_step, 5);
        assert_eq!(all[0].created_at, 1_000, "created_at must be preserved");
        assert_eq!(all[0].updated_at, 2_000);
    }

    #[tokio::test]
    async fn list_is_per_owner_and_newest_first() {
        let (_tmp, db) = test_db().await;

        upsert_record(&db, &record("old", "7", 100)).await.unwrap();
        upsert_record(&db, &record("new", "7", 300)).await.unwrap();
        upsert_record(&db, &record("other", "8", 200)).await.unwrap();

        let mine = list_records_for_owner(&db, "7").await.unwrap();
        let ids: Vec<_> = mine.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn get_record_round_trips_all_fields() {
        let (_tmp, db) = test_db().await;
        let original = record("task-1", "7", 100);
        upsert_record(&db, &original).await.unwrap();

        let loaded = get_record(&db, "task-1").await.unwrap();
        assert_eq!(loaded, Some(original));
        assert_eq!(get_record(&db, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn local_store_find_record() {
        let (_tmp, db) = test_db().await;
        let store = LocalRecordStore::new(db);
        store.save(&record("task-1", "7", 100)).await.unwrap();

        let found = find_record(&store, "7", "task-1").await.unwrap();
        assert_eq!(found.task_id, "task-1");

        let missing = find_record(&store, "8", "task-1").await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
