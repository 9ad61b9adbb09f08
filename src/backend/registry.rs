//! Job records kept by the MDC backend's notebook registry.

use std::future::Future;
use std::pin::Pin;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::auth::id_from_number_or_string;
use crate::backend::{BackendClient, UserProfile};
use crate::error::AppError;
use crate::http::{error_from_response, redact_id};
use crate::storage::records::{JobRecord, JobRecordStore, RecordStatus};

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /api/databricks/register-notebook`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterNotebookRequest<'a> {
    task_id: &'a str,
    file_name: &'a str,
    selected_option: &'a str,
    selected_data_id: &'a str,
    current_step: usize,
    upload_completed: bool,
    status: i64,
    id: &'a str,
    username: &'a str,
    email: &'a str,
    #[serde(rename = "filesize")]
    file_size: &'a str,
    #[serde(rename = "total_rows")]
    total_rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sheet_name: Option<&'a str>,
}

impl<'a> From<&'a JobRecord> for RegisterNotebookRequest<'a> {
    fn from(record: &'a JobRecord) -> Self {
        Self {
            task_id: &record.task_id,
            file_name: &record.file_name,
            selected_option: &record.selected_source,
            selected_data_id: &record.selected_source_id,
            current_step: record.current_step,
            upload_completed: record.upload_completed,
            status: record.status.code(),
            id: &record.owner.id,
            username: &record.owner.username,
            email: &record.owner.email,
            file_size: &record.file_size,
            total_rows: record.total_rows,
            file_path: record.file_path.as_deref(),
            sheet_name: record.sheet_name.as_deref(),
        }
    }
}

/// One row of `GET /api/databricks/user-notebooks/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotebookRow {
    task_id: String,
    file_name: String,
    selected_option: String,
    selected_data_id: String,
    current_step: usize,
    upload_completed: bool,
    #[serde(default)]
    status: i64,
    #[serde(deserialize_with = "id_from_number_or_string")]
    user_id: String,
    username: String,
    email: String,
    #[serde(default, rename = "filesize")]
    file_size: Option<String>,
    #[serde(default, rename = "total_rows")]
    total_rows: Option<u64>,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    sheet_name: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserNotebooksResponse {
    #[serde(default)]
    notebooks: Vec<NotebookRow>,
}

fn parse_timestamp(value: Option<&str>) -> i64 {
    value
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

impl From<NotebookRow> for JobRecord {
    fn from(row: NotebookRow) -> Self {
        let created_at = parse_timestamp(row.created_at.as_deref());
        JobRecord {
            task_id: row.task_id,
            file_name: row.file_name,
            file_size: row.file_size.unwrap_or_default(),
            total_rows: row.total_rows.unwrap_or(0),
            selected_source: row.selected_option,
            selected_source_id: row.selected_data_id,
            current_step: row.current_step,
            upload_completed: row.upload_completed,
            status: RecordStatus::from_code(row.status),
            owner: UserProfile {
                id: row.user_id,
                username: row.username,
                email: row.email,
            },
            file_path: row.file_path,
            sheet_name: row.sheet_name,
            created_at,
            updated_at: row
                .updated_at
                .as_deref()
                .map(|s| parse_timestamp(Some(s)))
                .unwrap_or(created_at),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RemoteRecordStore
// ─────────────────────────────────────────────────────────────────────────────

/// Record store backed by the backend's notebook registry.
#[derive(Clone)]
pub struct RemoteRecordStore {
    backend: BackendClient,
}

impl RemoteRecordStore {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

impl JobRecordStore for RemoteRecordStore {
    fn save<'a>(
        &'a self,
        record: &'a JobRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            let body = serde_json::to_vec(&RegisterNotebookRequest::from(record))
                .map_err(|e| AppError::Internal(format!("Failed to encode job record: {}", e)))?;

            let response = self
                .backend
                .request_authed(Method::POST, "/api/databricks/register-notebook", Some(body))
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response, "Notebook registry", AppError::Service).await);
            }

            info!(
                "[BACKEND] Registered task {} as {}",
                redact_id(&record.task_id),
                record.status.label()
            );
            Ok(())
        })
    }

    fn list_for_owner<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<JobRecord>, AppError>> + Send + 'a>> {
        Box::pin(async move {
            let path = format!("/api/databricks/user-notebooks/{}", owner_id);
            let response = self.backend.request_authed(Method::GET, &path, None).await?;

            if !response.status().is_success() {
                return Err(error_from_response(response, "User", AppError::Service).await);
            }

            let parsed: UserNotebooksResponse = response
                .json()
                .await
                .map_err(|e| AppError::Service(format!("Invalid notebook list response: {}", e)))?;

            let mut records: Vec<JobRecord> = parsed.notebooks.into_iter().map(JobRecord::from).collect();
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(records)
        })
    }
}
