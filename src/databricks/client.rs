//! Databricks REST client for notebook discovery and one-off runs.
//!
//! # Security
//!
//! - The personal access token is never logged
//! - Only HTTP method, path, and status codes are logged

use std::sync::Arc;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::databricks::run_status::{ProgressTable, RunState, RunStatusReport};
use crate::error::AppError;
use crate::http::error_from_response;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// One workspace object returned by `workspace/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotebookInfo {
    pub path: String,
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Request body for `POST /api/2.1/jobs/runs/submit`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRunRequest {
    pub run_name: String,
    pub existing_cluster_id: String,
    pub notebook_task: NotebookTask,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotebookTask {
    pub notebook_path: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WorkspaceListResponse {
    #[serde(default)]
    objects: Vec<NotebookInfo>,
}

#[derive(Debug, Deserialize)]
struct SubmitRunResponse {
    run_id: u64,
}

#[derive(Debug, Deserialize)]
struct RunsGetResponse {
    state: RunState,
}

// ─────────────────────────────────────────────────────────────────────────────
// DatabricksClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the Databricks workspace and jobs APIs.
#[derive(Clone)]
pub struct DatabricksClient {
    client: Arc<Client>,
    /// Workspace URL (e.g., "https://adb-123.azuredatabricks.net").
    base_url: Url,
    token: SecretString,
    progress_table: ProgressTable,
}

impl DatabricksClient {
    pub fn new(client: Arc<Client>, base_url: Url, token: SecretString) -> Self {
        Self {
            client,
            base_url,
            token,
            progress_table: ProgressTable::default(),
        }
    }

    pub fn with_progress_table(mut self, table: ProgressTable) -> Self {
        self.progress_table = table;
        self
    }

    /// Lists the notebooks directly inside `folder`.
    ///
    /// A response without `objects` (empty folder) yields an empty list.
    pub async fn list_notebooks(&self, folder: &str) -> Result<Vec<NotebookInfo>, AppError> {
        let mut url = self.build_url("/api/2.0/workspace/list")?;
        url.query_pairs_mut().append_pair("path", folder);

        info!("[DATABRICKS] GET /api/2.0/workspace/list");

        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Notebook listing failed: {}", e)))?;

        let status = response.status();
        info!("[DATABRICKS] GET /api/2.0/workspace/list -> {}", status.as_u16());

        if !status.is_success() {
            return Err(error_from_response(response, "Notebook folder", AppError::Service).await);
        }

        let listing: WorkspaceListResponse = response.json().await.map_err(|e| {
            AppError::Service(format!("Failed to parse notebook listing: {}", e))
        })?;

        Ok(listing
            .objects
            .into_iter()
            .filter(|obj| obj.object_type == "NOTEBOOK")
            .collect())
    }

    /// Finds the first notebook in `folder` whose path contains `source_id`,
    /// compared case-insensitively.
    pub async fn find_notebook(&self, folder: &str, source_id: &str) -> Result<NotebookInfo, AppError> {
        let notebooks = self.list_notebooks(folder).await?;
        let needle = source_id.to_lowercase();

        notebooks
            .into_iter()
            .find(|nb| nb.path.to_lowercase().contains(&needle))
            .ok_or_else(|| AppError::NotFound(format!("No notebook found matching source: {}", source_id)))
    }

    /// Submits a one-off notebook run and returns its run id.
    pub async fn submit_run(&self, req: &SubmitRunRequest) -> Result<u64, AppError> {
        let url = self.build_url("/api/2.1/jobs/runs/submit")?;

        info!("[DATABRICKS] POST /api/2.1/jobs/runs/submit ({})", req.notebook_task.notebook_path);

        let response = self
            .client
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .json(req)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Run submission failed: {}", e)))?;

        let status = response.status();
        info!("[DATABRICKS] POST /api/2.1/jobs/runs/submit -> {}", status.as_u16());

        if !status.is_success() {
            return Err(error_from_response(response, "Cluster or notebook", AppError::Service).await);
        }

        let submitted: SubmitRunResponse = response.json().await.map_err(|e| {
            AppError::Service(format!("Failed to parse run submission response: {}", e))
        })?;

        Ok(submitted.run_id)
    }

    /// Looks up the current status of a run.
    pub async fn get_run_status(&self, run_id: u64) -> Result<RunStatusReport, AppError> {
        let mut url = self.build_url("/api/2.1/jobs/runs/get")?;
        url.query_pairs_mut().append_pair("run_id", &run_id.to_string());

        info!("[DATABRICKS] GET /api/2.1/jobs/runs/get (run {})", run_id);

        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Run status check failed: {}", e)))?;

        let status = response.status();
        info!("[DATABRICKS] GET /api/2.1/jobs/runs/get -> {}", status.as_u16());

        if !status.is_success() {
            return Err(error_from_response(response, "Run", AppError::Service).await);
        }

        let run: RunsGetResponse = response.json().await.map_err(|e| {
            AppError::Service(format!("Failed to parse run status response: {}", e))
        })?;

        Ok(RunStatusReport::from_state(run_id, &run.state, &self.progress_table))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn build_url(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("Invalid Databricks URL: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
