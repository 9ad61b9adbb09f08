//! Read-only commands over records and the notebook workspace.

use tracing::info;

use crate::databricks::{NotebookInfo, RunStatusReport};
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::records::current_timestamp;
use crate::storage::{DashboardMetrics, JobRecord};
use crate::workflow::ExecutionClient;

/// The signed-in user's records, newest first.
pub async fn history(state: &AppState) -> Result<Vec<JobRecord>, AppError> {
    let user = state.backend.require_user().await?;
    let records = state.records.list_for_owner(&user.id).await?;
    info!("[DB] {} record(s) for user {}", records.len(), user.id);
    Ok(records)
}

/// Totals and recent uploads of the signed-in user.
pub async fn dashboard(state: &AppState) -> Result<DashboardMetrics, AppError> {
    let records = history(state).await?;
    Ok(DashboardMetrics::from_records(&records, current_timestamp()))
}

/// Notebooks in the configured workspace folder.
pub async fn notebooks(state: &AppState) -> Result<Vec<NotebookInfo>, AppError> {
    state.executor().list_notebooks().await
}

/// One status lookup for `run_id`.
pub async fn run_status(state: &AppState, run_id: u64) -> Result<RunStatusReport, AppError> {
    state.executor().run_status(run_id).await
}
