//! Upload commands: run the wizard end to end, resume it, inspect or pause
//! the task in progress.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::events::Notifier;
use crate::sheet::{cell_text, Page};
use crate::state::{AppState, LiveWizard};
use crate::storage::records::find_record;
use crate::storage::{JobRecord, SnapshotStore};
use crate::workflow::{RunEvent, Step, StepView, Summary};

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: PathBuf,
    /// Catalog option value or data id (e.g. `google_ads` or `Google`).
    pub source: String,
    /// Sheet to preview instead of the first tabular one.
    pub sheet: Option<String>,
}

/// How far to drive the wizard.
#[derive(Debug, Clone, Default)]
pub struct DriveOptions {
    /// Pause into the record store instead of running the notebook.
    pub pause_at_execute: bool,
    /// Where to write the notebook output as CSV.
    pub export_to: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Completed {
        record: JobRecord,
        result_rows: usize,
        /// First page of the notebook output.
        result_preview: PreviewPage,
        exported_to: Option<PathBuf>,
    },
    Paused {
        record: JobRecord,
    },
}

/// The task in progress as `status` reports it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub task_id: String,
    pub steps: Vec<StepView>,
    pub summary: Summary,
    pub upload_completed: bool,
    pub preview: PreviewPage,
}

/// One page of a dataset, as display text.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPage {
    pub number: usize,
    pub total_pages: usize,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Selects the file and source, then drives every remaining step.
///
/// Refuses to start while the user has an upload in progress, so the
/// snapshot is never overwritten.
pub async fn upload(
    state: &AppState,
    request: &UploadRequest,
    options: &DriveOptions,
    notifier: Notifier,
) -> Result<UploadOutcome, AppError> {
    let user = state.backend.require_user().await?;
    if let Some(task) = state.snapshots.load().await? {
        let same_owner = task.owner.as_ref().map_or(true, |owner| owner.id == user.id);
        if same_owner && task.has_file() {
            return Err(AppError::InvalidInput(format!(
                "{} is still in progress at \"{}\"; continue it with `mdc-uploader resume` \
                 or save it with `mdc-uploader pause` first",
                task.file_name,
                Step::clamped(task.current_step)
            )));
        }
    }

    let mut wizard = state.wizard(notifier).await;

    wizard.select_file(&request.file).await?;
    if let Some(ref sheet) = request.sheet {
        wizard.select_sheet(sheet).await?;
    }
    wizard.select_source(&request.source).await?;

    info!(
        "[WIZARD] Upload of {} to {} started as task {}",
        wizard.task().file_name,
        wizard.task().selected_source_id,
        wizard.task().task_id
    );
    drive(&mut wizard, options).await
}

/// Continues the local snapshot, or the paused record `task_id`.
pub async fn resume(
    state: &AppState,
    task_id: Option<&str>,
    options: &DriveOptions,
    notifier: Notifier,
) -> Result<UploadOutcome, AppError> {
    let user = state.backend.require_user().await?;
    let mut wizard = state.wizard(notifier).await;

    match task_id {
        Some(id) => {
            let record = find_record(state.records.as_ref(), &user.id, id).await?;
            wizard.resume_record(&record).await?;
        }
        None => {
            if !wizard.restore().await? {
                return Err(AppError::NotFound("No upload in progress".into()));
            }
        }
    }

    drive(&mut wizard, options).await
}

/// The local snapshot, if there is one, with page `page` of its preview.
pub async fn status(state: &AppState, page: usize) -> Result<Option<TaskStatus>, AppError> {
    let mut wizard = state.wizard(Notifier::silent()).await;
    if !wizard.restore().await? {
        return Ok(None);
    }

    Ok(Some(TaskStatus {
        task_id: wizard.task().task_id.clone(),
        steps: wizard.step_views(),
        summary: wizard.summary(),
        upload_completed: wizard.task().upload_completed,
        preview: page_text(wizard.preview().columns(), wizard.preview_page(page)),
    }))
}

/// Files the local snapshot as a paused record.
pub async fn pause(state: &AppState) -> Result<JobRecord, AppError> {
    state.backend.require_user().await?;
    let mut wizard = state.wizard(Notifier::silent()).await;
    if !wizard.restore().await? {
        return Err(AppError::NotFound("No upload in progress".into()));
    }
    wizard.pause_and_persist().await
}

fn page_text(columns: &[String], page: Page<'_>) -> PreviewPage {
    PreviewPage {
        number: page.number,
        total_pages: page.total_pages,
        columns: columns.to_vec(),
        rows: page
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the wizard from its current step to completion or to the pause point.
async fn drive(wizard: &mut LiveWizard, options: &DriveOptions) -> Result<UploadOutcome, AppError> {
    loop {
        match wizard.step() {
            Step::SelectSourceAndFile | Step::PreviewParsedData | Step::ReviewSummary => {
                wizard.advance().await?;
            }
            Step::TransferToStorage if wizard.task().upload_completed => {
                wizard.advance().await?;
            }
            Step::TransferToStorage => {
                wizard.transfer_to_storage().await?;
            }
            Step::ExecuteRemoteJob if options.pause_at_execute => {
                let record = wizard.pause_and_persist().await?;
                return Ok(UploadOutcome::Paused { record });
            }
            Step::ExecuteRemoteJob => {
                wizard.execute_remote_job().await?;
                wait_for_run(wizard).await?;
            }
            Step::FetchAndPreviewResult => {
                let result = wizard.fetch_result().await?;
                let result_rows = result.row_count();
                let columns = result.columns().to_vec();
                let result_preview = wizard
                    .result_page(1)
                    .map(|page| page_text(&columns, page))
                    .unwrap_or_default();
                let exported_to = match options.export_to {
                    Some(ref path) => Some(wizard.export_result(path).await?),
                    None => None,
                };
                let record = wizard.register_completion().await?;
                return Ok(UploadOutcome::Completed {
                    record,
                    result_rows,
                    result_preview,
                    exported_to,
                });
            }
        }
    }
}

async fn wait_for_run(wizard: &mut LiveWizard) -> Result<(), AppError> {
    loop {
        match wizard.next_run_update().await? {
            RunEvent::Succeeded(_) => return Ok(()),
            RunEvent::Progress(_) | RunEvent::PollFailed(_) => {}
            RunEvent::Idle => {
                return Err(AppError::Internal(
                    "Polling stopped before the run finished".into(),
                ))
            }
        }
    }
}
