//! The upload wizard.
//!
//! `UploadWizard` owns the `UploadTask` and is its only mutator. Every
//! operation takes `&mut self`, so transitions are serialized. Remote calls go
//! through `ExecutionClient` and `BlobTransfer`; failures emit a notice, are
//! returned to the caller and leave the wizard on the step it was on.
//!
//! The snapshot is written after every successful change and is best-effort:
//! a failed snapshot write is logged, never surfaced.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::backend::UserProfile;
use crate::blob::{blob_path, ProgressCallback};
use crate::config::WizardSettings;
use crate::databricks::RunStatusReport;
use crate::error::AppError;
use crate::events::{NoticeLevel, Notifier, WizardEvent};
use crate::sheet::{parse_csv_text, parse_file, write_dataset, Dataset, Page, Workbook};
use crate::storage::records::current_timestamp;
use crate::storage::{JobRecord, JobRecordStore, RecordStatus, SnapshotStore};
use crate::workflow::ops::{BlobTransfer, ExecutionClient, LaunchedRun};
use crate::workflow::poller::{RunPoller, RunUpdate};
use crate::workflow::source;
use crate::workflow::step::{step_views, Step, StepView};
use crate::workflow::task::{format_file_size, UploadTask};

/// What the review step shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub file_name: String,
    pub file_size: String,
    pub rows: u64,
    pub columns: usize,
    pub source: String,
}

/// Outcome of applying one poller update.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The run is still going.
    Progress(RunStatusReport),
    /// The run succeeded and the wizard moved to the result step.
    Succeeded(RunStatusReport),
    /// A status call failed; polling continues.
    PollFailed(String),
    /// No run is being polled.
    Idle,
}

pub struct UploadWizard<E: ExecutionClient + 'static, B: BlobTransfer> {
    executor: Arc<E>,
    blobs: Arc<B>,
    records: Arc<dyn JobRecordStore>,
    snapshots: Arc<dyn SnapshotStore>,
    notifier: Notifier,
    settings: WizardSettings,
    task: UploadTask,
    workbook: Option<Workbook>,
    preview: Dataset,
    result: Option<Dataset>,
    poller: Option<RunPoller>,
    transfer_percent: Arc<AtomicU8>,
    last_run: Option<RunStatusReport>,
    finished: bool,
}

impl<E: ExecutionClient + 'static, B: BlobTransfer> UploadWizard<E, B> {
    pub fn new(
        executor: Arc<E>,
        blobs: Arc<B>,
        records: Arc<dyn JobRecordStore>,
        snapshots: Arc<dyn SnapshotStore>,
        settings: WizardSettings,
    ) -> Self {
        Self {
            executor,
            blobs,
            records,
            snapshots,
            notifier: Notifier::silent(),
            settings,
            task: UploadTask::new(),
            workbook: None,
            preview: Dataset::default(),
            result: None,
            poller: None,
            transfer_percent: Arc::new(AtomicU8::new(0)),
            last_run: None,
            finished: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Sets the user that paused and completed records are filed under.
    pub fn with_owner(mut self, owner: Option<UserProfile>) -> Self {
        self.task.owner = owner;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────────

    pub fn task(&self) -> &UploadTask {
        &self.task
    }

    pub fn step(&self) -> Step {
        self.task.step()
    }

    /// True after `register_completion` until `start_new_task`.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn step_views(&self) -> Vec<StepView> {
        step_views(self.step())
    }

    pub fn summary(&self) -> Summary {
        Summary {
            file_name: self.task.file_name.clone(),
            file_size: self.task.file_size.clone(),
            rows: self.task.total_rows,
            columns: self.preview.column_count(),
            source: self.task.selected_source_id.clone(),
        }
    }

    pub fn preview(&self) -> &Dataset {
        &self.preview
    }

    /// A page of the parsed file (1-based).
    pub fn preview_page(&self, number: usize) -> Page<'_> {
        self.preview.page(number, self.settings.rows_per_page)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.workbook
            .as_ref()
            .map(|w| w.sheet_names())
            .unwrap_or_default()
    }

    pub fn result(&self) -> Option<&Dataset> {
        self.result.as_ref()
    }

    /// A page of the fetched result (1-based).
    pub fn result_page(&self, number: usize) -> Option<Page<'_>> {
        self.result
            .as_ref()
            .map(|d| d.page(number, self.settings.rows_per_page))
    }

    pub fn transfer_progress(&self) -> u8 {
        self.transfer_percent.load(Ordering::SeqCst)
    }

    /// Latest status of the current notebook run.
    pub fn run_report(&self) -> Option<&RunStatusReport> {
        self.last_run.as_ref()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Step 0: file and source
    // ─────────────────────────────────────────────────────────────────────────

    /// Parses `path` and makes its first tabular sheet the preview.
    pub async fn select_file(&mut self, path: &Path) -> Result<(), AppError> {
        self.require_step(Step::SelectSourceAndFile, "Selecting a file")?;

        let parsed = async {
            let workbook = parse_file(path).await?;
            let size = tokio::fs::metadata(path)
                .await
                .map_err(|e| AppError::SpreadsheetParse(format!("Failed to read file size: {}", e)))?
                .len();
            Ok::<_, AppError>((workbook, size))
        }
        .await;
        let (workbook, size) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return Err(self.fail(e)),
        };

        let Some(sheet) = workbook.first_tabular() else {
            return Err(self.fail(AppError::SpreadsheetParse(
                "The file has no sheet with a header row".into(),
            )));
        };
        let sheet_name = sheet.name.clone();
        let dataset = sheet.dataset.clone();

        let file_path = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());

        self.task.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.task.file_size = format_file_size(size);
        self.task.total_rows = dataset.row_count() as u64;
        self.task.file_path = Some(file_path);
        self.task.sheet_name = Some(sheet_name);
        self.forget_progress();

        info!(
            "[WIZARD] Selected {} ({} rows, {} columns)",
            self.task.file_name,
            dataset.row_count(),
            dataset.column_count()
        );

        self.preview = dataset;
        self.workbook = Some(workbook);
        self.save_snapshot().await;
        Ok(())
    }

    /// Switches the preview to another sheet of the selected workbook.
    pub async fn select_sheet(&mut self, name: &str) -> Result<(), AppError> {
        if self.finished || self.step() > Step::PreviewParsedData {
            return Err(AppError::InvalidInput(
                "The sheet can only be changed before the summary step".into(),
            ));
        }
        let workbook = self
            .workbook
            .as_ref()
            .ok_or_else(|| AppError::MissingSelection("file".into()))?;
        let sheet = workbook
            .sheet(name)
            .ok_or_else(|| AppError::InvalidInput(format!("The workbook has no sheet named \"{}\"", name)))?;

        self.preview = sheet.dataset.clone();
        self.task.total_rows = self.preview.row_count() as u64;
        self.task.sheet_name = Some(name.to_string());
        self.save_snapshot().await;
        Ok(())
    }

    /// Records the destination. Unknown values are kept verbatim.
    pub async fn select_source(&mut self, value: &str) -> Result<(), AppError> {
        self.require_step(Step::SelectSourceAndFile, "Selecting a data source")?;

        let value = value.trim();
        if value.is_empty() {
            return Err(AppError::MissingSelection("data source".into()));
        }

        let (option, data_id) = source::resolve(value);
        if !source::is_allowed(&data_id) {
            warn!("[WIZARD] Source {:?} is not in the catalog", value);
        }
        self.task.selected_source = option;
        self.task.selected_source_id = data_id;
        self.forget_progress();
        self.save_snapshot().await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Navigation
    // ─────────────────────────────────────────────────────────────────────────

    /// Moves one step forward if the current step's gate allows it.
    pub async fn advance(&mut self) -> Result<Step, AppError> {
        let step = self.step();
        if self.finished {
            return Ok(step);
        }
        self.check_can_leave(step)?;
        self.move_to(step.next()).await;
        Ok(self.step())
    }

    /// Moves one step back.
    pub async fn retreat(&mut self) -> Result<Step, AppError> {
        if self.finished {
            return Ok(self.step());
        }
        let to = self.step().prev();
        self.move_to(to).await;
        Ok(self.step())
    }

    fn check_can_leave(&self, step: Step) -> Result<(), AppError> {
        match step {
            Step::SelectSourceAndFile if !self.task.has_file() => {
                Err(AppError::MissingSelection("file".into()))
            }
            Step::SelectSourceAndFile if !self.task.has_source() => {
                Err(AppError::MissingSelection("data source".into()))
            }
            Step::TransferToStorage if !self.task.upload_completed => Err(AppError::StepBlocked {
                step: step.title().into(),
                reason: "the file has not been uploaded yet".into(),
            }),
            Step::ExecuteRemoteJob if !self.run_succeeded() => Err(AppError::StepBlocked {
                step: step.title().into(),
                reason: "the notebook run has not completed successfully".into(),
            }),
            _ => Ok(()),
        }
    }

    async fn move_to(&mut self, to: Step) {
        let from = self.step();
        if from == to {
            return;
        }
        self.stop_polling();
        // Each visit to the execute step needs its own successful run.
        if to == Step::ExecuteRemoteJob {
            self.last_run = None;
        }
        self.task.current_step = to.index();
        info!("[WIZARD] {} -> {}", from, to);
        self.notifier.emit(WizardEvent::StepChanged {
            from: from.index(),
            to: to.index(),
        });
        self.save_snapshot().await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Step 3: transfer
    // ─────────────────────────────────────────────────────────────────────────

    /// Uploads the selected file and moves to the execute step.
    ///
    /// Returns the blob path the file was written to.
    pub async fn transfer_to_storage(&mut self) -> Result<String, AppError> {
        self.require_step(Step::TransferToStorage, "Uploading")?;

        let file_path = self.local_file()?;
        let target = blob_path(
            &self.settings.upload_prefix,
            &self.task.selected_source,
            &self.task.file_name,
        );

        self.task.upload_completed = false;
        self.transfer_percent.store(0, Ordering::SeqCst);
        self.last_run = None;

        info!("[WIZARD] Uploading {} to {}", self.task.file_name, target);
        let on_progress = self.progress_callback();
        if let Err(e) = self.blobs.upload_file(&target, &file_path, on_progress).await {
            self.transfer_percent.store(0, Ordering::SeqCst);
            return Err(self.fail(e));
        }

        self.transfer_percent.store(100, Ordering::SeqCst);
        self.task.upload_completed = true;
        self.notifier.notice(
            NoticeLevel::Success,
            "Upload Complete",
            format!("{} was uploaded to storage.", self.task.file_name),
        );
        self.move_to(Step::ExecuteRemoteJob).await;
        Ok(target)
    }

    fn local_file(&self) -> Result<PathBuf, AppError> {
        match self.task.file_path {
            Some(ref path) if path.exists() => Ok(path.clone()),
            Some(ref path) => Err(AppError::InvalidInput(format!(
                "{} no longer exists; start a new upload",
                path.display()
            ))),
            None => Err(AppError::MissingSelection("file".into())),
        }
    }

    /// Emits a transfer event whenever the whole percentage changes.
    fn progress_callback(&self) -> ProgressCallback {
        let notifier = self.notifier.clone();
        let percent = self.transfer_percent.clone();
        Arc::new(move |sent, total| {
            let now = if total == 0 {
                100
            } else {
                (sent.min(total) * 100 / total) as u8
            };
            if percent.swap(now, Ordering::SeqCst) != now {
                notifier.emit(WizardEvent::TransferProgress { percent: now });
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Step 4: execute
    // ─────────────────────────────────────────────────────────────────────────

    /// Submits the notebook run for the selected source and starts polling.
    pub async fn execute_remote_job(&mut self) -> Result<LaunchedRun, AppError> {
        self.require_step(Step::ExecuteRemoteJob, "Running the notebook")?;

        if let Some(ref poller) = self.poller {
            return Err(AppError::InvalidInput(format!(
                "Run {} is still being tracked",
                poller.run_id()
            )));
        }

        let source_id = self.task.selected_source_id.clone();
        if !source::is_allowed(&source_id) {
            return Err(self.fail(AppError::UnknownSource(source_id)));
        }

        let run = match self.executor.launch_run(&source_id).await {
            Ok(run) => run,
            Err(e) => return Err(self.fail(e)),
        };

        self.last_run = None;
        self.poller = Some(RunPoller::start(
            self.executor.clone(),
            run.run_id,
            self.settings.poll_interval,
        ));
        self.notifier.notice(
            NoticeLevel::Info,
            "Notebook Started",
            format!("Run {} started for {}.", run.run_id, run.notebook_path),
        );
        Ok(run)
    }

    /// Waits for and applies the next status update of the current run.
    pub async fn next_run_update(&mut self) -> Result<RunEvent, AppError> {
        let Some(poller) = self.poller.as_mut() else {
            return Ok(RunEvent::Idle);
        };

        match poller.next().await {
            None => {
                self.poller = None;
                Ok(RunEvent::Idle)
            }
            Some(RunUpdate::PollFailed(message)) => Ok(RunEvent::PollFailed(message)),
            Some(RunUpdate::Status(report)) => self.apply_run_report(report).await,
        }
    }

    async fn apply_run_report(&mut self, mut report: RunStatusReport) -> Result<RunEvent, AppError> {
        if report.succeeded() {
            report.progress = 100;
        } else if report.failed() {
            report.progress = 0;
        }
        self.notifier.emit(WizardEvent::ExecuteProgress {
            status: report.status.clone(),
            progress: report.progress,
        });
        self.last_run = Some(report.clone());

        if report.succeeded() {
            self.stop_polling();
            info!("[WIZARD] Run {} completed", report.run_id);
            self.notifier.notice(
                NoticeLevel::Success,
                "Notebook Complete",
                format!("Run {} finished successfully.", report.run_id),
            );
            self.move_to(Step::FetchAndPreviewResult).await;
            return Ok(RunEvent::Succeeded(report));
        }

        if report.failed() {
            self.stop_polling();
            let message = if report.message.is_empty() {
                format!("The run ended with status {} ({})", report.status, report.result)
            } else {
                report.message.clone()
            };
            return Err(self.fail(AppError::RemoteJobFailed {
                run_id: report.run_id.to_string(),
                message,
            }));
        }

        Ok(RunEvent::Progress(report))
    }

    fn run_succeeded(&self) -> bool {
        self.last_run.as_ref().is_some_and(|r| r.succeeded())
    }

    fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.cancel();
            info!("[WIZARD] Cancelled polling of run {}", poller.run_id());
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Step 5: result
    // ─────────────────────────────────────────────────────────────────────────

    /// Downloads and parses the notebook's CSV output.
    pub async fn fetch_result(&mut self) -> Result<&Dataset, AppError> {
        if self.step() != Step::FetchAndPreviewResult {
            return Err(AppError::InvalidInput(format!(
                "The result is only available on the \"{}\" step",
                Step::FetchAndPreviewResult.title()
            )));
        }

        let output = format!("{}.csv", self.settings.output_path.trim_end_matches(".csv"));
        let fetched = match self.blobs.fetch_text(&output).await {
            Ok(text) => parse_csv_text(&text),
            Err(e) => Err(e),
        };
        let dataset = match fetched {
            Ok(dataset) => dataset,
            Err(e) => return Err(self.fail(e)),
        };

        info!("[WIZARD] Fetched {} result rows from {}", dataset.row_count(), output);
        Ok(&*self.result.insert(dataset))
    }

    /// Writes the fetched result to `path` as CSV.
    pub async fn export_result(&self, path: &Path) -> Result<PathBuf, AppError> {
        let result = self
            .result
            .as_ref()
            .ok_or_else(|| AppError::InvalidInput("No result has been fetched yet".into()))?;
        let written = write_dataset(path, result).await?;
        info!("[WIZARD] Exported {} rows to {}", result.row_count(), written.display());
        Ok(written)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Checkpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// Files the task as paused and starts over at step 0.
    ///
    /// Nothing changes when the record cannot be saved.
    pub async fn pause_and_persist(&mut self) -> Result<JobRecord, AppError> {
        if self.finished {
            return Err(AppError::InvalidInput("This upload is already complete".into()));
        }
        if !self.task.has_file() {
            return Err(AppError::MissingSelection("file".into()));
        }

        let record = self.task.to_record(RecordStatus::Paused, current_timestamp())?;
        if let Err(e) = self.records.save(&record).await {
            return Err(self.fail(e));
        }

        info!("[WIZARD] Paused task {} at step {}", record.task_id, record.current_step);
        self.clear_snapshot().await;
        self.reset();
        self.notifier.notice(
            NoticeLevel::Success,
            "Progress Saved",
            format!("{} can be resumed from history.", record.file_name),
        );
        Ok(record)
    }

    /// Files the task as completed. The wizard keeps showing the result
    /// until `start_new_task`.
    pub async fn register_completion(&mut self) -> Result<JobRecord, AppError> {
        if self.finished {
            return Err(AppError::InvalidInput("This upload is already registered".into()));
        }
        self.require_step(Step::FetchAndPreviewResult, "Registering completion")?;

        let record = self.task.to_record(RecordStatus::Completed, current_timestamp())?;
        if let Err(e) = self.records.save(&record).await {
            return Err(self.fail(e));
        }

        info!("[WIZARD] Completed task {}", record.task_id);
        self.clear_snapshot().await;
        self.task.task_id = UploadTask::new().task_id;
        self.finished = true;
        self.notifier.notice(
            NoticeLevel::Success,
            "Upload Registered",
            format!("{} was processed successfully.", record.file_name),
        );
        Ok(record)
    }

    /// Discards the current task and starts over at step 0.
    pub async fn start_new_task(&mut self) {
        self.reset();
        self.clear_snapshot().await;
    }

    /// Rebuilds the wizard from the local snapshot. Returns false when there
    /// is none, or when it belongs to another user.
    pub async fn restore(&mut self) -> Result<bool, AppError> {
        let Some(task) = self.snapshots.load().await? else {
            return Ok(false);
        };

        if let (Some(current), Some(saved)) = (&self.task.owner, &task.owner) {
            if current.id != saved.id {
                info!("[WIZARD] Ignoring snapshot of another user");
                return Ok(false);
            }
        }

        self.adopt(task).await;
        Ok(true)
    }

    /// Continues a paused record picked from history.
    pub async fn resume_record(&mut self, record: &JobRecord) -> Result<(), AppError> {
        if record.status == RecordStatus::Completed {
            return Err(AppError::InvalidInput(format!(
                "{} has already been processed",
                record.file_name
            )));
        }
        if let Some(ref owner) = self.task.owner {
            if owner.id != record.owner.id {
                return Err(AppError::NotFound(format!("No upload task with id {}", record.task_id)));
            }
        }

        self.adopt(UploadTask::from_record(record)).await;
        self.save_snapshot().await;
        Ok(())
    }

    async fn adopt(&mut self, task: UploadTask) {
        let owner = self.task.owner.clone();
        self.reset();
        self.task = task;
        if self.task.owner.is_none() {
            self.task.owner = owner;
        }
        if self.task.upload_completed {
            self.transfer_percent.store(100, Ordering::SeqCst);
        }
        self.reload_file().await;
        info!("[WIZARD] Resumed task {} at {}", self.task.task_id, self.step());
    }

    /// Re-parses the task's file if it is still on disk.
    async fn reload_file(&mut self) {
        let Some(path) = self.task.file_path.clone() else {
            return;
        };
        if !path.exists() {
            info!("[WIZARD] {} is gone; preview unavailable", path.display());
            return;
        }

        match parse_file(&path).await {
            Ok(workbook) => {
                let sheet = self
                    .task
                    .sheet_name
                    .as_deref()
                    .and_then(|name| workbook.sheet(name))
                    .or_else(|| workbook.first_tabular());
                if let Some(sheet) = sheet {
                    self.preview = sheet.dataset.clone();
                }
                self.workbook = Some(workbook);
            }
            Err(e) => warn!("[WIZARD] Could not re-read {}: {}", path.display(), e),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn require_step(&self, step: Step, action: &str) -> Result<(), AppError> {
        if self.finished || self.step() != step {
            return Err(AppError::InvalidInput(format!(
                "{} is only possible on the \"{}\" step",
                action,
                step.title()
            )));
        }
        Ok(())
    }

    /// Reports an error as a notice and hands it back.
    fn fail(&self, err: AppError) -> AppError {
        warn!("[WIZARD] {} failed at {}: {}", self.task.task_id, self.step(), err);
        self.notifier.error(&err);
        err
    }

    /// Anything derived from the file or source is stale once they change.
    fn forget_progress(&mut self) {
        self.task.upload_completed = false;
        self.transfer_percent.store(0, Ordering::SeqCst);
        self.last_run = None;
        self.result = None;
    }

    fn reset(&mut self) {
        self.stop_polling();
        let from = self.step();
        let owner = self.task.owner.take();
        self.task = UploadTask {
            owner,
            ..UploadTask::new()
        };
        self.workbook = None;
        self.preview = Dataset::default();
        self.result = None;
        self.transfer_percent.store(0, Ordering::SeqCst);
        self.last_run = None;
        self.finished = false;
        if from != Step::FIRST {
            self.notifier.emit(WizardEvent::StepChanged {
                from: from.index(),
                to: Step::FIRST.index(),
            });
        }
    }

    async fn save_snapshot(&self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.snapshots.save(&self.task).await {
            warn!("[WIZARD] Failed to save snapshot: {}", e);
        }
    }

    async fn clear_snapshot(&self) {
        if let Err(e) = self.snapshots.clear().await {
            warn!("[WIZARD] Failed to clear snapshot: {}", e);
        }
    }
}
