//! In-memory fakes for driving the wizard in tests.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::blob::ProgressCallback;
use crate::databricks::{ProgressTable, RunState, RunStatusReport};
use crate::error::AppError;
use crate::storage::{JobRecord, JobRecordStore, SnapshotStore};
use crate::workflow::ops::{BlobTransfer, ExecutionClient, LaunchedRun};
use crate::workflow::task::UploadTask;

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

/// Serves a scripted sequence of lifecycle states, repeating the last one.
///
/// Entries are `STATE` or `STATE:RESULT`; a bare `TERMINATED` reports
/// `SUCCESS`.
pub struct FakeExecutor {
    script: Vec<(String, Option<String>)>,
    table: ProgressTable,
    served: AtomicUsize,
    status_calls: AtomicUsize,
    launch_calls: AtomicUsize,
    failing_polls: AtomicUsize,
    fail_launch: AtomicBool,
}

impl FakeExecutor {
    pub fn with_statuses(states: &[&str]) -> Self {
        let script = states
            .iter()
            .map(|entry| match entry.split_once(':') {
                Some((state, result)) => (state.to_string(), Some(result.to_string())),
                None if *entry == "TERMINATED" => (entry.to_string(), Some("SUCCESS".to_string())),
                None => (entry.to_string(), None),
            })
            .collect();
        Self {
            script,
            table: ProgressTable::default(),
            served: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            launch_calls: AtomicUsize::new(0),
            failing_polls: AtomicUsize::new(0),
            fail_launch: AtomicBool::new(false),
        }
    }

    pub fn fail_next_status_calls(&self, n: usize) {
        self.failing_polls.store(n, Ordering::SeqCst);
    }

    pub fn fail_launch(&self) {
        self.fail_launch.store(true, Ordering::SeqCst);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn launch_calls(&self) -> usize {
        self.launch_calls.load(Ordering::SeqCst)
    }

    fn next_report(&self, run_id: u64) -> Result<RunStatusReport, AppError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_polls.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_polls.store(failing - 1, Ordering::SeqCst);
            return Err(AppError::ConnectionFailed("status endpoint unreachable".into()));
        }

        let index = self.served.fetch_add(1, Ordering::SeqCst);
        let (state, result) = self
            .script
            .get(index.min(self.script.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_else(|| ("PENDING".to_string(), None));

        Ok(RunStatusReport::from_state(
            run_id,
            &RunState {
                life_cycle_state: state,
                result_state: result,
                state_message: None,
            },
            &self.table,
        ))
    }
}

impl ExecutionClient for FakeExecutor {
    fn launch_run<'a>(
        &'a self,
        source_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<LaunchedRun, AppError>> + Send + 'a>> {
        Box::pin(async move {
            self.launch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_launch.load(Ordering::SeqCst) {
                return Err(AppError::Service("cluster is not running".into()));
            }
            Ok(LaunchedRun {
                run_id: 1000 + self.launch_calls.load(Ordering::SeqCst) as u64,
                notebook_path: format!("/Shared/mdc/{}_Cube", source_id),
            })
        })
    }

    fn run_status(
        &self,
        run_id: u64,
    ) -> Pin<Box<dyn Future<Output = Result<RunStatusReport, AppError>> + Send + '_>> {
        Box::pin(async move { self.next_report(run_id) })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Blob transfer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeBlobTransfer {
    uploads: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
    output: Mutex<String>,
    fail_upload: AtomicBool,
}

impl FakeBlobTransfer {
    pub fn with_output(csv: &str) -> Self {
        let fake = Self::default();
        *fake.output.lock().unwrap() = csv.to_string();
        fake
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_upload.store(fail, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl BlobTransfer for FakeBlobTransfer {
    fn upload_file<'a>(
        &'a self,
        blob_path: &'a str,
        _file_path: &'a Path,
        on_progress: ProgressCallback,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            self.uploads.lock().unwrap().push(blob_path.to_string());
            on_progress(50, 100);
            if self.fail_upload.load(Ordering::SeqCst) {
                return Err(AppError::TransferFailed("connection reset".into()));
            }
            on_progress(100, 100);
            Ok(())
        })
    }

    fn fetch_text<'a>(
        &'a self,
        blob_path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>> {
        Box::pin(async move {
            self.downloads.lock().unwrap().push(blob_path.to_string());
            Ok(self.output.lock().unwrap().clone())
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stores
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<JobRecord>>,
    fail_saves: AtomicBool,
}

impl MemoryRecordStore {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<JobRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl JobRecordStore for MemoryRecordStore {
    fn save<'a>(
        &'a self,
        record: &'a JobRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(AppError::Service("registry unavailable".into()));
            }
            let mut records = self.records.lock().unwrap();
            match records.iter_mut().find(|r| r.task_id == record.task_id) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
            Ok(())
        })
    }

    fn list_for_owner<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<JobRecord>, AppError>> + Send + 'a>> {
        Box::pin(async move {
            let mut records: Vec<JobRecord> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.owner.id == owner_id)
                .cloned()
                .collect();
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(records)
        })
    }
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<UploadTask>>,
    saves: AtomicUsize,
    clears: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn holding(task: UploadTask) -> Self {
        let store = Self::default();
        *store.snapshot.lock().unwrap() = Some(task);
        store
    }

    pub fn snapshot(&self) -> Option<UploadTask> {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save<'a>(
        &'a self,
        task: &'a UploadTask,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.snapshot.lock().unwrap() = Some(task.clone());
            Ok(())
        })
    }

    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Option<UploadTask>, AppError>> + Send + '_>> {
        Box::pin(async move { Ok(self.snapshot()) })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + '_>> {
        Box::pin(async move {
            self.clears.fetch_add(1, Ordering::SeqCst);
            *self.snapshot.lock().unwrap() = None;
            Ok(())
        })
    }
}
