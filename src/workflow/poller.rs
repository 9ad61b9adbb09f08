//! Cancellable run-status poller.
//!
//! The poller owns a tokio task that asks for a run's status at a fixed
//! interval and forwards each answer over a channel. It never touches
//! wizard state: the wizard applies the updates it receives. Dropping the
//! poller cancels the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::databricks::RunStatusReport;
use crate::workflow::ops::ExecutionClient;

/// Channel depth; the wizard drains updates as they arrive.
const UPDATE_BUFFER: usize = 8;

/// One poll outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum RunUpdate {
    Status(RunStatusReport),
    /// The status call failed; polling continues.
    PollFailed(String),
}

pub struct RunPoller {
    run_id: u64,
    cancel: CancellationToken,
    updates: mpsc::Receiver<RunUpdate>,
    handle: JoinHandle<()>,
}

impl RunPoller {
    /// Starts polling `run_id`. The first request is made after one interval.
    pub fn start<E>(client: Arc<E>, run_id: u64, interval: Duration) -> Self
    where
        E: ExecutionClient + ?Sized + 'static,
    {
        let cancel = CancellationToken::new();
        let (tx, updates) = mpsc::channel(UPDATE_BUFFER);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let result = tokio::select! {
                    _ = token.cancelled() => break,
                    result = client.run_status(run_id) => result,
                };

                let (update, terminal) = match result {
                    Ok(report) => {
                        let terminal = report.status.is_terminal();
                        (RunUpdate::Status(report), terminal)
                    }
                    Err(e) => {
                        warn!("[WIZARD] Status poll for run {} failed: {}", run_id, e);
                        (RunUpdate::PollFailed(e.to_string()), false)
                    }
                };

                if token.is_cancelled() || tx.send(update).await.is_err() {
                    break;
                }
                if terminal {
                    break;
                }
            }
            info!("[WIZARD] Stopped polling run {}", run_id);
        });

        info!("[WIZARD] Polling run {} every {:?}", run_id, interval);

        Self {
            run_id,
            cancel,
            updates,
            handle,
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Waits for the next update. `None` once polling has stopped and every
    /// update has been received.
    pub async fn next(&mut self) -> Option<RunUpdate> {
        self.updates.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RunPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for RunPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunPoller")
            .field("run_id", &self.run_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
