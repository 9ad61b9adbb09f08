//! Mapping of Databricks run lifecycle states to wizard statuses.

use serde::{Deserialize, Serialize, Serializer};

use crate::error::AppError;

/// Result states that mean a terminated run did not succeed.
const FAILED_RESULT_STATES: &[&str] = &["FAILED", "TIMEDOUT", "CANCELED", "CANCELLED"];

// ─────────────────────────────────────────────────────────────────────────────
// RunStatus
// ─────────────────────────────────────────────────────────────────────────────

/// Local status taxonomy for a notebook run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Queued,
    Running,
    Terminating,
    /// Lifecycle `TERMINATED`.
    Completed,
    /// Lifecycle `INTERNAL_ERROR`.
    Error,
    /// Any other lifecycle value, lower-cased verbatim (e.g. `skipped`).
    Other(String),
}

impl RunStatus {
    /// Maps a Databricks `life_cycle_state`.
    pub fn from_life_cycle(state: &str) -> Self {
        match state {
            "TERMINATED" => RunStatus::Completed,
            "INTERNAL_ERROR" => RunStatus::Error,
            "PENDING" => RunStatus::Pending,
            "QUEUED" => RunStatus::Queued,
            "RUNNING" => RunStatus::Running,
            "TERMINATING" => RunStatus::Terminating,
            other => RunStatus::Other(other.to_lowercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Terminating => "terminating",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
            RunStatus::Other(s) => s,
        }
    }

    /// Polling stops once a run reaches `completed` or `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RunStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProgressTable
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state to progress percentage lookup. Unknown states map to 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTable {
    entries: Vec<(String, u8)>,
}

impl Default for ProgressTable {
    fn default() -> Self {
        Self {
            entries: vec![
                ("PENDING".to_string(), 10),
                ("QUEUED".to_string(), 20),
                ("RUNNING".to_string(), 60),
                ("TERMINATING".to_string(), 90),
                ("TERMINATED".to_string(), 100),
            ],
        }
    }
}

impl ProgressTable {
    pub fn progress_for(&self, life_cycle_state: &str) -> u8 {
        self.entries
            .iter()
            .find(|(state, _)| state == life_cycle_state)
            .map(|(_, pct)| *pct)
            .unwrap_or(0)
    }

    /// Applies `STATE=pct` overrides separated by commas, e.g. `RUNNING=50,QUEUED=5`.
    pub fn with_overrides(mut self, overrides: &str) -> Result<Self, AppError> {
        for pair in overrides.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (state, pct) = pair.split_once('=').ok_or_else(|| {
                AppError::Config(format!("progress entry '{}' must look like STATE=percent", pair))
            })?;
            let state = state.trim().to_ascii_uppercase();
            let pct: u8 = pct
                .trim()
                .parse()
                .ok()
                .filter(|p| *p <= 100)
                .ok_or_else(|| {
                    AppError::Config(format!("progress for '{}' must be between 0 and 100", state))
                })?;

            match self.entries.iter_mut().find(|(s, _)| *s == state) {
                Some(entry) => entry.1 = pct,
                None => self.entries.push((state, pct)),
            }
        }
        Ok(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire state and report
// ─────────────────────────────────────────────────────────────────────────────

/// The `state` object of `GET /api/2.1/jobs/runs/get`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunState {
    pub life_cycle_state: String,
    #[serde(default)]
    pub result_state: Option<String>,
    #[serde(default)]
    pub state_message: Option<String>,
}

/// Status of one run as seen by the wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatusReport {
    pub run_id: u64,
    pub status: RunStatus,
    pub message: String,
    /// Databricks `result_state`, `"N/A"` while the run has none.
    pub result: String,
    pub progress: u8,
}

impl RunStatusReport {
    pub fn from_state(run_id: u64, state: &RunState, table: &ProgressTable) -> Self {
        Self {
            run_id,
            status: RunStatus::from_life_cycle(&state.life_cycle_state),
            message: state.state_message.clone().unwrap_or_default(),
            result: state.result_state.clone().unwrap_or_else(|| "N/A".to_string()),
            progress: table.progress_for(&state.life_cycle_state),
        }
    }

    /// Terminated and the result state is not a failure.
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
            && !FAILED_RESULT_STATES.contains(&self.result.as_str())
    }

    /// Internal error, or terminated with a failing result state.
    pub fn failed(&self) -> bool {
        self.status == RunStatus::Error || (self.status == RunStatus::Completed && !self.succeeded())
    }
}
