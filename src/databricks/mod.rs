//! Databricks integration: notebook discovery, run submission and status.

pub mod client;
pub mod run_status;

pub use client::{DatabricksClient, NotebookInfo, NotebookTask, SubmitRunRequest};
pub use run_status::{ProgressTable, RunState, RunStatus, RunStatusReport};
