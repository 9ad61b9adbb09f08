//! The six-step upload workflow.

pub mod ops;
pub mod poller;
pub mod source;
pub mod step;
pub mod task;
pub mod wizard;

#[cfg(test)]
pub(crate) mod testing;

pub use ops::{AzureBlobTransfer, BlobTransfer, DatabricksExecutor, ExecutionClient, LaunchedRun};
pub use poller::{RunPoller, RunUpdate};
pub use step::{Step, StepStatus, StepView};
pub use task::UploadTask;
pub use wizard::{RunEvent, Summary, UploadWizard};
