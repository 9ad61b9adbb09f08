//! The fixed six-step wizard sequence.

use std::fmt;

use serde::Serialize;

/// Wizard steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    SelectSourceAndFile,
    PreviewParsedData,
    ReviewSummary,
    TransferToStorage,
    ExecuteRemoteJob,
    FetchAndPreviewResult,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::SelectSourceAndFile,
        Step::PreviewParsedData,
        Step::ReviewSummary,
        Step::TransferToStorage,
        Step::ExecuteRemoteJob,
        Step::FetchAndPreviewResult,
    ];

    pub const FIRST: Step = Step::SelectSourceAndFile;
    pub const LAST: Step = Step::FetchAndPreviewResult;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Step> {
        Step::ALL.get(index).copied()
    }

    /// Like `from_index` but clamps out-of-range values to the last step.
    pub fn clamped(index: usize) -> Step {
        Step::from_index(index).unwrap_or(Step::LAST)
    }

    pub fn next(self) -> Step {
        Step::clamped(self.index() + 1)
    }

    pub fn prev(self) -> Step {
        Step::from_index(self.index().saturating_sub(1)).unwrap_or(Step::FIRST)
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::SelectSourceAndFile => "Upload File",
            Step::PreviewParsedData => "View Data",
            Step::ReviewSummary => "Summary",
            Step::TransferToStorage => "Upload to Azure",
            Step::ExecuteRemoteJob => "Execute Notebook",
            Step::FetchAndPreviewResult => "Output Data",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.index() + 1, self.title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Active,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub index: usize,
    pub title: &'static str,
    pub status: StepStatus,
}

/// Every step with its status relative to `active`.
pub fn step_views(active: Step) -> Vec<StepView> {
    Step::ALL
        .iter()
        .map(|&step| StepView {
            index: step.index(),
            title: step.title(),
            status: match step.cmp(&active) {
                std::cmp::Ordering::Less => StepStatus::Completed,
                std::cmp::Ordering::Equal => StepStatus::Active,
                std::cmp::Ordering::Greater => StepStatus::Pending,
            },
        })
        .collect()
}
