//! Events the wizard reports to whatever renders it.
//!
//! The wizard never blocks on a listener: events go through an unbounded
//! channel and are dropped when nobody is listening.

use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::databricks::RunStatus;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardEvent {
    /// The active step changed (indices are 0-based).
    StepChanged { from: usize, to: usize },
    /// Blob upload progress, 0-100.
    TransferProgress { percent: u8 },
    /// Notebook run progress from the status table.
    ExecuteProgress { status: RunStatus, progress: u8 },
    /// A transient message for the user.
    Notice {
        level: NoticeLevel,
        title: String,
        message: String,
    },
}

/// Sending half of the wizard's event stream.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<UnboundedSender<WizardEvent>>,
}

impl Notifier {
    /// A notifier plus the receiver its events arrive on.
    pub fn channel() -> (Self, UnboundedReceiver<WizardEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier that discards every event.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: WizardEvent) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn notice(&self, level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) {
        self.emit(WizardEvent::Notice {
            level,
            title: title.into(),
            message: message.into(),
        });
    }

    /// Reports an error using its user-facing presentation.
    pub fn error(&self, err: &AppError) {
        let presentation = err.to_presentation();
        self.notice(NoticeLevel::Error, presentation.title, presentation.message);
    }
}
