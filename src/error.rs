use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "authorization:",
    "password",
    "sig=",
    "token=",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// Coarse error classes used by the wizard to decide how a failure is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing selection or blocked step. Shown inline, blocks advance.
    Validation,
    /// Network or storage failure. Step is not advanced.
    Transport,
    /// Terminal failure reported by the execution service.
    RemoteJob,
    /// Unknown data source or missing remote object.
    NotFound,
    /// File could not be parsed as a spreadsheet.
    Parse,
    /// Missing or expired session.
    Auth,
    /// Local storage, configuration or programming errors.
    Internal,
}

/// User-friendly error presentation for notices.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session expired")]
    SessionExpired,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    // ── Validation ────────────────────────────────────────────────────────────
    #[error("Missing selection: {0}")]
    MissingSelection(String),

    #[error("Cannot leave step '{step}': {reason}")]
    StepBlocked { step: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ── Transport ─────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Service error: {0}")]
    Service(String),

    // ── Remote job ────────────────────────────────────────────────────────────
    #[error("Run {run_id} failed: {message}")]
    RemoteJobFailed { run_id: String, message: String },

    // ── Not found ─────────────────────────────────────────────────────────────
    #[error("Notebook for source \"{0}\" not found")]
    UnknownSource(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ── Parse ─────────────────────────────────────────────────────────────────
    #[error("Could not read spreadsheet: {0}")]
    SpreadsheetParse(String),

    // ── Internal ──────────────────────────────────────────────────────────────
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Classifies the error into the wizard's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotAuthenticated | AppError::SessionExpired | AppError::LoginFailed(_) => {
                ErrorKind::Auth
            }
            AppError::MissingSelection(_)
            | AppError::StepBlocked { .. }
            | AppError::InvalidInput(_) => ErrorKind::Validation,
            AppError::ConnectionFailed(_)
            | AppError::TransferFailed(_)
            | AppError::RateLimited { .. }
            | AppError::Service(_) => ErrorKind::Transport,
            AppError::RemoteJobFailed { .. } => ErrorKind::RemoteJob,
            AppError::UnknownSource(_) | AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::SpreadsheetParse(_) => ErrorKind::Parse,
            AppError::Storage(_) | AppError::Config(_) | AppError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Converts the error into a user-friendly presentation suitable for display.
    /// Never leaks secrets, tokens, or sensitive URL parameters.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Auth ──────────────────────────────────────────────────────────
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Logged In".into(),
                message: "You need to log in to continue.".into(),
                action: Some("Log in with your account".into()),
            },

            AppError::SessionExpired => ErrorPresentation {
                title: "Session Expired".into(),
                message: "Your session has expired.".into(),
                action: Some("Log in again".into()),
            },

            AppError::LoginFailed(msg) => ErrorPresentation {
                title: "Login Failed".into(),
                message: sanitize_message(msg, "The email or credentials were not accepted."),
                action: Some("Check your credentials and log in again".into()),
            },

            // ── Validation ────────────────────────────────────────────────────
            AppError::MissingSelection(what) => ErrorPresentation {
                title: "Selection Required".into(),
                message: format!("Please select a {} before continuing.", what),
                action: None,
            },

            AppError::StepBlocked { step, reason } => ErrorPresentation {
                title: "Cannot Continue".into(),
                message: format!("{}: {}", step, reason),
                action: None,
            },

            AppError::InvalidInput(msg) => ErrorPresentation {
                title: "Invalid Input".into(),
                message: sanitize_message(msg, "The input was not accepted."),
                action: None,
            },

            // ── Transport ─────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the service. Please check your internet connection."
                    .into(),
                action: Some("Check network and retry".into()),
            },

            AppError::TransferFailed(msg) => ErrorPresentation {
                title: "Upload Failed".into(),
                message: sanitize_message(msg, "The file could not be uploaded to storage."),
                action: Some("Retry the upload".into()),
            },

            AppError::RateLimited { retry_after_secs } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Please wait {} seconds before trying again.", secs),
                    None => "Please wait a moment before trying again.".into(),
                };
                ErrorPresentation {
                    title: "Too Many Requests".into(),
                    message: format!("The service is limiting requests. {}", wait_msg),
                    action: Some("Wait and retry".into()),
                }
            }

            AppError::Service(msg) => ErrorPresentation {
                title: "Service Error".into(),
                message: sanitize_message(msg, "The remote service returned an error."),
                action: Some("Try again".into()),
            },

            // ── Remote job ────────────────────────────────────────────────────
            AppError::RemoteJobFailed { run_id: _, message } => ErrorPresentation {
                title: "Notebook Run Failed".into(),
                message: sanitize_message(message, "The notebook run failed."),
                action: Some("Review the run and execute again".into()),
            },

            // ── Not found ─────────────────────────────────────────────────────
            AppError::UnknownSource(source) => ErrorPresentation {
                title: "Unknown Source".into(),
                message: format!("Notebook for source \"{}\" not found.", source),
                action: Some("Choose a different data source".into()),
            },

            AppError::NotFound(msg) => ErrorPresentation {
                title: "Not Found".into(),
                message: sanitize_message(msg, "The requested item was not found."),
                action: None,
            },

            // ── Parse ─────────────────────────────────────────────────────────
            AppError::SpreadsheetParse(msg) => ErrorPresentation {
                title: "Invalid Spreadsheet".into(),
                message: format!("The file could not be read: {}", msg),
                action: Some("Choose an Excel or CSV file".into()),
            },

            // ── Internal ──────────────────────────────────────────────────────
            AppError::Storage(_) => ErrorPresentation {
                title: "Storage Error".into(),
                message: "Local data could not be saved or loaded.".into(),
                action: Some("Try again".into()),
            },

            AppError::Config(msg) => ErrorPresentation {
                title: "Configuration Missing".into(),
                message: sanitize_message(msg, "The application is not fully configured."),
                action: Some("Check the environment settings".into()),
            },

            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns all AppError variants for exhaustive testing.
    fn all_variants() -> Vec<AppError> {
        vec![
            AppError::NotAuthenticated,
            AppError::SessionExpired,
            AppError::LoginFailed("Invalid credentials".into()),
            AppError::MissingSelection("file".into()),
            AppError::StepBlocked {
                step: "Upload to Azure".into(),
                reason: "upload not completed".into(),
            },
            AppError::InvalidInput("empty source".into()),
            AppError::ConnectionFailed("timeout".into()),
            AppError::TransferFailed("HTTP 403".into()),
            AppError::RateLimited { retry_after_secs: Some(30) },
            AppError::RateLimited { retry_after_secs: None },
            AppError::Service("HTTP 500".into()),
            AppError::RemoteJobFailed { run_id: "42".into(), message: "FAILED".into() },
            AppError::UnknownSource("Myspace".into()),
            AppError::NotFound("notebook".into()),
            AppError::SpreadsheetParse("bad zip".into()),
            AppError::Storage("disk full".into()),
            AppError::Config("DATABRICKS_TOKEN is not set".into()),
            AppError::Internal("something broke".into()),
        ]
    }

    #[test]
    fn all_variants_have_nonempty_title_and_message() {
        for variant in all_variants() {
            let presentation = variant.to_presentation();
            assert!(!presentation.title.trim().is_empty(), "Empty title for {:?}", variant);
            assert!(!presentation.message.trim().is_empty(), "Empty message for {:?}", variant);
        }
    }

    #[test]
    fn kinds_follow_the_wizard_taxonomy() {
        assert_eq!(AppError::MissingSelection("file".into()).kind(), ErrorKind::Validation);
        assert_eq!(AppError::TransferFailed("x".into()).kind(), ErrorKind::Transport);
        assert_eq!(AppError::ConnectionFailed("x".into()).kind(), ErrorKind::Transport);
        assert_eq!(
            AppError::RemoteJobFailed { run_id: "1".into(), message: "x".into() }.kind(),
            ErrorKind::RemoteJob
        );
        assert_eq!(AppError::UnknownSource("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(AppError::SpreadsheetParse("x".into()).kind(), ErrorKind::Parse);
        assert_eq!(AppError::SessionExpired.kind(), ErrorKind::Auth);
    }

    #[test]
    fn auth_errors_suggest_relogin() {
        for variant in [AppError::NotAuthenticated, AppError::SessionExpired] {
            let action = variant.to_presentation().action.expect("auth error should have action");
            assert!(
                action.to_lowercase().contains("log in"),
                "Auth error {:?} action should mention login, got: {}",
                variant,
                action
            );
        }
    }

    #[test]
    fn rate_limited_mentions_retry_time() {
        let presentation = AppError::RateLimited { retry_after_secs: Some(30) }.to_presentation();
        assert!(presentation.message.contains("30"));
        assert!(presentation.action.is_some());
    }

    #[test]
    fn unknown_source_names_the_source() {
        let presentation = AppError::UnknownSource("Myspace".into()).to_presentation();
        assert!(presentation.message.contains("\"Myspace\""));
    }

    #[test]
    fn serialization_produces_presentation_fields() {
        for variant in all_variants() {
            let json = serde_json::to_value(&variant).expect("serialize");
            assert!(json.get("title").is_some(), "{:?} missing title", variant);
            assert!(json.get("message").is_some(), "{:?} missing message", variant);
            assert!(json.get("action").is_some(), "{:?} missing action", variant);
        }
    }

    #[test]
    fn no_secret_leakage_in_presentation() {
        let test_cases: Vec<(&str, AppError)> = vec![
            ("LoginFailed", AppError::LoginFailed("password=hunter2".into())),
            ("Service", AppError::Service("Authorization: Bearer abc".into())),
            ("TransferFailed", AppError::TransferFailed("PUT /c/f.csv?sig=abc123".into())),
            ("Config", AppError::Config("token=dapi123".into())),
            (
                "RemoteJobFailed",
                AppError::RemoteJobFailed { run_id: "1".into(), message: "Bearer xyz".into() },
            ),
        ];

        for (label, variant) in test_cases {
            let presentation = variant.to_presentation();
            let output_lower = format!(
                "{} {} {}",
                presentation.title,
                presentation.message,
                presentation.action.as_deref().unwrap_or("")
            )
            .to_ascii_lowercase();

            for pattern in SENSITIVE_PATTERNS {
                assert!(
                    !output_lower.contains(pattern),
                    "{} presentation contains sensitive pattern",
                    label
                );
            }
        }
    }
}
