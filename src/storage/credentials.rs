//! Secure session storage using the OS keychain.
//!
//! The signed-in user and their bearer token are kept in a single keychain
//! entry so the CLI can resume a session across invocations. Tokens are never
//! logged; `StoredSession` implements a `Debug` that redacts them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::UserProfile;
use crate::error::AppError;

/// The service name used for all keychain entries.
const SERVICE_NAME: &str = "mdc-uploader";

/// Keychain account under which the active session is stored.
const SESSION_KEY: &str = "session";

/// A persisted backend session.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub user: UserProfile,
    pub token: String,
}

impl fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSession")
            .field("user", &self.user)
            .field("token", &"***")
            .finish()
    }
}

/// Stores the active session in the OS keychain, replacing any previous one.
///
/// # Errors
/// Returns `AppError::Internal` if the keychain operation fails.
pub async fn store_session(session: &StoredSession) -> Result<(), AppError> {
    let json = serde_json::to_string(session)
        .map_err(|_| AppError::Internal("Failed to serialize session.".into()))?;

    tokio::task::spawn_blocking(move || {
        let entry = keyring::Entry::new(SERVICE_NAME, SESSION_KEY)
            .map_err(|_| AppError::Internal("Failed to access keychain.".into()))?;

        entry
            .set_password(&json)
            .map_err(|_| AppError::Internal("Failed to store credentials.".into()))?;

        Ok(())
    })
    .await
    .map_err(|_| AppError::Internal("Keychain task failed.".into()))?
}

/// Retrieves the stored session.
///
/// # Errors
/// Returns `AppError::NotAuthenticated` if no session is stored.
/// Returns `AppError::Internal` for other keychain errors.
pub async fn get_session() -> Result<StoredSession, AppError> {
    tokio::task::spawn_blocking(move || {
        let entry = keyring::Entry::new(SERVICE_NAME, SESSION_KEY)
            .map_err(|_| AppError::Internal("Failed to access keychain.".into()))?;

        let json = entry.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => AppError::NotAuthenticated,
            _ => AppError::Internal("Failed to retrieve credentials.".into()),
        })?;

        serde_json::from_str(&json)
            .map_err(|_| AppError::Internal("Failed to parse stored session.".into()))
    })
    .await
    .map_err(|_| AppError::Internal("Keychain task failed.".into()))?
}

/// Deletes the stored session. Deleting a missing session succeeds.
///
/// # Errors
/// Returns `AppError::Internal` for keychain access errors.
pub async fn delete_session() -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || {
        let entry = keyring::Entry::new(SERVICE_NAME, SESSION_KEY)
            .map_err(|_| AppError::Internal("Failed to access keychain.".into()))?;

        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(_) => Err(AppError::Internal("Failed to delete credentials.".into())),
        }
    })
    .await
    .map_err(|_| AppError::Internal("Keychain task failed.".into()))?
}
