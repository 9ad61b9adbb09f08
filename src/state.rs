//! Application state shared by the commands.

use std::sync::Arc;

use reqwest::Client;
use tracing::{info, warn};

use crate::backend::{BackendClient, RemoteRecordStore};
use crate::config::{AppConfig, RecordStoreKind};
use crate::error::AppError;
use crate::events::Notifier;
use crate::http::{build_http_client, LoggingMode};
use crate::storage::{Database, FileSnapshotStore, JobRecordStore, LocalRecordStore, SnapshotStore};
use crate::workflow::{AzureBlobTransfer, DatabricksExecutor, UploadWizard};

/// The wizard wired to Databricks and Azure.
pub type LiveWizard = UploadWizard<DatabricksExecutor, AzureBlobTransfer>;

// ─────────────────────────────────────────────────────────────────────────────
// Application State
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a command needs: configuration, the shared HTTP client, the
/// backend session and the stores.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub http: Arc<Client>,
    pub db: Arc<Database>,
    pub backend: BackendClient,
    /// Job records, local or remote per `MDC_RECORD_STORE`.
    pub records: Arc<dyn JobRecordStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

impl AppState {
    /// Opens the database and builds the clients. The backend session is
    /// mirrored to the OS keychain.
    pub async fn init(config: AppConfig) -> Result<Self, AppError> {
        let http = Arc::new(build_http_client()?);
        let backend = BackendClient::new(http.clone(), config.api_url.clone())
            .with_logging_mode(LoggingMode::PathAndQueryRedacted)
            .with_keychain();
        Self::with_backend(config, http, backend).await
    }

    /// Like `init` with a caller-supplied backend client.
    pub async fn with_backend(
        config: AppConfig,
        http: Arc<Client>,
        backend: BackendClient,
    ) -> Result<Self, AppError> {
        let db = Arc::new(Database::init(config.database_path()).await?);

        let records: Arc<dyn JobRecordStore> = match config.record_store {
            RecordStoreKind::Local => Arc::new(LocalRecordStore::new(db.clone())),
            RecordStoreKind::Remote => Arc::new(RemoteRecordStore::new(backend.clone())),
        };
        let snapshots: Arc<dyn SnapshotStore> =
            Arc::new(FileSnapshotStore::new(config.snapshot_path()));

        info!(
            "[WIZARD] Data directory {} ({:?} record store)",
            config.data_dir.display(),
            config.record_store
        );

        Ok(Self {
            config: Arc::new(config),
            http,
            db,
            backend,
            records,
            snapshots,
        })
    }

    /// Loads the keychain session, if any. An unavailable keychain leaves
    /// the user signed out.
    pub async fn restore_session(&self) -> bool {
        match self.backend.restore_session().await {
            Ok(restored) => restored,
            Err(e) => {
                warn!("[BACKEND] Could not read stored session: {}", e);
                false
            }
        }
    }

    pub fn executor(&self) -> DatabricksExecutor {
        DatabricksExecutor::new(self.http.clone(), self.config.clone())
    }

    pub fn blob_transfer(&self) -> AzureBlobTransfer {
        AzureBlobTransfer::new(self.http.clone(), self.config.clone())
    }

    /// A fresh wizard owned by the signed-in user.
    pub async fn wizard(&self, notifier: Notifier) -> LiveWizard {
        UploadWizard::new(
            Arc::new(self.executor()),
            Arc::new(self.blob_transfer()),
            self.records.clone(),
            self.snapshots.clone(),
            self.config.wizard.clone(),
        )
        .with_owner(self.backend.current_user().await)
        .with_notifier(notifier)
    }
}
