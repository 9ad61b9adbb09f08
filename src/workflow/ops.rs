//! Remote operations the wizard depends on.
//!
//! The wizard is generic over these traits so it can be driven by fakes in
//! tests. The real implementations read their settings lazily: a missing
//! Databricks or Azure variable only fails the operation that needs it.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::blob::{content_type_for, BlobClient, ProgressCallback};
use crate::config::AppConfig;
use crate::databricks::{DatabricksClient, NotebookInfo, NotebookTask, RunStatusReport, SubmitRunRequest};
use crate::error::AppError;

/// A submitted notebook run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchedRun {
    pub run_id: u64,
    pub notebook_path: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Submits and observes notebook runs.
pub trait ExecutionClient: Send + Sync {
    /// Resolves the notebook for `source_id` and submits a one-off run.
    fn launch_run<'a>(
        &'a self,
        source_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<LaunchedRun, AppError>> + Send + 'a>>;

    /// Fetches the current status of a run.
    fn run_status(
        &self,
        run_id: u64,
    ) -> Pin<Box<dyn Future<Output = Result<RunStatusReport, AppError>> + Send + '_>>;
}

/// Moves files in and out of blob storage.
pub trait BlobTransfer: Send + Sync {
    /// Streams a local file to `blob_path`.
    fn upload_file<'a>(
        &'a self,
        blob_path: &'a str,
        file_path: &'a Path,
        on_progress: ProgressCallback,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Downloads `blob_path` as text.
    fn fetch_text<'a>(
        &'a self,
        blob_path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Databricks
// ─────────────────────────────────────────────────────────────────────────────

/// `ExecutionClient` backed by the Databricks REST API.
#[derive(Debug, Clone)]
pub struct DatabricksExecutor {
    http: Arc<Client>,
    config: Arc<AppConfig>,
}

impl DatabricksExecutor {
    pub fn new(http: Arc<Client>, config: Arc<AppConfig>) -> Self {
        Self { http, config }
    }

    fn client(&self) -> Result<DatabricksClient, AppError> {
        let settings = self.config.databricks()?;
        Ok(
            DatabricksClient::new(self.http.clone(), settings.instance, settings.token)
                .with_progress_table(self.config.wizard.progress_table.clone()),
        )
    }

    /// Notebooks in the configured folder.
    pub async fn list_notebooks(&self) -> Result<Vec<NotebookInfo>, AppError> {
        let folder = self.config.databricks()?.notebook_folder;
        self.client()?.list_notebooks(&folder).await
    }

    async fn launch(&self, source_id: &str) -> Result<LaunchedRun, AppError> {
        let settings = self.config.databricks()?;
        let client = self.client()?;

        let notebook = client.find_notebook(&settings.notebook_folder, source_id).await?;
        let run_id = client
            .submit_run(&SubmitRunRequest {
                run_name: settings.run_name.clone(),
                existing_cluster_id: settings.cluster_id.clone(),
                notebook_task: NotebookTask {
                    notebook_path: notebook.path.clone(),
                },
            })
            .await?;

        info!("[DATABRICKS] Run {} started for {}", run_id, notebook.path);

        Ok(LaunchedRun {
            run_id,
            notebook_path: notebook.path,
        })
    }

    async fn status(&self, run_id: u64) -> Result<RunStatusReport, AppError> {
        self.client()?.get_run_status(run_id).await
    }
}

impl ExecutionClient for DatabricksExecutor {
    fn launch_run<'a>(
        &'a self,
        source_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<LaunchedRun, AppError>> + Send + 'a>> {
        Box::pin(self.launch(source_id))
    }

    fn run_status(
        &self,
        run_id: u64,
    ) -> Pin<Box<dyn Future<Output = Result<RunStatusReport, AppError>> + Send + '_>> {
        Box::pin(self.status(run_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Azure Blob
// ─────────────────────────────────────────────────────────────────────────────

/// `BlobTransfer` backed by one Azure Blob container.
#[derive(Debug, Clone)]
pub struct AzureBlobTransfer {
    http: Arc<Client>,
    config: Arc<AppConfig>,
}

impl AzureBlobTransfer {
    pub fn new(http: Arc<Client>, config: Arc<AppConfig>) -> Self {
        Self { http, config }
    }

    fn client(&self) -> Result<BlobClient, AppError> {
        let settings = self.config.azure()?;
        Ok(BlobClient::new(
            self.http.clone(),
            settings.endpoint,
            settings.container,
            settings.sas_token,
        ))
    }

    async fn upload(
        &self,
        blob_path: &str,
        file_path: &Path,
        on_progress: ProgressCallback,
    ) -> Result<(), AppError> {
        self.client()?
            .put_file(blob_path, file_path, content_type_for(file_path), on_progress)
            .await
    }

    async fn download(&self, blob_path: &str) -> Result<String, AppError> {
        self.client()?.get_text(blob_path).await
    }
}

impl BlobTransfer for AzureBlobTransfer {
    fn upload_file<'a>(
        &'a self,
        blob_path: &'a str,
        file_path: &'a Path,
        on_progress: ProgressCallback,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(self.upload(blob_path, file_path, on_progress))
    }

    fn fetch_text<'a>(
        &'a self,
        blob_path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>> {
        Box::pin(self.download(blob_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, extra: &[(&str, &str)]) -> Arc<AppConfig> {
        let mut vars: HashMap<String, String> = [
            ("DATABRICKS_INSTANCE", server.uri()),
            ("DATABRICKS_TOKEN", "dapi-test".to_string()),
            ("DATABRICKS_CLUSTER_ID", "0101-abc".to_string()),
            ("NOTEBOOK_PATH", "/Shared/mdc".to_string()),
            ("AZURE_ACCOUNT_NAME", "acct".to_string()),
            ("AZURE_CONTAINER_NAME", "uploads".to_string()),
            ("AZURE_SAS_TOKEN", "sv=1&sig=abc".to_string()),
            ("AZURE_BLOB_ENDPOINT", server.uri()),
            ("AZURE_UPLOAD_PATH", "incoming".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        Arc::new(AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap())
    }

    #[tokio::test]
    async fn launch_resolves_notebook_and_submits_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/workspace/list"))
            .and(query_param("path", "/Shared/mdc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "objects": [
                    {"path": "/Shared/mdc/Meta_Cube", "object_type": "NOTEBOOK"},
                    {"path": "/Shared/mdc/Google_Cube", "object_type": "NOTEBOOK"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/2.1/jobs/runs/submit"))
            .and(header("authorization", "Bearer dapi-test"))
            .and(body_json(serde_json::json!({
                "run_name": "Triggered from MDC App",
                "existing_cluster_id": "0101-abc",
                "notebook_task": {"notebook_path": "/Shared/mdc/Google_Cube"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"run_id": 77})))
            .expect(1)
            .mount(&server)
            .await;

        let executor = DatabricksExecutor::new(Arc::new(Client::new()), config_for(&server, &[]));
        let run = executor.launch_run("Google").await.unwrap();

        assert_eq!(run.run_id, 77);
        assert_eq!(run.notebook_path, "/Shared/mdc/Google_Cube");
    }

    #[tokio::test]
    async fn missing_databricks_settings_fail_lazily() {
        let config = Arc::new(AppConfig::from_lookup(|_| None).unwrap());
        let executor = DatabricksExecutor::new(Arc::new(Client::new()), config);

        let result = executor.run_status(1).await;

        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("DATABRICKS_INSTANCE")));
    }

    #[tokio::test]
    async fn upload_puts_block_blob_into_container() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/uploads/incoming/google_ads/sales.csv"))
            .and(header("x-ms-blob-type", "BlockBlob"))
            .and(header("content-type", "text/csv"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("sales.csv");
        std::fs::write(&file, "Week,Spend\n1,10\n").unwrap();

        let sent = Arc::new(AtomicU64::new(0));
        let seen = sent.clone();
        let progress: ProgressCallback = Arc::new(move |done, _| seen.store(done, Ordering::SeqCst));

        let transfer = AzureBlobTransfer::new(Arc::new(Client::new()), config_for(&server, &[]));
        transfer
            .upload_file("incoming/google_ads/sales.csv", &file, progress)
            .await
            .unwrap();

        assert_eq!(sent.load(Ordering::SeqCst), 16);
    }
}
