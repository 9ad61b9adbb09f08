//! Azure Blob Storage client authenticated with a SAS token.
//!
//! This module provides functionality to:
//! - Stream-upload a local file as a block blob with byte progress
//! - Download a text blob (the notebook's CSV output)
//!
//! # Security
//!
//! - The SAS token is never logged; URLs are logged with `sig` redacted
//! - File contents are never logged

use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::io::ReaderStream;
use tracing::info;
use url::Url;

use crate::error::AppError;
use crate::http::{error_from_response, sanitize_url_for_logs, LoggingMode};

/// Called with `(bytes_sent, total_bytes)` as the upload body is streamed.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Composes `{prefix}/{source}/{file_name}`, ignoring stray slashes.
pub fn blob_path(prefix: &str, source: &str, file_name: &str) -> String {
    [prefix, source, file_name]
        .iter()
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// MIME type sent with an uploaded file.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsm" => "application/vnd.ms-excel.sheet.macroEnabled.12",
        "xlsb" => "application/vnd.ms-excel.sheet.binary.macroEnabled.12",
        "xls" => "application/vnd.ms-excel",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BlobClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for one Azure Blob container.
#[derive(Clone)]
pub struct BlobClient {
    client: Arc<Client>,
    /// Account endpoint (e.g., "https://acct.blob.core.windows.net").
    endpoint: Url,
    container: String,
    /// SAS query string, without the leading `?`.
    sas_token: SecretString,
}

impl BlobClient {
    pub fn new(client: Arc<Client>, endpoint: Url, container: String, sas_token: SecretString) -> Self {
        let sas = sas_token.expose_secret().trim_start_matches('?').to_string();
        Self {
            client,
            endpoint,
            container,
            sas_token: SecretString::from(sas),
        }
    }

    /// Streams `file_path` to `blob_path` as a block blob.
    ///
    /// The file is never fully loaded into memory. `on_progress` is invoked
    /// for every chunk handed to the connection.
    pub async fn put_file(
        &self,
        blob_path: &str,
        file_path: &Path,
        content_type: &str,
        on_progress: ProgressCallback,
    ) -> Result<(), AppError> {
        let url = self.blob_url(blob_path)?;

        let file = tokio::fs::File::open(file_path).await.map_err(|e| {
            AppError::TransferFailed(format!("Failed to open file for upload: {}", e))
        })?;
        let total = file
            .metadata()
            .await
            .map_err(|e| AppError::TransferFailed(format!("Failed to read file metadata: {}", e)))?
            .len();

        let mut sent = 0u64;
        let progress = on_progress.clone();
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                progress(sent, total);
            }
            chunk
        });

        info!(
            "[BLOB] PUT {} ({} bytes)",
            sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted),
            total
        );

        let response = self
            .client
            .put(url.clone())
            .header("x-ms-blob-type", "BlockBlob")
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| AppError::TransferFailed(format!("Upload request failed: {}", e.without_url())))?;

        let status = response.status();
        info!(
            "[BLOB] PUT {} -> {}",
            sanitize_url_for_logs(&url, LoggingMode::PathOnly),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(error_from_response(response, "Container", AppError::TransferFailed).await);
        }

        if total == 0 {
            on_progress(0, 0);
        }

        Ok(())
    }

    /// Downloads a blob as UTF-8 text.
    pub async fn get_text(&self, blob_path: &str) -> Result<String, AppError> {
        let url = self.blob_url(blob_path)?;

        info!(
            "[BLOB] GET {}",
            sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted)
        );

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Download failed: {}", e.without_url())))?;

        let status = response.status();
        info!(
            "[BLOB] GET {} -> {}",
            sanitize_url_for_logs(&url, LoggingMode::PathOnly),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(error_from_response(response, "Output file", AppError::Service).await);
        }

        response
            .text()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Failed to read blob body: {}", e.without_url())))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// `{endpoint}/{container}/{blob_path}?{sas}` with each path segment encoded.
    fn blob_url(&self, blob_path: &str) -> Result<Url, AppError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AppError::Config("Azure blob endpoint cannot be a base URL".into()))?;
            segments.pop_if_empty();
            segments.push(&self.container);
            for part in blob_path.split('/').filter(|p| !p.is_empty()) {
                segments.push(part);
            }
        }
        let sas = self.sas_token.expose_secret();
        if !sas.is_empty() {
            url.set_query(Some(sas));
        }
        Ok(url)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
