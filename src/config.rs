//! Environment-driven configuration.
//!
//! Values are read from the process environment after loading an optional
//! `.env` file. Service sections (Databricks, Azure) are validated lazily so
//! commands that never touch a service do not require its settings.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::databricks::ProgressTable;
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_RUN_NAME: &str = "Triggered from MDC App";
const DEFAULT_OUTPUT_PATH: &str = "output/MMM_Data_Cube/MMM_Data_Cube";
const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
const DEFAULT_ROWS_PER_PAGE: usize = 20;
const DATA_DIR_NAME: &str = ".mdc-uploader";

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings for the Databricks workspace.
#[derive(Clone)]
pub struct DatabricksSettings {
    pub instance: Url,
    pub token: SecretString,
    pub cluster_id: String,
    /// Workspace folder listed when resolving a source's notebook.
    pub notebook_folder: String,
    pub run_name: String,
}

impl std::fmt::Debug for DatabricksSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabricksSettings")
            .field("instance", &self.instance.as_str())
            .field("token", &"[REDACTED]")
            .field("cluster_id", &self.cluster_id)
            .field("notebook_folder", &self.notebook_folder)
            .field("run_name", &self.run_name)
            .finish()
    }
}

/// Connection settings for the Azure Blob container.
#[derive(Clone)]
pub struct AzureSettings {
    /// Account endpoint, e.g. `https://acct.blob.core.windows.net`.
    pub endpoint: Url,
    pub container: String,
    pub sas_token: SecretString,
    pub upload_prefix: String,
    /// Output artifact path without the `.csv` extension.
    pub output_path: String,
}

impl std::fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSettings")
            .field("endpoint", &self.endpoint.as_str())
            .field("container", &self.container)
            .field("sas_token", &"[REDACTED]")
            .field("upload_prefix", &self.upload_prefix)
            .field("output_path", &self.output_path)
            .finish()
    }
}

/// Tunables of the upload wizard itself.
#[derive(Debug, Clone)]
pub struct WizardSettings {
    pub poll_interval: Duration,
    pub progress_table: ProgressTable,
    pub rows_per_page: usize,
    pub upload_prefix: String,
    pub output_path: String,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            progress_table: ProgressTable::default(),
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
            upload_prefix: String::new(),
            output_path: DEFAULT_OUTPUT_PATH.to_string(),
        }
    }
}

/// Where job records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStoreKind {
    /// Local SQLite database in the data directory.
    Local,
    /// The MDC backend's notebook registry.
    Remote,
}

// ─────────────────────────────────────────────────────────────────────────────
// AppConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: Url,
    pub data_dir: PathBuf,
    pub record_store: RecordStoreKind,
    pub wizard: WizardSettings,
    databricks: Result<DatabricksSettings, String>,
    azure: Result<AzureSettings, String>,
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = parse_url("MDC_API_URL", &get("MDC_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into()))?;

        let data_dir = match get("MDC_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => get("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DATA_DIR_NAME),
        };

        let record_store = match get("MDC_RECORD_STORE").as_deref() {
            None | Some("local") => RecordStoreKind::Local,
            Some("remote") => RecordStoreKind::Remote,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "MDC_RECORD_STORE must be 'local' or 'remote', got '{}'",
                    other
                )))
            }
        };

        let poll_interval_ms = match get("MDC_POLL_INTERVAL_MS") {
            Some(raw) => raw.parse::<u64>().ok().filter(|ms| *ms > 0).ok_or_else(|| {
                AppError::Config(format!("MDC_POLL_INTERVAL_MS must be a positive integer, got '{}'", raw))
            })?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };

        let progress_table = match get("MDC_PROGRESS_TABLE") {
            Some(raw) => ProgressTable::default().with_overrides(&raw)?,
            None => ProgressTable::default(),
        };

        let output_path = get("AZURE_OUTPUT_PATH").unwrap_or_else(|| DEFAULT_OUTPUT_PATH.into());
        let upload_prefix = get("AZURE_UPLOAD_PATH").unwrap_or_default();

        let databricks = read_databricks(&get);
        let azure = read_azure(&get, &upload_prefix, &output_path);

        Ok(Self {
            api_url,
            data_dir,
            record_store,
            wizard: WizardSettings {
                poll_interval: Duration::from_millis(poll_interval_ms),
                progress_table,
                rows_per_page: DEFAULT_ROWS_PER_PAGE,
                upload_prefix,
                output_path,
            },
            databricks,
            azure,
        })
    }

    /// Databricks settings, or a configuration error naming what is missing.
    pub fn databricks(&self) -> Result<DatabricksSettings, AppError> {
        self.databricks.clone().map_err(AppError::Config)
    }

    /// Azure settings, or a configuration error naming what is missing.
    pub fn azure(&self) -> Result<AzureSettings, AppError> {
        self.azure.clone().map_err(AppError::Config)
    }

    /// Path of the SQLite database holding local job records.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("records.db")
    }

    /// Path of the wizard snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("wizard-snapshot.json")
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url, AppError> {
    Url::parse(raw).map_err(|e| AppError::Config(format!("{} is not a valid URL: {}", key, e)))
}

fn missing(keys: &[&str]) -> String {
    format!("missing environment variables: {}", keys.join(", "))
}

fn read_databricks<G>(get: &G) -> Result<DatabricksSettings, String>
where
    G: Fn(&str) -> Option<String>,
{
    let instance = get("DATABRICKS_INSTANCE");
    let token = get("DATABRICKS_TOKEN");
    let cluster_id = get("DATABRICKS_CLUSTER_ID");
    let folder = get("NOTEBOOK_PATH");

    let absent: Vec<&str> = [
        ("DATABRICKS_INSTANCE", instance.is_none()),
        ("DATABRICKS_TOKEN", token.is_none()),
        ("DATABRICKS_CLUSTER_ID", cluster_id.is_none()),
        ("NOTEBOOK_PATH", folder.is_none()),
    ]
    .iter()
    .filter(|(_, is_missing)| *is_missing)
    .map(|(key, _)| *key)
    .collect();

    match (instance, token, cluster_id, folder) {
        (Some(instance), Some(token), Some(cluster_id), Some(notebook_folder)) => {
            let instance = Url::parse(&instance)
                .map_err(|e| format!("DATABRICKS_INSTANCE is not a valid URL: {}", e))?;
            Ok(DatabricksSettings {
                instance,
                token: SecretString::from(token),
                cluster_id,
                notebook_folder,
                run_name: get("MDC_RUN_NAME").unwrap_or_else(|| DEFAULT_RUN_NAME.into()),
            })
        }
        _ => Err(missing(&absent)),
    }
}

fn read_azure<G>(get: &G, upload_prefix: &str, output_path: &str) -> Result<AzureSettings, String>
where
    G: Fn(&str) -> Option<String>,
{
    let account = get("AZURE_ACCOUNT_NAME");
    let container = get("AZURE_CONTAINER_NAME");
    let sas = get("AZURE_SAS_TOKEN");
    let endpoint_override = get("AZURE_BLOB_ENDPOINT");

    let mut absent = Vec::new();
    if account.is_none() && endpoint_override.is_none() {
        absent.push("AZURE_ACCOUNT_NAME");
    }
    if container.is_none() {
        absent.push("AZURE_CONTAINER_NAME");
    }
    if sas.is_none() {
        absent.push("AZURE_SAS_TOKEN");
    }
    if upload_prefix.is_empty() {
        absent.push("AZURE_UPLOAD_PATH");
    }
    if !absent.is_empty() {
        return Err(missing(&absent));
    }

    let endpoint_raw = match (endpoint_override, account) {
        (Some(endpoint), _) => endpoint,
        (None, Some(account)) => format!("https://{}.blob.core.windows.net", account),
        (None, None) => return Err(missing(&["AZURE_ACCOUNT_NAME"])),
    };
    let endpoint = Url::parse(&endpoint_raw)
        .map_err(|e| format!("Azure blob endpoint is not a valid URL: {}", e))?;

    Ok(AzureSettings {
        endpoint,
        container: container.unwrap_or_default(),
        sas_token: SecretString::from(sas.unwrap_or_default()),
        upload_prefix: upload_prefix.to_string(),
        output_path: output_path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = config_from(&[("HOME", "/home/ana")]).unwrap();

        assert_eq!(config.api_url.as_str(), "http://localhost:3000/");
        assert_eq!(config.data_dir, PathBuf::from("/home/ana/.mdc-uploader"));
        assert_eq!(config.record_store, RecordStoreKind::Local);
        assert_eq!(config.wizard.poll_interval, Duration::from_secs(3));
        assert_eq!(config.wizard.rows_per_page, 20);
        assert_eq!(config.wizard.output_path, "output/MMM_Data_Cube/MMM_Data_Cube");
    }

    #[test]
    fn missing_service_settings_fail_lazily() {
        let config = config_from(&[]).unwrap();

        let err = config.databricks().unwrap_err();
        assert!(
            matches!(&err, AppError::Config(msg) if msg.contains("DATABRICKS_TOKEN") && msg.contains("NOTEBOOK_PATH")),
            "unexpected error: {:?}",
            err
        );
        assert!(matches!(config.azure(), Err(AppError::Config(_))));
    }

    #[test]
    fn databricks_section_reads_all_fields() {
        let config = config_from(&[
            ("DATABRICKS_INSTANCE", "https://adb-1.azuredatabricks.net"),
            ("DATABRICKS_TOKEN", "dapi-secret"),
            ("DATABRICKS_CLUSTER_ID", "0101-abc"),
            ("NOTEBOOK_PATH", "/Shared/MMM"),
        ])
        .unwrap();

        let settings = config.databricks().unwrap();
        assert_eq!(settings.cluster_id, "0101-abc");
        assert_eq!(settings.notebook_folder, "/Shared/MMM");
        assert_eq!(settings.run_name, "Triggered from MDC App");
        assert_eq!(settings.token.expose_secret(), "dapi-secret");
        assert!(!format!("{:?}", settings).contains("dapi-secret"));
    }

    #[test]
    fn azure_endpoint_is_derived_from_account() {
        let config = config_from(&[
            ("AZURE_ACCOUNT_NAME", "mdcstore"),
            ("AZURE_CONTAINER_NAME", "uploads"),
            ("AZURE_SAS_TOKEN", "?sv=1&sig=abc"),
            ("AZURE_UPLOAD_PATH", "input/raw"),
        ])
        .unwrap();

        let azure = config.azure().unwrap();
        assert_eq!(azure.endpoint.as_str(), "https://mdcstore.blob.core.windows.net/");
        assert_eq!(azure.upload_prefix, "input/raw");
        assert!(!format!("{:?}", azure).contains("sig=abc"));
    }

    #[test]
    fn poll_interval_and_progress_table_are_configurable() {
        let config = config_from(&[
            ("MDC_POLL_INTERVAL_MS", "500"),
            ("MDC_PROGRESS_TABLE", "RUNNING=75"),
        ])
        .unwrap();

        assert_eq!(config.wizard.poll_interval, Duration::from_millis(500));
        assert_eq!(config.wizard.progress_table.progress_for("RUNNING"), 75);
        assert_eq!(config.wizard.progress_table.progress_for("QUEUED"), 20);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            config_from(&[("MDC_POLL_INTERVAL_MS", "0")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("MDC_RECORD_STORE", "cloud")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("MDC_API_URL", "not a url")]),
            Err(AppError::Config(_))
        ));
    }
}
