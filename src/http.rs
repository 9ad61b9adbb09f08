//! Shared HTTP plumbing: client construction, log-safe URLs and error mapping.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all outgoing requests.
const CLIENT_USER_AGENT: &str = concat!("mdc-uploader/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds. Large blob uploads share this budget.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Query parameter keys (case-insensitive) that should have their values redacted.
/// `sig` is the signature part of an Azure SAS token.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "sig",
    "token",
    "access_token",
    "password",
    "authorization",
];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingMode {
    /// Log only the path component.
    /// Example: `/api/2.1/jobs/runs/get`
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact sensitive values.
    /// Example: `/container/file.csv?sv=2022-11-02&sig=***`
    PathAndQueryRedacted,
}

fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging based on the specified mode.
///
/// The result never contains the scheme, host, or fragment.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted_pairs: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted_pairs.join("&"))
        }
    }
}

/// Builds the HTTP client shared by every service client.
pub fn build_http_client() -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Error responses
// ─────────────────────────────────────────────────────────────────────────────

/// JSON error bodies seen across the backend and Databricks.
#[derive(Debug, Deserialize)]
struct JsonErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Converts a non-success response into an `AppError`.
///
/// 429 becomes `RateLimited` (honouring `Retry-After`), 404 becomes `NotFound`,
/// everything else is wrapped by `wrap` with the best message found in the body.
pub(crate) async fn error_from_response(
    response: reqwest::Response,
    what: &str,
    wrap: fn(String) -> AppError,
) -> AppError {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound(format!("{} not found", what));
    }

    let body = response.text().await.unwrap_or_default();
    match describe_error_body(&body) {
        Some(detail) => wrap(format!("HTTP {} - {}", status.as_u16(), detail)),
        None => wrap(format!(
            "HTTP {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        )),
    }
}

/// Extracts a readable message from a JSON or Azure XML error body.
fn describe_error_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<JsonErrorBody>(trimmed) {
        let error_text = match parsed.error {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Object(obj)) => obj
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        };
        let message = parsed.message.or(error_text)?;
        return Some(match parsed.error_code {
            Some(code) => format!("[{}] {}", code, message),
            None => message,
        });
    }

    // Azure Storage: <Error><Code>AuthenticationFailed</Code><Message>...</Message></Error>
    let code = xml_element(trimmed, "Code")?;
    Some(match xml_element(trimmed, "Message") {
        Some(message) => {
            let first_line = message.lines().next().unwrap_or_default().to_string();
            format!("[{}] {}", code, first_line)
        }
        None => code,
    })
}

fn xml_element(body: &str, name: &str) -> Option<String> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim().to_string())
}

/// Redacts an identifier for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &id[..idx]),
        None => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn sanitize_strips_scheme_and_host() {
        let url = Url::parse("https://acct.blob.core.windows.net/uploads/a.csv").unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathOnly);

        assert_eq!(result, "/uploads/a.csv");
        assert!(!result.contains("windows.net"));
    }

    #[test]
    fn sanitize_redacts_sas_signature() {
        let url = Url::parse(
            "https://acct.blob.core.windows.net/c/a.csv?sv=2022-11-02&sp=rw&sig=abc%2Bdef",
        )
        .unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted);

        assert_eq!(result, "/c/a.csv?sv=2022-11-02&sp=rw&sig=***");
        assert!(!result.contains("abc"));
    }

    #[test]
    fn sanitize_strips_fragment() {
        let url = Url::parse("https://example.com/path?safe=value#secret-anchor").unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted);

        assert_eq!(result, "/path?safe=value");
    }

    #[test]
    fn sensitive_param_match_is_case_insensitive() {
        let url = Url::parse("https://example.com/p?SIG=1&Token=2&run_id=3").unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted);

        assert_eq!(result, "/p?SIG=***&Token=***&run_id=3");
    }

    #[test]
    fn build_http_client_succeeds() {
        assert!(build_http_client().is_ok());
    }

    #[test]
    fn describes_databricks_json_error() {
        let body = r#"{"error_code":"INVALID_PARAMETER_VALUE","message":"Cluster 1 does not exist"}"#;
        assert_eq!(
            describe_error_body(body).as_deref(),
            Some("[INVALID_PARAMETER_VALUE] Cluster 1 does not exist")
        );
    }

    #[test]
    fn describes_backend_json_error() {
        let body = r#"{"error":"Missing required fields in request body","missingFields":["id"]}"#;
        assert_eq!(
            describe_error_body(body).as_deref(),
            Some("Missing required fields in request body")
        );
    }

    #[test]
    fn describes_azure_xml_error() {
        let body = "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>AuthenticationFailed</Code><Message>Server failed to authenticate the request.\nRequestId:1</Message></Error>";
        assert_eq!(
            describe_error_body(body).as_deref(),
            Some("[AuthenticationFailed] Server failed to authenticate the request.")
        );
    }

    #[test]
    fn redact_id_truncates_long_ids() {
        assert_eq!(redact_id("0123456789abcdef"), "01234567...");
        assert_eq!(redact_id("short"), "short");
    }

    #[tokio::test]
    async fn maps_rate_limit_and_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();

        let first = client.get(server.uri()).send().await.unwrap();
        let err = error_from_response(first, "Run", AppError::Service).await;
        assert!(matches!(err, AppError::RateLimited { retry_after_secs: Some(12) }));

        let second = client.get(server.uri()).send().await.unwrap();
        let err = error_from_response(second, "Run", AppError::Service).await;
        assert!(matches!(err, AppError::NotFound(msg) if msg == "Run not found"));
    }

    #[tokio::test]
    async fn falls_back_to_status_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let response = reqwest::Client::new().get(server.uri()).send().await.unwrap();
        let err = error_from_response(response, "Run", AppError::TransferFailed).await;

        assert!(
            matches!(&err, AppError::TransferFailed(msg) if msg == "HTTP 503 - Service Unavailable"),
            "unexpected error: {:?}",
            err
        );
    }
}
