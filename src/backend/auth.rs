//! Account endpoints of the MDC backend: register, login and token refresh.
//!
//! These calls run before a session exists (or to renew one), so they do not
//! go through `BackendClient::request_authed`.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info};
use url::Url;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Backend user id. Numeric on the wire, kept as a string locally.
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Response of `POST /api/auth/login`.
#[derive(Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Deserialize)]
struct RegisterResponse {
    user: UserProfile,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: Option<String>,
}

pub(crate) fn id_from_number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected user id as number or string, got {}",
            other
        ))),
    }
}

/// Reads the backend's `{"message": "..."}` error body, if any.
pub(crate) async fn response_message(response: reqwest::Response) -> Option<String> {
    let body = response.text().await.ok()?;
    serde_json::from_str::<MessageBody>(&body).ok()?.message
}

fn endpoint(base_url: &Url, path: &str) -> Result<Url, AppError> {
    base_url
        .join(path)
        .map_err(|e| AppError::Internal(format!("Invalid backend URL: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Account calls
// ─────────────────────────────────────────────────────────────────────────────

/// Exchanges email and password for a bearer token.
///
/// # Errors
///
/// - `AppError::LoginFailed` - Credentials rejected (400/401)
/// - `AppError::ConnectionFailed` - Network error
///
/// # Security
///
/// This function never logs the password or the issued token.
pub async fn login(
    http: &reqwest::Client,
    base_url: &Url,
    email: &str,
    password: &SecretString,
) -> Result<LoginResponse, AppError> {
    let url = endpoint(base_url, "/api/auth/login")?;

    info!("[BACKEND] POST /api/auth/login");

    let body = serde_json::json!({
        "email": email,
        "password": password.expose_secret(),
    });

    let response = http.post(url).json(&body).send().await.map_err(|_| {
        error!("[BACKEND] Login request failed");
        AppError::ConnectionFailed("Failed to connect for login".to_string())
    })?;

    let status = response.status();
    info!("[BACKEND] POST /api/auth/login -> {}", status.as_u16());

    if status.is_success() {
        return response.json::<LoginResponse>().await.map_err(|_| {
            error!("[BACKEND] Failed to parse login response");
            AppError::Service("Invalid login response".to_string())
        });
    }

    let message = response_message(response).await;
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST {
        Err(AppError::LoginFailed(
            message.unwrap_or_else(|| "Invalid credentials.".to_string()),
        ))
    } else {
        Err(AppError::Service(format!(
            "HTTP {} - {}",
            status.as_u16(),
            message.unwrap_or_else(|| "Login failed.".to_string())
        )))
    }
}

/// Creates an account. Returns the new user's profile.
pub async fn register(
    http: &reqwest::Client,
    base_url: &Url,
    username: &str,
    email: &str,
    password: &SecretString,
) -> Result<UserProfile, AppError> {
    let url = endpoint(base_url, "/api/auth/register")?;

    info!("[BACKEND] POST /api/auth/register");

    let body = serde_json::json!({
        "username": username,
        "email": email,
        "password": password.expose_secret(),
    });

    let response = http
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|_| AppError::ConnectionFailed("Failed to connect for registration".to_string()))?;

    let status = response.status();
    info!("[BACKEND] POST /api/auth/register -> {}", status.as_u16());

    if status.is_success() {
        let registered: RegisterResponse = response
            .json()
            .await
            .map_err(|_| AppError::Service("Invalid registration response".to_string()))?;
        return Ok(registered.user);
    }

    let message = response_message(response).await;
    if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::CONFLICT {
        Err(AppError::InvalidInput(
            message.unwrap_or_else(|| "Registration was rejected.".to_string()),
        ))
    } else {
        Err(AppError::Service(format!(
            "HTTP {} - {}",
            status.as_u16(),
            message.unwrap_or_else(|| "Registration failed.".to_string())
        )))
    }
}

/// Exchanges a still-verifiable token for a fresh one.
///
/// # Errors
///
/// - `AppError::SessionExpired` - The token can no longer be refreshed
/// - `AppError::ConnectionFailed` - Network error during refresh
pub async fn refresh_token(
    http: &reqwest::Client,
    base_url: &Url,
    token: &SecretString,
) -> Result<SecretString, AppError> {
    let url = endpoint(base_url, "/api/auth/token")?;

    info!("[BACKEND] Refreshing session token...");

    let response = http
        .post(url)
        .json(&serde_json::json!({ "token": token.expose_secret() }))
        .send()
        .await
        .map_err(|_| {
            error!("[BACKEND] Token refresh request failed");
            AppError::ConnectionFailed("Failed to connect for token refresh".to_string())
        })?;

    let status = response.status();

    if status.is_success() {
        let refreshed: TokenResponse = response.json().await.map_err(|_| {
            error!("[BACKEND] Failed to parse token refresh response");
            AppError::Service("Invalid token refresh response".to_string())
        })?;
        info!("[BACKEND] Token refresh successful");
        Ok(SecretString::from(refreshed.token))
    } else if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED {
        error!("[BACKEND] Token refresh failed: {}", status);
        Err(AppError::SessionExpired)
    } else {
        error!("[BACKEND] Token refresh failed with status: {}", status);
        Err(AppError::Service(format!("Token refresh failed: HTTP {}", status.as_u16())))
    }
}
