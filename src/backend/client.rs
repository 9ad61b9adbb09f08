//! MDC backend HTTP client with session handling and safe logging.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use url::Url;

use crate::backend::auth::{self, UserProfile};
use crate::error::AppError;
use crate::http::{sanitize_url_for_logs, LoggingMode};
use crate::storage::credentials::{self as keychain, StoredSession};

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// A signed-in user and the bearer token issued for them.
#[derive(Clone)]
pub struct Session {
    pub user: UserProfile,
    pub token: SecretString,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// The backend answers 401 for a missing token and 403 for an invalid or
/// expired one. Both mean the session needs renewing.
fn is_token_rejected(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
}

// ─────────────────────────────────────────────────────────────────────────────
// BackendClient
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe client for the MDC backend.
///
/// # Thread Safety
///
/// - `session`: `RwLock` allowing concurrent requests but exclusive writes
///   on login, logout and token refresh.
/// - `refresh_lock`: serializes refresh attempts so concurrent 403s trigger a
///   single refresh.
#[derive(Clone)]
pub struct BackendClient {
    http: Arc<reqwest::Client>,
    base_url: Url,
    session: Arc<RwLock<Option<Session>>>,
    refresh_lock: Arc<Mutex<()>>,
    logging_mode: LoggingMode,
    /// Mirror session changes into the OS keychain.
    persist_session: bool,
}

impl BackendClient {
    pub fn new(http: Arc<reqwest::Client>, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            session: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            logging_mode: LoggingMode::default(),
            persist_session: false,
        }
    }

    /// Updates the logging mode for URL sanitization.
    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    /// Keeps the OS keychain in sync with login, refresh and logout.
    pub fn with_keychain(mut self) -> Self {
        self.persist_session = true;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Replaces the in-memory session.
    pub async fn set_session(&self, session: Option<Session>) {
        let mut guard = self.session.write().await;
        *guard = session;
    }

    /// The signed-in user, if any.
    pub async fn current_user(&self) -> Option<UserProfile> {
        self.session.read().await.as_ref().map(|s| s.user.clone())
    }

    /// The signed-in user, or `NotAuthenticated`.
    pub async fn require_user(&self) -> Result<UserProfile, AppError> {
        self.current_user().await.ok_or(AppError::NotAuthenticated)
    }

    /// Loads a previously persisted session from the keychain.
    ///
    /// Returns `false` when nothing is stored.
    pub async fn restore_session(&self) -> Result<bool, AppError> {
        match keychain::get_session().await {
            Ok(stored) => {
                self.set_session(Some(Session {
                    user: stored.user,
                    token: SecretString::from(stored.token),
                }))
                .await;
                Ok(true)
            }
            Err(AppError::NotAuthenticated) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Account operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Signs in and makes the returned session current.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<UserProfile, AppError> {
        let response = auth::login(&self.http, &self.base_url, email, password).await?;
        let session = Session {
            user: response.user.clone(),
            token: SecretString::from(response.token),
        };
        self.persist(&session).await?;
        self.set_session(Some(session)).await;
        info!("[BACKEND] Signed in as user {}", response.user.id);
        Ok(response.user)
    }

    /// Creates an account. Does not sign in.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<UserProfile, AppError> {
        auth::register(&self.http, &self.base_url, username, email, password).await
    }

    /// Drops the current session locally and from the keychain.
    pub async fn logout(&self) -> Result<(), AppError> {
        self.set_session(None).await;
        if self.persist_session {
            keychain::delete_session().await?;
        }
        info!("[BACKEND] Signed out");
        Ok(())
    }

    /// Changes the signed-in user's password.
    ///
    /// A 401 here means the current password was wrong, so this call does not
    /// go through the refresh-and-retry path.
    pub async fn change_password(
        &self,
        current_password: &SecretString,
        new_password: &SecretString,
    ) -> Result<(), AppError> {
        let token = self.current_token().await?;
        let url = self.url_for("/api/users/change-password")?;
        let body = serde_json::to_vec(&serde_json::json!({
            "currentPassword": current_password.expose_secret(),
            "newPassword": new_password.expose_secret(),
        }))
        .map_err(|e| AppError::Internal(format!("Failed to encode request: {}", e)))?;

        let response = self
            .execute_authed_request(Method::POST, url, Some(body), token.expose_secret())
            .await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let message = auth::response_message(response).await;
        match status {
            reqwest::StatusCode::UNAUTHORIZED => Err(AppError::InvalidInput(
                message.unwrap_or_else(|| "Current password is incorrect.".to_string()),
            )),
            reqwest::StatusCode::FORBIDDEN => Err(AppError::SessionExpired),
            reqwest::StatusCode::BAD_REQUEST | reqwest::StatusCode::NOT_FOUND => Err(
                AppError::InvalidInput(message.unwrap_or_else(|| "Request was rejected.".to_string())),
            ),
            _ => Err(AppError::Service(format!(
                "HTTP {} - {}",
                status.as_u16(),
                message.unwrap_or_else(|| "Request failed.".to_string())
            ))),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authenticated requests
    // ─────────────────────────────────────────────────────────────────────────

    /// Executes an authenticated request with automatic token refresh.
    ///
    /// On a rejected token the session is renewed once (double-checked under
    /// `refresh_lock`) and the request retried.
    ///
    /// # Errors
    ///
    /// - `AppError::NotAuthenticated` - No session
    /// - `AppError::SessionExpired` - Refresh failed or the retry was rejected too
    /// - `AppError::ConnectionFailed` - Network error
    pub async fn request_authed(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, AppError> {
        let url = self.url_for(path)?;
        let original_token = self.current_token().await?;

        let response = self
            .execute_authed_request(
                method.clone(),
                url.clone(),
                body.clone(),
                original_token.expose_secret(),
            )
            .await?;

        if !is_token_rejected(response.status()) {
            return Ok(response);
        }

        info!(
            "[BACKEND] Received {}, attempting token refresh...",
            response.status().as_u16()
        );

        {
            let _refresh_guard = self.refresh_lock.lock().await;

            let current_token = self.current_token().await?;
            if current_token.expose_secret() != original_token.expose_secret() {
                info!("[BACKEND] Token already refreshed by another task");
            } else {
                self.do_token_refresh(&current_token).await?;
            }
        }

        let new_token = self.current_token().await?;
        let retry_response = self
            .execute_authed_request(method, url, body, new_token.expose_secret())
            .await?;

        if is_token_rejected(retry_response.status()) {
            warn!("[BACKEND] Still unauthorized after token refresh");
            return Err(AppError::SessionExpired);
        }

        Ok(retry_response)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn url_for(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|_| AppError::Internal(format!("Invalid path: {}", path)))
    }

    async fn current_token(&self) -> Result<SecretString, AppError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or(AppError::NotAuthenticated)
    }

    async fn persist(&self, session: &Session) -> Result<(), AppError> {
        if !self.persist_session {
            return Ok(());
        }
        keychain::store_session(&StoredSession {
            user: session.user.clone(),
            token: session.token.expose_secret().to_string(),
        })
        .await
    }

    /// Executes a single authenticated request (no retry logic).
    ///
    /// Never logs the Authorization header or bodies.
    async fn execute_authed_request(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        token: &str,
    ) -> Result<reqwest::Response, AppError> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url, self.logging_mode);

        let mut request = self.http.request(method.clone(), url.as_str()).bearer_auth(token);
        if let Some(body_bytes) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body_bytes);
        }

        let result = request.send().await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                info!(
                    "[BACKEND] {} {} {} {}ms",
                    method,
                    sanitized_url,
                    response.status().as_u16(),
                    duration_ms
                );
                Ok(response)
            }
            Err(_) => {
                info!("[BACKEND] {} {} FAILED {}ms", method, sanitized_url, duration_ms);
                Err(AppError::ConnectionFailed(
                    "Connection to the MDC backend failed".to_string(),
                ))
            }
        }
    }

    async fn do_token_refresh(&self, token: &SecretString) -> Result<(), AppError> {
        let fresh = auth::refresh_token(&self.http, &self.base_url, token).await?;

        let updated = {
            let mut guard = self.session.write().await;
            let session = guard.as_mut().ok_or(AppError::NotAuthenticated)?;
            session.token = fresh;
            session.clone()
        };

        self.persist(&updated).await?;
        info!("[BACKEND] Token refresh complete, session updated");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user() -> UserProfile {
        UserProfile {
            id: "7".to_string(),
            username: "ana".to_string(),
            email: "ana@mdc.io".to_string(),
        }
    }

    async fn signed_in_client(mock_url: &str, token: &str) -> BackendClient {
        let client = BackendClient::new(Arc::new(reqwest::Client::new()), Url::parse(mock_url).unwrap());
        client
            .set_session(Some(Session {
                user: user(),
                token: SecretString::from(token.to_string()),
            }))
            .await;
        client
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = Session {
            user: user(),
            token: SecretString::from("secret_jwt_123"),
        };

        let debug_output = format!("{:?}", session);

        assert!(!debug_output.contains("secret_jwt_123"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn request_without_session_is_not_authenticated() {
        let client = BackendClient::new(
            Arc::new(reqwest::Client::new()),
            Url::parse("http://127.0.0.1:9").unwrap(),
        );

        let result = client
            .request_authed(Method::GET, "/api/dashboard/metrics", None)
            .await;

        assert!(matches!(result, Err(AppError::NotAuthenticated)));
        assert!(matches!(client.require_user().await, Err(AppError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn request_authed_attaches_bearer_token() {
        let server = MockServer::start().await;
        let client = signed_in_client(&server.uri(), "test_token").await;

        Mock::given(method("GET"))
            .and(path("/api/databricks/user-notebooks/7"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"notebooks": []})))
            .expect(1)
            .mount(&server)
            .await;

        let response = client
            .request_authed(Method::GET, "/api/databricks/user-notebooks/7", None)
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_and_retried() {
        let server = MockServer::start().await;
        let client = signed_in_client(&server.uri(), "old_token").await;

        Mock::given(method("GET"))
            .and(path("/api/dashboard/metrics"))
            .and(header("Authorization", "Bearer old_token"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "message": "Invalid or expired token"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token"))
            .and(body_json(serde_json::json!({"token": "old_token"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "new_token"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/dashboard/metrics"))
            .and(header("Authorization", "Bearer new_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"totalUploads": 0})))
            .expect(1)
            .mount(&server)
            .await;

        let response = client
            .request_authed(Method::GET, "/api/dashboard/metrics", None)
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(client.current_token().await.unwrap().expose_secret(), "new_token");
    }

    #[tokio::test]
    async fn failed_refresh_means_session_expired() {
        let server = MockServer::start().await;
        let client = signed_in_client(&server.uri(), "old_token").await;

        Mock::given(method("GET"))
            .and(path("/api/dashboard/metrics"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({"message": "Invalid token."})))
            .mount(&server)
            .await;

        let result = client
            .request_authed(Method::GET, "/api/dashboard/metrics", None)
            .await;

        assert!(matches!(result, Err(AppError::SessionExpired)));
    }

    #[tokio::test]
    async fn wrong_current_password_is_invalid_input() {
        let server = MockServer::start().await;
        let client = signed_in_client(&server.uri(), "test_token").await;

        Mock::given(method("POST"))
            .and(path("/api/users/change-password"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "message": "Current password is incorrect."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client
            .change_password(&SecretString::from("wrong"), &SecretString::from("next"))
            .await;

        assert!(
            matches!(&result, Err(AppError::InvalidInput(msg)) if msg == "Current password is incorrect."),
            "unexpected result: {:?}",
            result
        );
    }

    #[tokio::test]
    async fn login_makes_session_current_and_logout_clears_it() {
        let server = MockServer::start().await;
        let client = BackendClient::new(Arc::new(reqwest::Client::new()), Url::parse(&server.uri()).unwrap());

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "jwt",
                "user": {"id": 7, "username": "ana", "email": "ana@mdc.io"}
            })))
            .mount(&server)
            .await;

        let profile = client
            .login("ana@mdc.io", &SecretString::from("pw"))
            .await
            .unwrap();
        assert_eq!(profile, user());
        assert_eq!(client.current_user().await, Some(user()));

        client.logout().await.unwrap();
        assert_eq!(client.current_user().await, None);
    }
}
