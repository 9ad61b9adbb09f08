//! Shared setup for command tests.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::SecretString;
use tempfile::TempDir;

use crate::backend::{BackendClient, Session, UserProfile};
use crate::config::AppConfig;
use crate::state::AppState;

/// State backed by a temporary data directory and a backend at `api_url`.
/// The keychain is not touched.
pub async fn state_for(api_url: &str, extra: &[(&str, &str)]) -> (TempDir, AppState) {
    let dir = TempDir::new().unwrap();
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("MDC_API_URL".into(), api_url.into());
    vars.insert("MDC_DATA_DIR".into(), dir.path().to_string_lossy().into_owned());
    vars.insert("MDC_POLL_INTERVAL_MS".into(), "5".into());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }

    let config = AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
    let http = Arc::new(reqwest::Client::new());
    let backend = BackendClient::new(http.clone(), config.api_url.clone());
    let state = AppState::with_backend(config, http, backend).await.unwrap();
    (dir, state)
}

pub async fn sign_in(state: &AppState) -> UserProfile {
    let user = UserProfile {
        id: "7".into(),
        username: "ana".into(),
        email: "ana@example.com".into(),
    };
    state
        .backend
        .set_session(Some(Session {
            user: user.clone(),
            token: SecretString::from("jwt-test"),
        }))
        .await;
    user
}
