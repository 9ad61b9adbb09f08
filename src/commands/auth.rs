//! Account commands.
//!
//! These commands handle:
//! - Signing in and out (the session is kept in the OS keychain)
//! - Creating an account
//! - Changing the signed-in user's password

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::backend::UserProfile;
use crate::error::AppError;
use crate::state::AppState;

/// Signs in and stores the session.
pub async fn login(
    state: &AppState,
    email: &str,
    password: &SecretString,
) -> Result<UserProfile, AppError> {
    let email = email.trim();
    if email.is_empty() || password.expose_secret().is_empty() {
        return Err(AppError::InvalidInput("Email and password are required".into()));
    }

    info!("[BACKEND] Signing in");
    state.backend.login(email, password).await
}

/// Creates an account. The new user still has to sign in.
pub async fn register(
    state: &AppState,
    username: &str,
    email: &str,
    password: &SecretString,
) -> Result<UserProfile, AppError> {
    let (username, email) = (username.trim(), email.trim());
    if username.is_empty() || email.is_empty() || password.expose_secret().is_empty() {
        return Err(AppError::InvalidInput(
            "Username, email and password are required".into(),
        ));
    }

    let user = state.backend.register(username, email, password).await?;
    info!("[BACKEND] Registered user {}", user.id);
    Ok(user)
}

/// Forgets the stored session.
pub async fn logout(state: &AppState) -> Result<(), AppError> {
    state.backend.logout().await
}

pub async fn whoami(state: &AppState) -> Result<UserProfile, AppError> {
    state.backend.require_user().await
}

pub async fn change_password(
    state: &AppState,
    current: &SecretString,
    new: &SecretString,
) -> Result<(), AppError> {
    if new.expose_secret().is_empty() {
        return Err(AppError::InvalidInput("The new password cannot be empty".into()));
    }
    if new.expose_secret() == current.expose_secret() {
        return Err(AppError::InvalidInput(
            "The new password must differ from the current one".into(),
        ));
    }

    state.backend.require_user().await?;
    state.backend.change_password(current, new).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::state_for;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn login_then_whoami_then_logout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "jwt-1",
                "user": {"id": 3, "username": "ana", "email": "ana@example.com"}
            })))
            .mount(&server)
            .await;
        let (_dir, state) = state_for(&server.uri(), &[]).await;

        let user = login(&state, " ana@example.com ", &SecretString::from("pw")).await.unwrap();
        assert_eq!(user.id, "3");
        assert_eq!(whoami(&state).await.unwrap(), user);

        logout(&state).await.unwrap();
        assert!(matches!(whoami(&state).await, Err(AppError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn login_rejects_blank_credentials_locally() {
        let (_dir, state) = state_for("http://127.0.0.1:9", &[]).await;

        let result = login(&state, "  ", &SecretString::from("pw")).await;

        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn change_password_requires_session_and_new_value() {
        let (_dir, state) = state_for("http://127.0.0.1:9", &[]).await;
        let old = SecretString::from("old");

        assert!(matches!(
            change_password(&state, &old, &SecretString::from("")).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            change_password(&state, &old, &SecretString::from("old")).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            change_password(&state, &old, &SecretString::from("new")).await,
            Err(AppError::NotAuthenticated)
        ));
    }
}
