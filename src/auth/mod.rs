//! Identity service and the admin view gate.
//!
//! [`LocalAuth`] stands in for the managed auth service: anonymous sign-in
//! issues a fresh uid, custom-token sign-in only accepts tokens listed in the
//! store connection config.
//!
//! The passcode gate is a UI convenience. It controls which view a visitor
//! sees; it does not protect the store.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tokio::sync::watch;
use uuid::Uuid;

use crate::backend::{AuthError, AuthService, Identity};
use crate::errors::AppError;
use crate::site::gate::{SessionRegistry, View};

/// Header carrying the visitor's UI session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// In-process auth service.
pub struct LocalAuth {
    trusted_tokens: Vec<String>,
    state: watch::Sender<Option<Identity>>,
}

impl LocalAuth {
    pub fn new(trusted_tokens: Vec<String>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            trusted_tokens,
            state,
        }
    }
}

#[async_trait]
impl AuthService for LocalAuth {
    async fn sign_in_anonymously(&self) -> Result<Identity, AuthError> {
        let identity = Identity {
            uid: Uuid::new_v4().to_string(),
            is_anonymous: true,
        };
        self.state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Identity, AuthError> {
        let trusted = self
            .trusted_tokens
            .iter()
            .any(|candidate| constant_time_compare(candidate, token));
        if !trusted {
            return Err(AuthError::InvalidToken);
        }

        // Same token, same uid across restarts
        let identity = Identity {
            uid: Uuid::new_v5(&Uuid::NAMESPACE_OID, token.as_bytes()).to_string(),
            is_anonymous: false,
        };
        self.state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.state.send_replace(None);
        Ok(())
    }

    fn on_auth_state_changed(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }
}

/// Check a typed passcode against the configured one.
pub fn passcode_matches(typed: &str, expected: &str) -> bool {
    constant_time_compare(typed, expected)
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    // Constant-time comparison
    a_bytes.ct_eq(b_bytes).into()
}

/// Layer letting requests through only for UI sessions currently in the admin view.
pub async fn admin_view_layer(
    sessions: Arc<SessionRegistry>,
    request: Request,
    next: Next,
) -> Response {
    let session_id = request
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok());

    let Some(session_id) = session_id else {
        return forbidden_response("Missing or invalid session id");
    };

    match sessions.get(session_id).await {
        Some(session) if session.view() == View::Admin => next.run(request).await,
        Some(_) => forbidden_response("Admin view required"),
        None => forbidden_response("Unknown session"),
    }
}

fn forbidden_response(message: &str) -> Response {
    AppError::Forbidden(message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("admin123", "admin123"));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("admin123", "admin124"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("admin", "admin123"));
    }

    #[test]
    fn test_passcode_is_case_sensitive() {
        assert!(passcode_matches("admin123", "admin123"));
        assert!(!passcode_matches("ADMIN123", "admin123"));
        assert!(!passcode_matches("", "admin123"));
    }

    #[tokio::test]
    async fn test_anonymous_sign_in_publishes_identity() {
        let auth = LocalAuth::new(Vec::new());
        let mut changes = auth.on_auth_state_changed();
        assert!(changes.borrow_and_update().is_none());

        let identity = auth.sign_in_anonymously().await.unwrap();
        assert!(identity.is_anonymous);
        changes.changed().await.unwrap();
        assert_eq!(changes.borrow().clone(), Some(identity));
    }

    #[tokio::test]
    async fn test_custom_token_must_be_trusted() {
        let auth = LocalAuth::new(vec!["deploy-token".to_string()]);

        assert!(matches!(
            auth.sign_in_with_custom_token("other").await,
            Err(AuthError::InvalidToken)
        ));
        assert!(auth.on_auth_state_changed().borrow().is_none());

        let first = auth.sign_in_with_custom_token("deploy-token").await.unwrap();
        let second = auth.sign_in_with_custom_token("deploy-token").await.unwrap();
        assert!(!first.is_anonymous);
        assert_eq!(first.uid, second.uid);
    }

    #[tokio::test]
    async fn test_sign_out_clears_identity() {
        let auth = LocalAuth::new(Vec::new());
        auth.sign_in_anonymously().await.unwrap();
        auth.sign_out().await.unwrap();
        assert!(auth.on_auth_state_changed().borrow().is_none());
    }
}
