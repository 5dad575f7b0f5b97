//! Session authentication for HTTP and WebSocket requests.
//!
//! Sessions are issued and validated by the account service; this module only
//! consumes them through [`AuthService`].

use crate::api::{ApiError, AppState};
use agora_realtime::UserProfile;
use async_trait::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::{header, request::Parts, HeaderMap};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_id";

/// Errors from the session service.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The session service could not be reached.
    #[error("session service unavailable: {0}")]
    Unavailable(String),
}

/// Resolves session tokens to users.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Returns the user owning a valid session, or `None` for unknown or expired tokens.
    async fn get_user_by_session_token(&self, token: &str) -> Result<Option<UserProfile>, AuthError>;
}

/// Thread-safe in-memory session table.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, UserProfile>>,
}

impl MemorySessionStore {
    /// Create a new empty session table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a session.
    pub fn insert(&self, token: impl Into<String>, profile: UserProfile) {
        self.sessions.write().insert(token.into(), profile);
    }

    /// Invalidate a session.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }
}

#[async_trait]
impl AuthService for MemorySessionStore {
    async fn get_user_by_session_token(&self, token: &str) -> Result<Option<UserProfile>, AuthError> {
        Ok(self.sessions.read().get(token).cloned())
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Find the session token in the cookie, the bearer header, or the `token` query parameter.
pub fn session_token(parts: &Parts) -> Option<String> {
    cookie_token(&parts.headers)
        .or_else(|| bearer_token(&parts.headers))
        .or_else(|| {
            Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(query)| query.token)
        })
        .filter(|token| !token.is_empty())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

/// The user behind the request's session.
///
/// Rejects with `401 Unauthorized` when the session is missing or invalid.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserProfile);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(parts).ok_or(ApiError::Unauthorized)?;
        state
            .auth
            .get_user_by_session_token(&token)
            .await?
            .map(AuthenticatedUser)
            .ok_or(ApiError::Unauthorized)
    }
}
