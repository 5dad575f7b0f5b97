//! HTTP API for the Agora node.
//!
//! Hosts the real-time endpoints next to a health check. The hub is created
//! once and injected through [`AppState`]; handlers never reach for a global.

use agora_realtime::memory::{MemoryGroupStore, MemoryMessageStore, MemoryNotificationStore};
use agora_realtime::{
    ClientConfig, Dispatcher, GroupRepository, Hub, HubHandle, LiveNotifier, MessageRepository,
    NotificationRepository, RealtimeError, RepositoryError,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthError, AuthService, MemorySessionStore};
use crate::config::Config;
use crate::notification_api::notification_routes;
use crate::observability::request_id_layer;
use crate::realtime_api::realtime_routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the hub loop.
    pub hub: HubHandle,
    /// Inbound message router shared by all connections.
    pub dispatcher: Arc<Dispatcher>,
    /// Session validation.
    pub auth: Arc<dyn AuthService>,
    /// Durable notification store.
    pub notifications: Arc<dyn NotificationRepository>,
    /// Live push for stored notifications.
    pub notifier: Arc<dyn LiveNotifier>,
    /// Per-connection settings.
    pub client_config: ClientConfig,
}

impl AppState {
    /// Spawn the hub and wire it to the given collaborators.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &Config,
        messages: Arc<dyn MessageRepository>,
        groups: Arc<dyn GroupRepository>,
        notifications: Arc<dyn NotificationRepository>,
        auth: Arc<dyn AuthService>,
    ) -> Self {
        let hub = Hub::spawn(config.hub_config());
        let dispatcher = Arc::new(Dispatcher::new(
            hub.clone(),
            messages,
            groups,
            config.dispatcher_config(),
        ));
        Self {
            notifier: Arc::new(hub.clone()),
            hub,
            dispatcher,
            auth,
            notifications,
            client_config: config.client_config(),
        }
    }

    /// State backed by in-memory stores populated from `config.seed`.
    pub fn in_memory(config: &Config) -> Self {
        let sessions = Arc::new(MemorySessionStore::new());
        for user in &config.seed.users {
            sessions.insert(user.session_token.clone(), user.profile());
        }

        let groups = Arc::new(MemoryGroupStore::new());
        for group in &config.seed.groups {
            for member in &group.members {
                groups.add_member(group.id, *member);
            }
        }

        tracing::info!(
            users = config.seed.users.len(),
            groups = config.seed.groups.len(),
            "Seeded in-memory stores"
        );

        Self::new(
            config,
            Arc::new(MemoryMessageStore::new()),
            groups,
            Arc::new(MemoryNotificationStore::new()),
            sessions,
        )
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("real-time hub unavailable: {0}")]
    Realtime(#[from] RealtimeError),
    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Realtime(_) | ApiError::Auth(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .merge(realtime_routes())
        .merge(notification_routes())
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Realtime(RealtimeError::HubClosed)
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Repository(RepositoryError::NotFound("user 3".into()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
    }
}
