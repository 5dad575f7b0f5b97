//! Notification API.
//!
//! - `POST /api/notifications` - Store a notification and push it live
//! - `GET /api/notifications` - List the caller's notifications
//!
//! The stored copy is authoritative. The live push is best effort: a user who
//! is offline, or whose push fails, sees the notification on the next poll.

use agora_realtime::{NewNotification, Notification, NotificationType, UserId};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::{ApiError, AppState};
use crate::auth::AuthenticatedUser;

/// Create the notification routes.
pub fn notification_routes() -> Router<AppState> {
    Router::new().route(
        "/api/notifications",
        get(list_notifications).post(create_notification),
    )
}

/// Request to notify a user. The caller becomes the actor.
#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: UserId,
    pub notification_type: NotificationType,
    #[serde(default)]
    pub reference_id: Option<i64>,
    pub message: String,
}

async fn create_notification(
    State(state): State<AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }

    let mut new = NewNotification::new(request.user_id, request.notification_type, request.message)
        .with_actor(actor.user_id);
    if let Some(reference_id) = request.reference_id {
        new = new.with_reference(reference_id);
    }

    let notification = state.notifications.create(new).await?;
    info!(
        notification_id = notification.id,
        user_id = notification.user_id,
        kind = notification.notification_type.label(),
        "Notification stored"
    );

    if let Err(e) = state
        .notifier
        .notify_user(notification.user_id, notification.live_payload())
        .await
    {
        warn!(user_id = notification.user_id, error = %e, "Live notification push failed");
    }

    Ok((StatusCode::CREATED, Json(notification)))
}

async fn list_notifications(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Notification>>, ApiError> {
    Ok(Json(state.notifications.list_for_user(user.user_id).await?))
}
