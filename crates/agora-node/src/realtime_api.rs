//! Real-time WebSocket API.
//!
//! - `/ws` - WebSocket endpoint for chat messages and live notifications
//! - `/api/online-users` - Users with at least one open connection
//! - `/api/realtime/stats` - Hub statistics
//!
//! ## WebSocket Protocol
//!
//! The session is checked before the upgrade; a missing or invalid session
//! gets `401` and never reaches the hub. After the upgrade, clients send JSON
//! text frames:
//!
//! ```json
//! {"kind": "direct_message", "recipient_id": 2, "content": "hi"}
//! {"kind": "group_message", "group_id": 7, "content": "hello all"}
//! ```
//!
//! and receive the persisted envelope (with `id`, `sender_id` and
//! `created_at`), `notification` envelopes, and `error` envelopes for frames
//! they sent that could not be processed.

use agora_realtime::{Client, Frame, HubStats, OnlineUser, UserProfile};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{future, SinkExt, StreamExt};
use tracing::{debug, error, warn};

use crate::api::{ApiError, AppState};
use crate::auth::AuthenticatedUser;

/// Create the real-time API routes.
pub fn realtime_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/online-users", get(online_users))
        .route("/api/realtime/stats", get(get_stats))
}

/// WebSocket upgrade handler.
///
/// Extractors run in order, so authentication is decided before the upgrade
/// headers are inspected.
async fn ws_handler(
    State(state): State<AppState>,
    AuthenticatedUser(profile): AuthenticatedUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    debug!(user_id = profile.user_id, "Upgrading connection");
    ws.on_failed_upgrade(|e| warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, state, profile))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState, profile: UserProfile) {
    let user_id = profile.user_id;
    let client = match Client::connect(
        state.hub.clone(),
        state.dispatcher.clone(),
        profile,
        state.client_config,
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            error!(user_id, error = %e, "Failed to register client");
            return;
        }
    };

    let (sink, stream) = socket.split();
    let stream = stream.map(|message| message.map(into_frame));
    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(into_message(frame))));

    let reason = client.run(stream, sink).await;
    debug!(user_id, reason = %reason, "WebSocket closed");
}

fn into_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data),
        Message::Ping(data) => Frame::Ping(data),
        Message::Pong(data) => Frame::Pong(data),
        Message::Close(_) => Frame::Close,
    }
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close => Message::Close(None),
    }
}

/// List online users.
async fn online_users(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<OnlineUser>>, ApiError> {
    Ok(Json(state.hub.online_users().await?))
}

/// Get real-time connection statistics.
async fn get_stats(State(state): State<AppState>) -> Result<Json<HubStats>, ApiError> {
    Ok(Json(state.hub.stats().await?))
}
