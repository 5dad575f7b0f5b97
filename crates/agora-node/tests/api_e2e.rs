//! End-to-end tests for the HTTP surface, driven through the router.

use agora_node::api::{create_router, AppState};
use agora_node::config::{Config, SeedGroup, SeedUser};
use axum::{body::Body, http::Request};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config() -> Config {
    let mut config = Config::default();
    config.seed.users = vec![
        SeedUser {
            session_token: "alice-token".to_string(),
            user_id: 1,
            username: "alice".to_string(),
            avatar: None,
        },
        SeedUser {
            session_token: "bob-token".to_string(),
            user_id: 2,
            username: "bob".to_string(),
            avatar: Some("bob.png".to_string()),
        },
    ];
    config.seed.groups = vec![SeedGroup {
        id: 7,
        members: vec![1, 2],
    }];
    config
}

fn create_test_app() -> axum::Router {
    create_router(AppState::in_memory(&test_config()))
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ==================== Health ====================

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

// ==================== WebSocket upgrade ====================

#[tokio::test]
async fn test_ws_without_session_is_unauthorized() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/ws")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 401);

    let body = json_body(response).await;
    assert_eq!(body["error"], "authentication required");
}

#[tokio::test]
async fn test_ws_with_unknown_session_is_unauthorized() {
    let app = create_test_app();

    let response = app.oneshot(get("/ws?token=forged")).await.unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_ws_plain_request_is_rejected_after_auth() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/ws")
        .header("cookie", "session_id=alice-token")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
    assert_ne!(response.status(), 401);
}

// ==================== Presence and stats ====================

#[tokio::test]
async fn test_online_users_requires_session() {
    let app = create_test_app();

    let response = app.clone().oneshot(get("/api/online-users")).await.unwrap();
    assert_eq!(response.status(), 401);

    let request = Request::builder()
        .uri("/api/online-users")
        .header("authorization", "Bearer alice-token")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn test_stats_start_empty() {
    let app = create_test_app();

    let response = app.oneshot(get("/api/realtime/stats")).await.unwrap();
    assert_eq!(response.status(), 200);

    let stats = json_body(response).await;
    assert_eq!(stats["current_connections"], 0);
    assert_eq!(stats["online_users"], 0);
    assert_eq!(stats["messages_dropped"], 0);
}

// ==================== Notifications ====================

#[tokio::test]
async fn test_create_and_list_notifications() {
    let app = create_test_app();

    let create_request = Request::builder()
        .method("POST")
        .uri("/api/notifications")
        .header("content-type", "application/json")
        .header("cookie", "session_id=alice-token")
        .body(Body::from(
            json!({
                "user_id": 2,
                "notification_type": "group_invite",
                "reference_id": 7,
                "message": "alice invited you to hiking club"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(create_request).await.unwrap();
    assert_eq!(response.status(), 201);

    let created = json_body(response).await;
    assert_eq!(created["user_id"], 2);
    assert_eq!(created["actor_id"], 1);
    assert_eq!(created["notification_type"], "group_invite");
    assert_eq!(created["read"], false);

    // Bob was offline; the stored copy is what he reads.
    let list_request = Request::builder()
        .uri("/api/notifications")
        .header("authorization", "Bearer bob-token")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(list_request).await.unwrap();
    assert_eq!(response.status(), 200);

    let listed = json_body(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], created["id"]);

    // Alice has none of her own.
    let list_request = Request::builder()
        .uri("/api/notifications?token=alice-token")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(list_request).await.unwrap();
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn test_create_notification_validation() {
    let app = create_test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/api/notifications")
        .header("content-type", "application/json")
        .header("cookie", "session_id=alice-token")
        .body(Body::from(
            json!({
                "user_id": 2,
                "notification_type": "new_follower",
                "message": "   "
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), 400);

    let request = Request::builder()
        .method("POST")
        .uri("/api/notifications")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "user_id": 2,
                "notification_type": "new_follower",
                "message": "hello"
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 401);
}
