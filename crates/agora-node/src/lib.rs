//! # Agora Node
//!
//! HTTP and WebSocket server for the Agora social network's real-time layer.
//!
//! The node hosts the hub from `agora-realtime` behind axum: it authenticates
//! sessions, upgrades connections, adapts WebSocket messages to transport
//! frames, and exposes presence, statistics and notification endpoints.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agora Node                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  HTTP layer (axum)                                          │
//! │  • /ws upgrade, authenticated before the handshake          │
//! │  • /api/online-users, /api/realtime/stats                   │
//! │  • /api/notifications (store, then push live)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  agora-realtime                                             │
//! │  • Hub loop owning the connection registry                  │
//! │  • Client read/write loops, one pair per connection         │
//! │  • Dispatcher: validate, persist, route                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Collaborators (async traits)                               │
//! │  • AuthService, MessageRepository, GroupRepository,         │
//! │    NotificationRepository (in-memory by default)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin agora-node -- --config agora.yaml --addr 127.0.0.1:8080
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Application state, router and error responses
//! - [`auth`] - Session lookup and the authenticated-user extractor
//! - [`realtime_api`] - WebSocket endpoint, presence and statistics
//! - [`notification_api`] - Notification storage and live push
//! - [`config`] - Node configuration management
//! - [`observability`] - Structured logging and request tracing
//!
//! ## Example: Serving the API
//!
//! ```rust,no_run
//! use agora_node::api::{create_router, AppState};
//! use agora_node::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let state = AppState::in_memory(&config);
//!     let listener = tokio::net::TcpListener::bind(config.server.addr).await?;
//!     axum::serve(listener, create_router(state)).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod notification_api;
pub mod observability;
pub mod realtime_api;
