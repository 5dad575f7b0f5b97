//! # Agora Real-time
//!
//! Real-time connection hub for the Agora social network.
//!
//! This crate accepts persistent WebSocket-style connections, tracks which
//! users are online, and fans out chat messages and notifications to the
//! right set of live connections.
//!
//! ## Features
//!
//! - **Hub**: single event loop owning the registry of online connections
//! - **Client**: per-connection actor with separate read and write loops
//! - **Dispatcher**: validates, persists and authorizes inbound messages
//! - **Presence**: race-free snapshots of who is online
//! - **Notifications**: best-effort live push for other subsystems
//!
//! ## Example
//!
//! ```rust
//! use agora_realtime::memory::{MemoryGroupStore, MemoryMessageStore};
//! use agora_realtime::{Dispatcher, DispatcherConfig, Hub, HubConfig};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // Create the hub once at startup and share its handle
//! let hub = Hub::spawn(HubConfig::default());
//!
//! let dispatcher = Arc::new(Dispatcher::new(
//!     hub.clone(),
//!     Arc::new(MemoryMessageStore::new()),
//!     Arc::new(MemoryGroupStore::new()),
//!     DispatcherConfig::default(),
//! ));
//!
//! // Push a live notification (no-op while the user is offline)
//! hub.notify_user(42, serde_json::json!({"type": "new_follower"}))
//!     .await
//!     .unwrap();
//!
//! assert!(hub.online_users().await.unwrap().is_empty());
//! # drop(dispatcher);
//! # }
//! ```
//!
//! ## Wire Protocol
//!
//! ### Client -> Server Messages
//!
//! ```json
//! {"kind": "direct_message", "recipient_id": 2, "content": "hi"}
//! {"kind": "group_message", "group_id": 7, "content": "hello all"}
//! ```
//!
//! ### Server -> Client Messages
//!
//! ```json
//! {"kind": "direct_message", "id": 10, "sender_id": 1, "recipient_id": 2, "content": "hi", "created_at": 1700000000}
//! {"kind": "notification", "recipient_id": 2, "payload": {...}, "created_at": 1700000000}
//! {"kind": "error", "content": "message content is empty", "created_at": 1700000000}
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  frame   ┌────────────┐  route   ┌─────────────────────────┐
//! │  Client  │ ───────▶ │ Dispatcher │ ───────▶ │          Hub            │
//! │ read loop│          │ persist +  │          │  user -> connections    │
//! └──────────┘          │ authorize  │          │  (single event loop)    │
//!      ▲                └────────────┘          └───────────┬─────────────┘
//!      │ socket                                             │ try_send
//! ┌────┴──────┐        bounded outbound queue               │
//! │  Client   │ ◀───────────────────────────────────────────┘
//! │write loop │
//! └───────────┘
//! ```

pub mod client;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod memory;
pub mod notification;
pub mod presence;
pub mod repository;

// Re-export main types
pub use client::{Client, ClientConfig, ClientId, Disconnect, Frame};
pub use dispatcher::{Dispatched, Dispatcher, DispatcherConfig, Origin};
pub use envelope::{ChatMessage, Envelope, EnvelopeKind, GroupId, MessageId, Target, UserId};
pub use error::{ClientError, DispatchError, ProtocolError, RealtimeError, RepositoryError};
pub use hub::{Hub, HubConfig, HubHandle, HubStats, Registration, UserProfile};
pub use notification::{LiveNotifier, NewNotification, Notification, NotificationType};
pub use presence::{OnlineUser, PresenceChange, PresenceStatus};
pub use repository::{
    GroupRepository, MessageRepository, NewDirectMessage, NewGroupMessage, NotificationRepository,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryGroupStore, MemoryMessageStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_public_api() {
        let hub = Hub::spawn(HubConfig::default());
        assert!(hub.online_users().await.unwrap().is_empty());
        assert_eq!(hub.stats().await.unwrap(), HubStats::default());
    }

    #[tokio::test]
    async fn test_full_flow() {
        let hub = Hub::spawn(HubConfig::default());
        let groups = Arc::new(MemoryGroupStore::new());
        groups.add_member(1, 10);
        groups.add_member(1, 20);
        let dispatcher = Arc::new(Dispatcher::new(
            hub.clone(),
            Arc::new(MemoryMessageStore::new()),
            groups,
            DispatcherConfig::default(),
        ));

        // Connect
        let sender = Client::connect(
            hub.clone(),
            dispatcher.clone(),
            UserProfile {
                user_id: 10,
                username: "alice".to_string(),
                avatar: None,
            },
            ClientConfig::default(),
        )
        .await
        .unwrap();
        let (queue_tx, mut queue_rx) = tokio::sync::mpsc::channel(8);
        hub.register(Registration {
            client_id: ClientId::new(),
            profile: UserProfile {
                user_id: 20,
                username: "bob".to_string(),
                avatar: None,
            },
            sender: queue_tx,
        })
        .await
        .unwrap();
        assert_eq!(hub.online_users().await.unwrap().len(), 2);

        // Send a group message
        let origin = Origin {
            user_id: 10,
            client_id: sender.id(),
        };
        dispatcher
            .handle_frame(origin, r#"{"kind":"group_message","group_id":1,"content":"hey"}"#)
            .await;

        // Verify received
        let envelope = queue_rx.recv().await.unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::GroupMessage);
        assert_eq!(envelope.sender_id, Some(10));

        // Disconnect
        hub.unregister(10, sender.id());
        assert!(!hub.is_online(10).await.unwrap());
    }
}
