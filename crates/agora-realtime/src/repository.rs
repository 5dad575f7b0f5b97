//! Interfaces to the collaborators the real-time layer consumes.
//!
//! The hub never owns persistent data. Messages, group membership and
//! durable notifications live in stores owned by the rest of the backend and
//! are reached through these traits.

use crate::envelope::{ChatMessage, GroupId, UserId};
use crate::error::RepositoryError;
use crate::notification::{NewNotification, Notification};
use async_trait::async_trait;

/// Result type for collaborator calls.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// A direct message to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDirectMessage {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
}

/// A group message to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroupMessage {
    pub sender_id: UserId,
    pub group_id: GroupId,
    pub content: String,
}

/// Durable chat history.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persists a direct message and returns it with its assigned ID and timestamp.
    async fn save(&self, message: NewDirectMessage) -> Result<ChatMessage>;

    /// Persists a group message and returns it with its assigned ID and timestamp.
    async fn save_group_message(&self, message: NewGroupMessage) -> Result<ChatMessage>;
}

/// Group membership lookups.
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Returns whether the user currently belongs to the group.
    async fn is_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool>;

    /// Lists the IDs of all current members of the group.
    async fn list_member_ids(&self, group_id: GroupId) -> Result<Vec<UserId>>;
}

/// Durable notification store, read by users on poll or login.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Stores a notification.
    async fn create(&self, notification: NewNotification) -> Result<Notification>;

    /// Lists a user's notifications, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>>;
}
