//! Notifications and the live notification bridge.
//!
//! Notifications are stored durably by a [`NotificationRepository`] owned by
//! the rest of the backend. The bridge only adds a best-effort live push to
//! whichever connections the user has open right now.
//!
//! [`NotificationRepository`]: crate::repository::NotificationRepository

use crate::envelope::{unix_now, Envelope, UserId};
use crate::error::RealtimeError;
use crate::hub::HubHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifier of a stored notification.
pub type NotificationId = i64;

/// A stored notification for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique notification ID.
    pub id: NotificationId,
    /// User who receives this notification.
    pub user_id: UserId,
    /// Notification type.
    pub notification_type: NotificationType,
    /// User whose action triggered it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<UserId>,
    /// Related entity (group, event, follow request).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<i64>,
    /// Text shown to the user.
    pub message: String,
    /// Whether the notification has been read.
    pub read: bool,
    /// When the notification was created (Unix timestamp).
    pub created_at: u64,
}

impl Notification {
    /// Build a stored notification from a request.
    pub fn from_new(id: NotificationId, new: NewNotification) -> Self {
        Self {
            id,
            user_id: new.user_id,
            notification_type: new.notification_type,
            actor_id: new.actor_id,
            reference_id: new.reference_id,
            message: new.message,
            read: false,
            created_at: unix_now(),
        }
    }

    /// JSON payload pushed to live connections.
    pub fn live_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// A notification to store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: UserId,
    pub notification_type: NotificationType,
    #[serde(default)]
    pub actor_id: Option<UserId>,
    #[serde(default)]
    pub reference_id: Option<i64>,
    pub message: String,
}

impl NewNotification {
    /// Create a notification request.
    pub fn new(user_id: UserId, notification_type: NotificationType, message: String) -> Self {
        Self {
            user_id,
            notification_type,
            actor_id: None,
            reference_id: None,
            message,
        }
    }

    /// Set the acting user.
    pub fn with_actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Set the related entity.
    pub fn with_reference(mut self, reference_id: i64) -> Self {
        self.reference_id = Some(reference_id);
        self
    }
}

/// Types of notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// Someone asked to follow a private profile.
    FollowRequest,
    /// Someone started following the user.
    NewFollower,
    /// Invited to join a group.
    GroupInvite,
    /// Someone asked to join a group the user owns.
    GroupJoinRequest,
    /// A new event was created in one of the user's groups.
    GroupEvent,
}

impl NotificationType {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            NotificationType::FollowRequest => "Follow Request",
            NotificationType::NewFollower => "New Follower",
            NotificationType::GroupInvite => "Group Invite",
            NotificationType::GroupJoinRequest => "Join Request",
            NotificationType::GroupEvent => "Group Event",
        }
    }
}

/// Capability to push a live event to one user.
///
/// Subsystems that create notifications depend on this rather than on the hub.
#[async_trait]
pub trait LiveNotifier: Send + Sync {
    /// Push `payload` to every open connection of `user_id`. Offline users are skipped.
    async fn notify_user(
        &self,
        user_id: UserId,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError>;
}

impl HubHandle {
    /// Route a `notification` envelope to all of a user's connections.
    ///
    /// A no-op when the user is offline; the durable copy is read on next poll.
    pub async fn notify_user(
        &self,
        user_id: UserId,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        debug!(user_id, "Pushing live notification");
        self.route(Envelope::notification(user_id, payload), vec![user_id])
            .await
    }
}

#[async_trait]
impl LiveNotifier for HubHandle {
    async fn notify_user(
        &self,
        user_id: UserId,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        HubHandle::notify_user(self, user_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientId;
    use crate::envelope::EnvelopeKind;
    use crate::hub::{Hub, HubConfig, Registration, UserProfile};
    use tokio::sync::mpsc;

    #[test]
    fn test_notification_creation() {
        let new = NewNotification::new(
            2,
            NotificationType::GroupInvite,
            "alice invited you to Hiking".to_string(),
        )
        .with_actor(1)
        .with_reference(10);

        let notification = Notification::from_new(5, new);
        assert_eq!(notification.id, 5);
        assert_eq!(notification.user_id, 2);
        assert_eq!(notification.actor_id, Some(1));
        assert_eq!(notification.reference_id, Some(10));
        assert!(!notification.read);
    }

    #[test]
    fn test_notification_type_serialization() {
        let json = serde_json::to_string(&NotificationType::FollowRequest).unwrap();
        assert_eq!(json, "\"follow_request\"");
        assert_eq!(NotificationType::GroupJoinRequest.label(), "Join Request");
    }

    #[tokio::test]
    async fn test_notify_online_user() {
        let hub = Hub::spawn(HubConfig::default());
        let (sender, mut rx) = mpsc::channel(4);
        hub.register(Registration {
            client_id: ClientId::new(),
            profile: UserProfile {
                user_id: 2,
                username: "bob".to_string(),
                avatar: None,
            },
            sender,
        })
        .await
        .unwrap();

        let notifier: &dyn LiveNotifier = &hub;
        notifier
            .notify_user(2, serde_json::json!({"type": "follow_request", "from": 1}))
            .await
            .unwrap();

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Notification);
        assert_eq!(envelope.recipient_id, Some(2));
        assert_eq!(envelope.payload.as_ref().unwrap()["from"], 1);
    }

    #[tokio::test]
    async fn test_notify_offline_user_is_noop() {
        let hub = Hub::spawn(HubConfig::default());
        hub.notify_user(9, serde_json::json!({})).await.unwrap();
        assert_eq!(hub.stats().await.unwrap().messages_delivered, 0);
    }
}
