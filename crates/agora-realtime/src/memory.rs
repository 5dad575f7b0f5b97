//! In-memory collaborator implementations.
//!
//! Used by the development server and by tests. Production deployments plug
//! the relational stores in behind the same traits.

use crate::envelope::{unix_now, ChatMessage, GroupId, Target, UserId};
use crate::notification::{NewNotification, Notification};
use crate::repository::{
    GroupRepository, MessageRepository, NewDirectMessage, NewGroupMessage,
    NotificationRepository, Result,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

/// Thread-safe in-memory message history.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    next_id: AtomicI64,
    messages: RwLock<Vec<ChatMessage>>,
}

impl MemoryMessageStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, sender_id: UserId, target: Target, content: String) -> ChatMessage {
        let message = ChatMessage {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            sender_id,
            target,
            content,
            created_at: unix_now(),
        };
        self.messages.write().push(message.clone());
        message
    }

    /// Direct messages exchanged between two users, oldest first.
    pub fn conversation(&self, a: UserId, b: UserId) -> Vec<ChatMessage> {
        self.messages
            .read()
            .iter()
            .filter(|m| match m.target {
                Target::User(to) => (m.sender_id == a && to == b) || (m.sender_id == b && to == a),
                Target::Group(_) => false,
            })
            .cloned()
            .collect()
    }

    /// Messages posted to a group, oldest first.
    pub fn group_history(&self, group_id: GroupId) -> Vec<ChatMessage> {
        self.messages
            .read()
            .iter()
            .filter(|m| m.target == Target::Group(group_id))
            .cloned()
            .collect()
    }

    /// Total number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Whether no message has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageStore {
    async fn save(&self, message: NewDirectMessage) -> Result<ChatMessage> {
        Ok(self.insert(
            message.sender_id,
            Target::User(message.recipient_id),
            message.content,
        ))
    }

    async fn save_group_message(&self, message: NewGroupMessage) -> Result<ChatMessage> {
        Ok(self.insert(
            message.sender_id,
            Target::Group(message.group_id),
            message.content,
        ))
    }
}

/// Thread-safe in-memory group membership.
#[derive(Debug, Default)]
pub struct MemoryGroupStore {
    members: RwLock<HashMap<GroupId, BTreeSet<UserId>>>,
}

impl MemoryGroupStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a group, creating the group if needed.
    pub fn add_member(&self, group_id: GroupId, user_id: UserId) -> bool {
        self.members
            .write()
            .entry(group_id)
            .or_default()
            .insert(user_id)
    }

    /// Remove a user from a group.
    pub fn remove_member(&self, group_id: GroupId, user_id: UserId) -> bool {
        self.members
            .write()
            .get_mut(&group_id)
            .is_some_and(|members| members.remove(&user_id))
    }
}

#[async_trait]
impl GroupRepository for MemoryGroupStore {
    async fn is_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        Ok(self
            .members
            .read()
            .get(&group_id)
            .is_some_and(|members| members.contains(&user_id)))
    }

    async fn list_member_ids(&self, group_id: GroupId) -> Result<Vec<UserId>> {
        Ok(self
            .members
            .read()
            .get(&group_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }
}

/// Thread-safe in-memory notification store.
#[derive(Debug, Default)]
pub struct MemoryNotificationStore {
    next_id: AtomicI64,
    notifications: RwLock<Vec<Notification>>,
}

impl MemoryNotificationStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let notification = Notification::from_new(id, notification);
        self.notifications.write().push(notification.clone());
        Ok(notification)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>> {
        Ok(self
            .notifications
            .read()
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationType;

    #[tokio::test]
    async fn test_message_ids_are_sequential() {
        let store = MemoryMessageStore::new();
        let first = store
            .save(NewDirectMessage {
                sender_id: 1,
                recipient_id: 2,
                content: "hi".to_string(),
            })
            .await
            .unwrap();
        let second = store
            .save_group_message(NewGroupMessage {
                sender_id: 1,
                group_id: 9,
                content: "all".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.target, Target::Group(9));
        assert_eq!(store.conversation(2, 1).len(), 1);
        assert_eq!(store.group_history(9).len(), 1);
    }

    #[tokio::test]
    async fn test_group_membership() {
        let store = MemoryGroupStore::new();
        store.add_member(1, 10);
        store.add_member(1, 11);

        assert!(store.is_member(1, 10).await.unwrap());
        assert!(!store.is_member(1, 12).await.unwrap());
        assert!(!store.is_member(2, 10).await.unwrap());
        assert_eq!(store.list_member_ids(1).await.unwrap(), vec![10, 11]);

        assert!(store.remove_member(1, 10));
        assert!(!store.is_member(1, 10).await.unwrap());
        assert!(store.list_member_ids(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifications_newest_first() {
        let store = MemoryNotificationStore::new();
        for message in ["first", "second"] {
            store
                .create(NewNotification::new(
                    1,
                    NotificationType::NewFollower,
                    message.to_string(),
                ))
                .await
                .unwrap();
        }
        store
            .create(NewNotification::new(
                2,
                NotificationType::GroupInvite,
                "other".to_string(),
            ))
            .await
            .unwrap();

        let listed = store.list_for_user(1).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].message, "second");
    }
}
