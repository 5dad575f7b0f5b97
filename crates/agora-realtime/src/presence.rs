//! Presence: who is online, derived from the hub registry.
//!
//! A user is online iff it has at least one registered connection. Every
//! query here is answered by the hub loop itself, so a snapshot never races
//! with a concurrent register or unregister.

use crate::envelope::UserId;
use crate::error::RealtimeError;
use crate::hub::{Command, HubHandle};
use serde::{Deserialize, Serialize};

/// A user with at least one live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub user_id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Number of open connections (devices, tabs).
    pub connections: usize,
}

/// Online status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresenceStatus::Online => write!(f, "online"),
            PresenceStatus::Offline => write!(f, "offline"),
        }
    }
}

/// A user's first connection opened or last connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceChange {
    pub user_id: UserId,
    pub status: PresenceStatus,
}

impl HubHandle {
    /// Snapshot of every online user, ordered by user ID.
    pub async fn online_users(&self) -> Result<Vec<OnlineUser>, RealtimeError> {
        self.request(|reply| Command::OnlineUsers { reply }).await
    }

    /// Number of registered connections for a user.
    pub async fn connection_count(&self, user_id: UserId) -> Result<usize, RealtimeError> {
        self.request(|reply| Command::ConnectionCount { user_id, reply })
            .await
    }

    /// Whether the user has any registered connection.
    pub async fn is_online(&self, user_id: UserId) -> Result<bool, RealtimeError> {
        Ok(self.connection_count(user_id).await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientId;
    use crate::hub::{Hub, HubConfig, Registration, UserProfile};
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    fn registration(user_id: UserId) -> (Registration, mpsc::Receiver<crate::hub::Outbound>) {
        let (sender, receiver) = mpsc::channel(4);
        let registration = Registration {
            client_id: ClientId::new(),
            profile: UserProfile {
                user_id,
                username: format!("user{}", user_id),
                avatar: Some(format!("/avatars/{}.png", user_id)),
            },
            sender,
        };
        (registration, receiver)
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted_with_metadata() {
        let hub = Hub::spawn(HubConfig::default());
        let mut receivers = Vec::new();
        for user_id in [3, 1, 2, 1] {
            let (registration, rx) = registration(user_id);
            hub.register(registration).await.unwrap();
            receivers.push(rx);
        }

        let users = hub.online_users().await.unwrap();
        let ids: Vec<_> = users.iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(users[0].connections, 2);
        assert_eq!(users[0].username, "user1");
        assert_eq!(users[0].avatar.as_deref(), Some("/avatars/1.png"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration() {
        let hub = Hub::spawn(HubConfig::default());

        let tasks: Vec<_> = (0..1000)
            .map(|user_id| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    let (registration, rx) = registration(user_id);
                    hub.register(registration).await.unwrap();
                    rx
                })
            })
            .collect();

        let mut receivers = Vec::new();
        for task in tasks {
            receivers.push(task.await.unwrap());
        }

        let users = hub.online_users().await.unwrap();
        assert_eq!(users.len(), 1000);
        assert_eq!(hub.stats().await.unwrap().current_connections, 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_register_unregister_counts() {
        let hub = Hub::spawn(HubConfig::default());

        // Each user opens four connections concurrently, then closes the odd ones.
        let tasks: Vec<_> = (0..50)
            .flat_map(|user_id| (0..4).map(move |n| (user_id, n)))
            .map(|(user_id, n)| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    let (registration, rx) = registration(user_id);
                    let client_id = registration.client_id;
                    hub.register(registration).await.unwrap();
                    if n % 2 == 1 {
                        hub.unregister(user_id, client_id);
                        None
                    } else {
                        Some(rx)
                    }
                })
            })
            .collect();

        let mut open: HashMap<UserId, usize> = HashMap::new();
        let mut receivers = Vec::new();
        for (index, task) in tasks.into_iter().enumerate() {
            if let Some(rx) = task.await.unwrap() {
                *open.entry((index / 4) as UserId).or_default() += 1;
                receivers.push(rx);
            }
        }

        for (user_id, expected) in open {
            assert_eq!(hub.connection_count(user_id).await.unwrap(), expected);
        }
        assert_eq!(hub.online_users().await.unwrap().len(), 50);
    }

    #[test]
    fn test_presence_change_serialization() {
        let change = PresenceChange {
            user_id: 4,
            status: PresenceStatus::Offline,
        };
        let json = serde_json::to_string(&change).unwrap();
        assert_eq!(json, r#"{"user_id":4,"status":"offline"}"#);
    }
}
