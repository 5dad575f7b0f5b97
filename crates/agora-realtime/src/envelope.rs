//! Wire envelope exchanged over real-time connections.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// Identifier of a user account.
pub type UserId = i64;

/// Identifier of a group.
pub type GroupId = i64;

/// Identifier assigned to a message by the message store.
pub type MessageId = i64;

/// The kind of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// One-to-one chat message.
    DirectMessage,
    /// Chat message posted to a group.
    GroupMessage,
    /// Live notification pushed by another subsystem.
    Notification,
    /// Protocol error echoed to the sending connection.
    Error,
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvelopeKind::DirectMessage => write!(f, "direct_message"),
            EnvelopeKind::GroupMessage => write!(f, "group_message"),
            EnvelopeKind::Notification => write!(f, "notification"),
            EnvelopeKind::Error => write!(f, "error"),
        }
    }
}

/// Where a chat message is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// A single user.
    User(UserId),
    /// Every current member of a group.
    Group(GroupId),
}

/// One logical application message.
///
/// Optional fields are omitted from the JSON when absent, so an inbound
/// frame only needs `kind`, the target id and `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope kind.
    pub kind: EnvelopeKind,

    /// Store-assigned message ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Author of the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,

    /// Recipient of a direct message or notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<UserId>,

    /// Target group of a group message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,

    /// Message text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,

    /// Structured body of a notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// Unix timestamp assigned by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

impl Envelope {
    fn empty(kind: EnvelopeKind) -> Self {
        Self {
            kind,
            id: None,
            sender_id: None,
            recipient_id: None,
            group_id: None,
            content: String::new(),
            payload: None,
            created_at: None,
        }
    }

    /// Build a notification envelope for a user.
    pub fn notification(user_id: UserId, payload: serde_json::Value) -> Self {
        Self {
            recipient_id: Some(user_id),
            payload: Some(payload),
            created_at: Some(unix_now()),
            ..Self::empty(EnvelopeKind::Notification)
        }
    }

    /// Build an error envelope describing why a frame was rejected.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            created_at: Some(unix_now()),
            ..Self::empty(EnvelopeKind::Error)
        }
    }

    /// Build the outbound envelope for a persisted chat message.
    pub fn from_message(message: &ChatMessage) -> Self {
        let (kind, recipient_id, group_id) = match message.target {
            Target::User(id) => (EnvelopeKind::DirectMessage, Some(id), None),
            Target::Group(id) => (EnvelopeKind::GroupMessage, None, Some(id)),
        };
        Self {
            kind,
            id: Some(message.id),
            sender_id: Some(message.sender_id),
            recipient_id,
            group_id,
            content: message.content.clone(),
            payload: None,
            created_at: Some(message.created_at),
        }
    }

    /// Decode an inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Resolve the target of a client-sent chat envelope.
    pub fn target(&self) -> Result<Target, ProtocolError> {
        match self.kind {
            EnvelopeKind::DirectMessage => self
                .recipient_id
                .map(Target::User)
                .ok_or(ProtocolError::MissingTarget("recipient_id")),
            EnvelopeKind::GroupMessage => self
                .group_id
                .map(Target::Group)
                .ok_or(ProtocolError::MissingTarget("group_id")),
            kind => Err(ProtocolError::ForbiddenKind(kind.to_string())),
        }
    }
}

/// A chat message as stored by the message repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Store-assigned ID.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Recipient user or group.
    pub target: Target,
    /// Message text.
    pub content: String,
    /// Unix timestamp assigned by the store.
    pub created_at: u64,
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct_message() {
        let envelope =
            Envelope::parse(r#"{"kind":"direct_message","recipient_id":2,"content":"hi"}"#)
                .unwrap();

        assert_eq!(envelope.kind, EnvelopeKind::DirectMessage);
        assert_eq!(envelope.target().unwrap(), Target::User(2));
        assert_eq!(envelope.content, "hi");
        assert!(envelope.sender_id.is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let err = Envelope::parse(r#"{"kind":"shout","content":"hi"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Envelope::parse("not json").is_err());
    }

    #[test]
    fn test_target_requires_group_id() {
        let envelope = Envelope::parse(r#"{"kind":"group_message","content":"hi"}"#).unwrap();
        assert_eq!(
            envelope.target().unwrap_err(),
            ProtocolError::MissingTarget("group_id")
        );
    }

    #[test]
    fn test_clients_cannot_send_notifications() {
        let envelope = Envelope::parse(r#"{"kind":"notification","recipient_id":1}"#).unwrap();
        assert_eq!(
            envelope.target().unwrap_err(),
            ProtocolError::ForbiddenKind("notification".to_string())
        );
    }

    #[test]
    fn test_from_message_serialization() {
        let message = ChatMessage {
            id: 7,
            sender_id: 1,
            target: Target::Group(3),
            content: "hello".to_string(),
            created_at: 1_700_000_000,
        };

        let json = serde_json::to_string(&Envelope::from_message(&message)).unwrap();
        assert!(json.contains("\"kind\":\"group_message\""));
        assert!(json.contains("\"group_id\":3"));
        assert!(json.contains("\"id\":7"));
        assert!(!json.contains("recipient_id"));
        assert!(!json.contains("payload"));
    }

    #[test]
    fn test_notification_envelope() {
        let envelope = Envelope::notification(5, serde_json::json!({"type": "follow_request"}));
        assert_eq!(envelope.kind, EnvelopeKind::Notification);
        assert_eq!(envelope.recipient_id, Some(5));
        assert!(envelope.created_at.is_some());
    }
}
