//! Error types for the real-time module.

use crate::envelope::{GroupId, UserId};
use thiserror::Error;

/// Errors surfaced by the hub handle.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The hub loop has stopped and no longer accepts requests.
    #[error("hub is not running")]
    HubClosed,
}

/// Errors that end a client connection.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying connection failed to read or write.
    #[error("transport error: {0}")]
    Transport(String),

    /// No pong arrived within the read deadline.
    #[error("read deadline exceeded")]
    ReadTimeout,

    /// A frame could not be written within the write deadline.
    #[error("write deadline exceeded")]
    WriteTimeout,

    /// An outbound envelope could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Registration with the hub failed.
    #[error(transparent)]
    Hub(#[from] RealtimeError),
}

/// A frame the client sent that cannot be processed.
///
/// These are echoed back to the originating connection as `error` envelopes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not a valid envelope.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame exceeds the configured size limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Only text frames carry envelopes.
    #[error("binary frames are not supported")]
    BinaryFrame,

    /// The envelope kind cannot be sent by clients.
    #[error("kind '{0}' cannot be sent by clients")]
    ForbiddenKind(String),

    /// The envelope is missing its target.
    #[error("missing field: {0}")]
    MissingTarget(&'static str),

    /// The message has no content.
    #[error("message content is empty")]
    EmptyContent,

    /// The message content is too long.
    #[error("message content too long: {len} characters (max {max})")]
    ContentTooLong { len: usize, max: usize },
}

/// Errors raised by external collaborators (stores, membership lookups).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store rejected or failed the operation.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Outcomes of dispatching an inbound frame that did not lead to delivery.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The frame was malformed or invalid.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The sender is not allowed to post to the target.
    #[error("user {user_id} is not a member of group {group_id}")]
    NotMember { user_id: UserId, group_id: GroupId },

    /// Persisting the message or resolving membership failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),

    /// The hub is gone.
    #[error(transparent)]
    Hub(#[from] RealtimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_from_encoding_failure() {
        let encode_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = ClientError::from(encode_error);
        assert!(matches!(error, ClientError::Serialization(_)));
        assert!(error.to_string().starts_with("serialization error"));
    }

    #[test]
    fn test_hub_error_is_transparent_in_client_error() {
        let error = ClientError::from(RealtimeError::HubClosed);
        assert_eq!(error.to_string(), "hub is not running");
    }
}
