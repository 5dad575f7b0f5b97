//! Dispatcher: validates, persists and authorizes inbound chat messages.
//!
//! Persistence always happens before routing, so anything a user sees live is
//! already in the history they will load later. Group fan-out targets are
//! resolved here, outside the hub loop, because resolving them is I/O.

use crate::client::ClientId;
use crate::envelope::{ChatMessage, Envelope, GroupId, Target, UserId};
use crate::error::{DispatchError, ProtocolError};
use crate::hub::HubHandle;
use crate::repository::{GroupRepository, MessageRepository, NewDirectMessage, NewGroupMessage};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default maximum size of an inbound frame in bytes.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024;

/// Default maximum message length in characters.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 4000;

/// Inbound message limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub max_frame_bytes: usize,
    pub max_content_chars: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }
}

/// The authenticated connection a frame arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub user_id: UserId,
    pub client_id: ClientId,
}

/// A message that was persisted and handed to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Direct message routed to its recipient.
    Direct(ChatMessage),
    /// Group message routed to the current members.
    Group {
        message: ChatMessage,
        members: usize,
    },
}

/// Routes inbound frames from clients to the hub.
pub struct Dispatcher {
    hub: HubHandle,
    messages: Arc<dyn MessageRepository>,
    groups: Arc<dyn GroupRepository>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        hub: HubHandle,
        messages: Arc<dyn MessageRepository>,
        groups: Arc<dyn GroupRepository>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            hub,
            messages,
            groups,
            config,
        }
    }

    /// Handle one inbound text frame.
    ///
    /// Failures never close the connection: protocol errors are echoed to the
    /// originating connection, unauthorized group posts are dropped silently,
    /// and persistence failures are logged.
    pub async fn handle_frame(&self, origin: Origin, text: &str) {
        match self.dispatch(origin, text).await {
            Ok(Dispatched::Direct(message)) => {
                debug!(
                    user_id = origin.user_id,
                    message_id = message.id,
                    "Direct message dispatched"
                );
            }
            Ok(Dispatched::Group { message, members }) => {
                debug!(
                    user_id = origin.user_id,
                    message_id = message.id,
                    members,
                    "Group message dispatched"
                );
            }
            Err(DispatchError::Protocol(error)) => {
                debug!(user_id = origin.user_id, client_id = %origin.client_id, error = %error, "Rejected frame");
                self.reject(origin, &error).await;
            }
            Err(DispatchError::NotMember { user_id, group_id }) => {
                debug!(user_id, group_id, "Dropped group message from non-member");
            }
            Err(error) => {
                warn!(user_id = origin.user_id, error = %error, "Message not delivered");
            }
        }
    }

    /// Echo a protocol error to the originating connection only.
    pub async fn reject(&self, origin: Origin, error: &ProtocolError) {
        if let Err(e) = self
            .hub
            .deliver(origin.user_id, origin.client_id, Envelope::error(error.to_string()))
            .await
        {
            debug!(client_id = %origin.client_id, error = %e, "Could not echo error");
        }
    }

    /// Validate, persist and route one inbound frame.
    pub async fn dispatch(&self, origin: Origin, text: &str) -> Result<Dispatched, DispatchError> {
        if text.len() > self.config.max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                size: text.len(),
                max: self.config.max_frame_bytes,
            }
            .into());
        }

        let envelope = Envelope::parse(text)?;
        let target = envelope.target()?;
        let content = self.validate_content(envelope.content)?;

        match target {
            Target::User(recipient_id) => self.direct(origin.user_id, recipient_id, content).await,
            Target::Group(group_id) => self.group(origin.user_id, group_id, content).await,
        }
    }

    fn validate_content(&self, content: String) -> Result<String, ProtocolError> {
        if content.trim().is_empty() {
            return Err(ProtocolError::EmptyContent);
        }
        let len = content.chars().count();
        if len > self.config.max_content_chars {
            return Err(ProtocolError::ContentTooLong {
                len,
                max: self.config.max_content_chars,
            });
        }
        Ok(content)
    }

    async fn direct(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        content: String,
    ) -> Result<Dispatched, DispatchError> {
        let message = self
            .messages
            .save(NewDirectMessage {
                sender_id,
                recipient_id,
                content,
            })
            .await?;

        self.hub
            .route(Envelope::from_message(&message), vec![recipient_id])
            .await?;

        Ok(Dispatched::Direct(message))
    }

    async fn group(
        &self,
        sender_id: UserId,
        group_id: GroupId,
        content: String,
    ) -> Result<Dispatched, DispatchError> {
        if !self.groups.is_member(group_id, sender_id).await? {
            return Err(DispatchError::NotMember {
                user_id: sender_id,
                group_id,
            });
        }

        let message = self
            .messages
            .save_group_message(NewGroupMessage {
                sender_id,
                group_id,
                content,
            })
            .await?;

        let members = self.groups.list_member_ids(group_id).await?;
        let count = members.len();
        self.hub
            .route(Envelope::from_message(&message), members)
            .await?;

        Ok(Dispatched::Group {
            message,
            members: count,
        })
    }
}
