//! Booking-scoped conversations and their messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{ConversationId, MessageId, ServiceRequestId, UserId};
use super::service_request::RequestStatus;
use crate::error::DomainError;

/// The single chat thread of a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Conversation {
    pub id: ConversationId,
    /// Owning booking; unique across conversations.
    pub service_request_id: ServiceRequestId,
    pub created_at: DateTime<Utc>,
    /// Bumped on every message; orders the inbox.
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(service_request_id: ServiceRequestId) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            service_request_id,
            created_at: now,
            last_activity_at: now,
        }
    }
}

/// An immutable chat message.
///
/// `seq` is assigned inside the committing transaction, so ordering by it
/// matches commit order even when timestamps tie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    #[schema(example = "on my way")]
    pub content: String,
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub service_request_id: ServiceRequestId,
    pub sender_id: UserId,
    /// The other participant; `None` when nobody is there to notify yet.
    pub recipient_id: Option<UserId>,
    pub content: String,
}

impl NewMessage {
    /// Validates message content.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.content.trim().is_empty() {
            return Err(DomainError::Validation("Message content cannot be empty".into()));
        }
        Ok(())
    }
}

/// Booking fields shown next to a conversation in the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookingSummary {
    pub id: ServiceRequestId,
    pub service_type: String,
    pub address: String,
    pub status: RequestStatus,
}

/// Inbox entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub service_request: BookingSummary,
    pub last_message: Option<Message>,
}
