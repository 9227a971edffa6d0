//! Domain events emitted by booking operations.
//!
//! Events are facts: they are written to the outbox in the same transaction
//! as the state change that produced them and later fanned out into
//! notifications. Producers never talk to the fan-out directly.

use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, MessageId, ServiceRequestId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    RequestAccepted {
        request_id: ServiceRequestId,
        requester_id: UserId,
        provider_id: UserId,
    },
    RequestCompleted {
        request_id: ServiceRequestId,
        requester_id: UserId,
        provider_id: UserId,
    },
    RequestCancelled {
        request_id: ServiceRequestId,
        cancelled_by: UserId,
        /// The other participant, if one was assigned.
        counterpart: Option<UserId>,
    },
    MessagePosted {
        request_id: ServiceRequestId,
        conversation_id: ConversationId,
        message_id: MessageId,
        sender_id: UserId,
        recipient_id: UserId,
    },
    PaymentSucceeded {
        request_id: ServiceRequestId,
        requester_id: UserId,
        provider_id: Option<UserId>,
    },
    ReviewSubmitted {
        request_id: ServiceRequestId,
        provider_id: UserId,
        rating: u8,
    },
}

impl BookingEvent {
    /// Stable event name used in the outbox and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingEvent::RequestAccepted { .. } => "request.accepted",
            BookingEvent::RequestCompleted { .. } => "request.completed",
            BookingEvent::RequestCancelled { .. } => "request.cancelled",
            BookingEvent::MessagePosted { .. } => "message.posted",
            BookingEvent::PaymentSucceeded { .. } => "payment.succeeded",
            BookingEvent::ReviewSubmitted { .. } => "review.submitted",
        }
    }

    /// Booking the event belongs to.
    pub fn request_id(&self) -> ServiceRequestId {
        match self {
            BookingEvent::RequestAccepted { request_id, .. }
            | BookingEvent::RequestCompleted { request_id, .. }
            | BookingEvent::RequestCancelled { request_id, .. }
            | BookingEvent::MessagePosted { request_id, .. }
            | BookingEvent::PaymentSucceeded { request_id, .. }
            | BookingEvent::ReviewSubmitted { request_id, .. } => *request_id,
        }
    }
}
