//! Domain models for the booking engine.

pub mod actor;
pub mod api_key;
pub mod conversation;
pub mod event;
pub mod ids;
pub mod money;
pub mod notification;
pub mod outbox;
pub mod review;
pub mod service_request;

pub use actor::{Actor, Role};
pub use api_key::ApiKey;
pub use conversation::{BookingSummary, Conversation, ConversationSummary, Message, NewMessage};
pub use event::BookingEvent;
pub use ids::{
    ApiKeyId, ConversationId, EventId, MessageId, NotificationId, ReviewId, ServiceRequestId,
    UserId,
};
pub use money::{Currency, Money};
pub use notification::{NewNotification, Notification, RelatedRef};
pub use outbox::{OutboxEvent, OutboxStatus};
pub use review::{MAX_COMMENT_CHARS, Review};
pub use service_request::{
    NewServiceRequest, PaymentStatus, RequestStatus, ServiceRequest, Transition,
};
