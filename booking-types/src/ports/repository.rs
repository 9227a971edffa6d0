//! Repository port trait.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite, in-memory mocks) implement this trait.

use crate::domain::{
    ApiKey, ApiKeyId, Conversation, ConversationId, ConversationSummary, EventId, Message,
    NewMessage, NewNotification, Notification, NotificationId, OutboxEvent, Review, Role,
    ServiceRequest, ServiceRequestId, Transition, UserId,
};
use crate::dto::RequestFilter;
use crate::error::RepoError;

/// The storage port for the booking engine.
///
/// Every state change that produces a domain event MUST write the event to
/// the outbox in the same database transaction as the change itself.
#[async_trait::async_trait]
pub trait BookingRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Service Requests
    // ─────────────────────────────────────────────────────────────────────────────

    /// Persists a freshly created (pending) request.
    async fn create_request(&self, req: ServiceRequest) -> Result<ServiceRequest, RepoError>;

    async fn get_request(&self, id: ServiceRequestId)
    -> Result<Option<ServiceRequest>, RepoError>;

    /// Lists requests matching every set field of `filter`, newest first.
    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<ServiceRequest>, RepoError>;

    /// Applies a lifecycle transition as a compare-and-set on the current
    /// status and enqueues the resulting event.
    ///
    /// Fails with `NotFound`, or with `Domain(InvalidTransition)` when the
    /// row is no longer in a state the transition may start from. A
    /// `Complete` whose provider does not match fails with
    /// `Domain(Unauthorized)`.
    async fn apply_transition(
        &self,
        id: ServiceRequestId,
        transition: Transition,
    ) -> Result<(ServiceRequest, OutboxEvent), RepoError>;

    /// Deletes a request together with its conversation, messages and review.
    /// Notifications are left in place. Returns false if nothing was deleted.
    async fn delete_request(&self, id: ServiceRequestId) -> Result<bool, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Payments
    // ─────────────────────────────────────────────────────────────────────────────

    /// Stores the processor's intent reference on a completed, unpaid request.
    ///
    /// Compare-and-set on the previously read reference: fails with
    /// `Domain(AlreadyPaid)` once paid, and with `Conflict` if another intent
    /// was recorded since `expected` was read.
    async fn record_payment_intent(
        &self,
        id: ServiceRequestId,
        expected: Option<&str>,
        intent_id: &str,
    ) -> Result<ServiceRequest, RepoError>;

    /// Marks a completed, unpaid request as paid and enqueues `PaymentSucceeded`.
    ///
    /// Fails with `Domain(AlreadyPaid)` if it was already paid and with
    /// `Domain(InvalidTransition)` if it is not completed.
    async fn mark_paid(
        &self,
        id: ServiceRequestId,
    ) -> Result<(ServiceRequest, OutboxEvent), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Conversations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Returns the request's conversation, creating it if needed. Safe under
    /// concurrent callers: all of them observe the same conversation.
    async fn get_or_create_conversation(
        &self,
        request_id: ServiceRequestId,
    ) -> Result<Conversation, RepoError>;

    async fn get_conversation(&self, id: ConversationId)
    -> Result<Option<Conversation>, RepoError>;

    /// Inbox of `user`: conversations of requests they take part in, most
    /// recently active first.
    async fn list_conversations_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<ConversationSummary>, RepoError>;

    /// All messages of a conversation in commit order.
    async fn list_messages(&self, conversation_id: ConversationId)
    -> Result<Vec<Message>, RepoError>;

    /// Appends a message, bumps the conversation's activity and, when the
    /// message has a recipient, enqueues `MessagePosted`.
    async fn append_message(
        &self,
        msg: NewMessage,
    ) -> Result<(Message, Option<OutboxEvent>), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Notifications & Outbox
    // ─────────────────────────────────────────────────────────────────────────────

    async fn create_notification(&self, n: NewNotification) -> Result<Notification, RepoError>;

    /// Most recent notifications of `user`, at most `limit`. References to
    /// entities that no longer exist come back detached.
    async fn list_notifications(
        &self,
        user: UserId,
        limit: i64,
    ) -> Result<Vec<Notification>, RepoError>;

    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, RepoError>;

    /// Sets the read timestamp if unset. Idempotent.
    async fn mark_notification_read(&self, id: NotificationId) -> Result<Notification, RepoError>;

    /// Oldest pending outbox events first.
    async fn pending_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, RepoError>;

    /// Claims a pending event and stores its notifications atomically.
    /// Returns false if another dispatcher already delivered it.
    async fn deliver_event(
        &self,
        id: EventId,
        notifications: Vec<NewNotification>,
    ) -> Result<bool, RepoError>;

    /// Counts a failed delivery; parks the event once `max_attempts` is reached.
    async fn record_event_failure(
        &self,
        id: EventId,
        error: &str,
        max_attempts: i32,
    ) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Reviews
    // ─────────────────────────────────────────────────────────────────────────────

    /// Stores a review and enqueues `ReviewSubmitted`. A second review for the
    /// same request fails with `Domain(AlreadyReviewed)`.
    async fn create_review(&self, review: Review) -> Result<(Review, OutboxEvent), RepoError>;

    async fn get_review_for_request(
        &self,
        request_id: ServiceRequestId,
    ) -> Result<Option<Review>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // API Keys
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finds an active key by hash and records its use.
    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError>;

    /// Creates a key and returns it with the raw secret (shown once).
    async fn create_api_key(
        &self,
        name: &str,
        user_id: UserId,
        role: Role,
    ) -> Result<(ApiKey, String), RepoError>;

    async fn count_api_keys(&self) -> Result<i64, RepoError>;

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError>;

    /// Deactivates a key. Returns false if no active key had that id.
    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError>;
}
