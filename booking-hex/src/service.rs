//! Booking Application Service
//!
//! Orchestrates the booking lifecycle through the repository and payment
//! processor ports. Every operation takes the calling `Actor` explicitly and
//! runs the access checks before touching storage. State changes commit their
//! outbox event with them; the service then hands the event to the fan-out
//! inline, and the background worker picks up anything that did not land.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use booking_repo::security::{hash_api_key, verify_processor_signature};
use booking_types::access;
use booking_types::{
    Actor, ApiKey, ApiKeyId, AppError, BookingRepository, Conversation, ConversationId,
    ConversationSummary, CreateReviewRequest, CreateServiceRequest, IntentRequest,
    IntentStatus, Message, NewMessage, NewNotification, Notification, NotificationId,
    OutboxEvent, PaymentIntentResponse, PaymentProcessor, ProcessorError, ProcessorEvent,
    RepoError, RequestFilter, RequestStatus, Review, Role, ServiceRequest, ServiceRequestId,
    Transition, UserId,
};

use crate::fanout::Fanout;

/// Processor event that settles a booking.
pub const PAYMENT_SUCCEEDED_EVENT: &str = "payment_intent.succeeded";

/// Tunable behaviour of the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Whether a provider may accept their own request.
    pub allow_self_accept: bool,
    /// How many notifications `list_notifications` returns.
    pub notification_window: i64,
    /// Delivery attempts before an outbox event is parked as failed.
    pub fanout_max_attempts: i32,
    /// Shared secret for processor webhooks. Webhooks are refused when unset.
    pub webhook_secret: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            allow_self_accept: false,
            notification_window: 20,
            fanout_max_attempts: 5,
            webhook_secret: None,
        }
    }
}

/// Application service for the booking engine.
///
/// Generic over `R: BookingRepository` - the adapter is injected at compile time.
/// The payment processor is a trait object so it can be chosen from config.
pub struct BookingService<R: BookingRepository> {
    repo: Arc<R>,
    processor: Arc<dyn PaymentProcessor>,
    fanout: Fanout<R>,
    config: ServiceConfig,
}

impl<R: BookingRepository> BookingService<R> {
    /// Creates a service with the default configuration.
    pub fn new(repo: R, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self::with_config(repo, processor, ServiceConfig::default())
    }

    pub fn with_config(
        repo: R,
        processor: Arc<dyn PaymentProcessor>,
        config: ServiceConfig,
    ) -> Self {
        let repo = Arc::new(repo);
        let fanout = Fanout::new(repo.clone(), config.fanout_max_attempts);
        Self {
            repo,
            processor,
            fanout,
            config,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Handle on the fan-out, for the background worker.
    pub fn fanout(&self) -> Fanout<R> {
        self.fanout.clone()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    async fn load_request(&self, id: ServiceRequestId) -> Result<ServiceRequest, AppError> {
        self.repo
            .get_request(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Service request {}", id)))
    }

    /// Conversation plus the booking its participants come from.
    async fn load_conversation(
        &self,
        id: ConversationId,
    ) -> Result<(Conversation, ServiceRequest), AppError> {
        let conversation = self
            .repo
            .get_conversation(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation {}", id)))?;
        let request = self.load_request(conversation.service_request_id).await?;
        Ok((conversation, request))
    }

    async fn dispatch(&self, event: &OutboxEvent) {
        // Undelivered events stay in the outbox for the worker.
        self.fanout.deliver(event).await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Service Requests
    // ─────────────────────────────────────────────────────────────────────────────

    /// Posts a new request in `pending`, owned by the caller.
    #[instrument(skip(self, req), fields(actor = %actor.user_id))]
    pub async fn create_request(
        &self,
        actor: &Actor,
        req: CreateServiceRequest,
    ) -> Result<ServiceRequest, AppError> {
        let request = ServiceRequest::new(actor.user_id, req.into_new()?)?;
        let created = self.repo.create_request(request).await?;
        info!(request_id = %created.id, "Service request created");
        Ok(created)
    }

    pub async fn get_request(
        &self,
        actor: &Actor,
        id: ServiceRequestId,
    ) -> Result<ServiceRequest, AppError> {
        let request = self.load_request(id).await?;
        access::can_view(&request, actor)?;
        Ok(request)
    }

    /// Lists requests, newest first.
    ///
    /// Non-admins must scope the query to themselves or to the open board;
    /// anything wider is refused rather than silently narrowed.
    pub async fn list_requests(
        &self,
        actor: &Actor,
        filter: RequestFilter,
    ) -> Result<Vec<ServiceRequest>, AppError> {
        access::can_list(actor, &filter)?;
        Ok(self.repo.list_requests(&filter).await?)
    }

    /// Takes a pending request. Exactly one of several racing providers wins.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn accept(
        &self,
        actor: &Actor,
        id: ServiceRequestId,
    ) -> Result<ServiceRequest, AppError> {
        access::require_role(actor, Role::Provider)?;
        let request = self.load_request(id).await?;
        if request.requester_id == actor.user_id && !self.config.allow_self_accept {
            return Err(AppError::Forbidden(
                "Cannot accept your own service request".into(),
            ));
        }

        let (updated, event) = self
            .repo
            .apply_transition(
                id,
                Transition::Accept {
                    provider: actor.user_id,
                },
            )
            .await?;
        info!("Service request accepted");
        self.dispatch(&event).await;
        Ok(updated)
    }

    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn complete(
        &self,
        actor: &Actor,
        id: ServiceRequestId,
    ) -> Result<ServiceRequest, AppError> {
        let request = self.load_request(id).await?;
        access::require_provider(&request, actor)?;

        let (updated, event) = self
            .repo
            .apply_transition(
                id,
                Transition::Complete {
                    provider: actor.user_id,
                },
            )
            .await?;
        info!("Service request completed");
        self.dispatch(&event).await;
        Ok(updated)
    }

    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn cancel(
        &self,
        actor: &Actor,
        id: ServiceRequestId,
    ) -> Result<ServiceRequest, AppError> {
        let request = self.load_request(id).await?;
        access::can_cancel(&request, actor)?;

        let (updated, event) = self
            .repo
            .apply_transition(id, Transition::Cancel { by: actor.user_id })
            .await?;
        info!("Service request cancelled");
        self.dispatch(&event).await;
        Ok(updated)
    }

    /// Administrative removal. Cascades to the conversation, its messages and
    /// the review; notifications survive without their link.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn delete_request(&self, actor: &Actor, id: ServiceRequestId) -> Result<(), AppError> {
        access::require_admin(actor)?;
        let request = self.load_request(id).await?;

        if !self.repo.delete_request(id).await? {
            return Err(AppError::NotFound(format!("Service request {}", id)));
        }
        info!("Service request deleted");

        let participants = std::iter::once(request.requester_id)
            .chain(request.provider_id.filter(|p| *p != request.requester_id));
        for recipient in participants {
            self.fanout
                .notify(NewNotification {
                    recipient_id: recipient,
                    title: "Request Removed".into(),
                    body: format!(
                        "The {} request for {} was removed by an administrator.",
                        request.service_type, request.scheduled_date
                    ),
                    link: None,
                    related: None,
                })
                .await;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Conversations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Returns the booking's conversation, creating it on first access.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn open_conversation(
        &self,
        actor: &Actor,
        request_id: ServiceRequestId,
    ) -> Result<Conversation, AppError> {
        let request = self.load_request(request_id).await?;
        access::require_participant(&request, actor)?;
        Ok(self.repo.get_or_create_conversation(request_id).await?)
    }

    /// The caller's inbox, most recently active first.
    pub async fn list_conversations(
        &self,
        actor: &Actor,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        Ok(self.repo.list_conversations_for_user(actor.user_id).await?)
    }

    pub async fn list_messages(
        &self,
        actor: &Actor,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, AppError> {
        let (_, request) = self.load_conversation(conversation_id).await?;
        access::require_participant(&request, actor)?;
        Ok(self.repo.list_messages(conversation_id).await?)
    }

    /// Appends a message and notifies the other participant, if there is one.
    #[instrument(skip(self, content), fields(actor = %actor.user_id))]
    pub async fn post_message(
        &self,
        actor: &Actor,
        conversation_id: ConversationId,
        content: String,
    ) -> Result<Message, AppError> {
        let (conversation, request) = self.load_conversation(conversation_id).await?;
        access::require_participant(&request, actor)?;

        let (message, event) = self
            .repo
            .append_message(NewMessage {
                conversation_id: conversation.id,
                service_request_id: request.id,
                sender_id: actor.user_id,
                recipient_id: request.counterpart_of(actor.user_id),
                content,
            })
            .await?;
        if let Some(event) = event {
            self.dispatch(&event).await;
        }
        Ok(message)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────────────────────

    /// Most recent notifications of `user`, defaulting to the caller.
    pub async fn list_notifications(
        &self,
        actor: &Actor,
        user: Option<UserId>,
    ) -> Result<Vec<Notification>, AppError> {
        let user = user.unwrap_or(actor.user_id);
        access::require_self(user, actor)?;
        Ok(self
            .repo
            .list_notifications(user, self.config.notification_window)
            .await?)
    }

    /// Marks a notification read. Marking it again changes nothing.
    pub async fn mark_notification_read(
        &self,
        actor: &Actor,
        id: NotificationId,
    ) -> Result<Notification, AppError> {
        let notification = self
            .repo
            .get_notification(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {}", id)))?;
        access::require_self(notification.recipient_id, actor)?;
        if notification.is_read() {
            return Ok(notification);
        }
        Ok(self.repo.mark_notification_read(id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Payments
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens (or reuses) a processor intent for a completed, unpaid booking.
    ///
    /// Calling it again while the recorded intent is still open returns that
    /// same intent; `AlreadyPaid` only comes back once the payment succeeded.
    /// If a concurrent call records its intent first, the intent created here
    /// is cancelled at the processor and the recorded one is returned.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn create_payment_intent(
        &self,
        actor: &Actor,
        id: ServiceRequestId,
    ) -> Result<PaymentIntentResponse, AppError> {
        let request = self.load_request(id).await?;
        access::require_requester(&request, actor)?;
        if request.is_paid() {
            return Err(AppError::AlreadyPaid);
        }
        if request.status != RequestStatus::Completed {
            return Err(AppError::InvalidTransition {
                from: request.status,
                action: "pay",
            });
        }
        let price = request
            .price
            .filter(|p| p.is_chargeable())
            .ok_or(AppError::InvalidPrice)?;

        if let Some(existing) = &request.payment_intent_id {
            if let Some(open) = self.reconcile_intent(id, existing).await? {
                return Ok(open);
            }
        }

        let intent = self
            .processor
            .create_intent(IntentRequest {
                amount: price,
                service_request_id: id,
            })
            .await?;

        match self
            .repo
            .record_payment_intent(id, request.payment_intent_id.as_deref(), &intent.id)
            .await
        {
            Ok(_) => {
                info!(intent_id = %intent.id, "Payment intent created");
                Ok(PaymentIntentResponse {
                    client_secret: intent.client_secret,
                    intent_id: intent.id,
                })
            }
            Err(RepoError::Conflict(_)) => {
                self.discard_intent(&intent.id).await;
                let current = self.load_request(id).await?;
                if current.is_paid() {
                    return Err(AppError::AlreadyPaid);
                }
                let recorded = current.payment_intent_id.ok_or_else(|| {
                    AppError::Conflict("Payment intent changed concurrently".into())
                })?;
                self.reconcile_intent(id, &recorded).await?.ok_or_else(|| {
                    AppError::Conflict("Payment intent changed concurrently".into())
                })
            }
            Err(e) => {
                self.discard_intent(&intent.id).await;
                Err(e.into())
            }
        }
    }

    /// Checks a recorded intent with the processor.
    ///
    /// Returns it when still open, settles the booking when it already
    /// succeeded, and returns `None` when it was cancelled.
    async fn reconcile_intent(
        &self,
        id: ServiceRequestId,
        intent_id: &str,
    ) -> Result<Option<PaymentIntentResponse>, AppError> {
        let intent = self.processor.retrieve_intent(intent_id).await?;
        match intent.status {
            IntentStatus::Open => Ok(Some(PaymentIntentResponse {
                client_secret: intent.client_secret,
                intent_id: intent.id,
            })),
            IntentStatus::Succeeded => {
                // Paid at the processor but the webhook has not landed yet.
                match self.settle(id).await {
                    Ok(_) | Err(AppError::AlreadyPaid) => Err(AppError::AlreadyPaid),
                    Err(e) => Err(e),
                }
            }
            IntentStatus::Canceled => {
                info!(intent_id = %intent.id, "Replacing cancelled payment intent");
                Ok(None)
            }
        }
    }

    /// Cancels an intent that was never recorded. Failures only leave an
    /// unreferenced intent behind at the processor.
    async fn discard_intent(&self, intent_id: &str) {
        match self.processor.cancel_intent(intent_id).await {
            Ok(_) => info!(%intent_id, "Cancelled unrecorded payment intent"),
            Err(e) => warn!(%intent_id, error = %e, "Failed to cancel unrecorded payment intent"),
        }
    }

    async fn settle(&self, id: ServiceRequestId) -> Result<ServiceRequest, AppError> {
        let (updated, event) = self.repo.mark_paid(id).await?;
        info!(request_id = %id, "Service request paid");
        self.dispatch(&event).await;
        Ok(updated)
    }

    /// Marks a booking paid for a succeeded processor intent. Idempotent.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        id: ServiceRequestId,
        intent_id: &str,
    ) -> Result<ServiceRequest, AppError> {
        let request = self.load_request(id).await?;
        if let Some(recorded) = &request.payment_intent_id {
            if recorded != intent_id {
                warn!(%recorded, "Payment confirmed for a superseded intent");
            }
        }

        match self.settle(id).await {
            Err(AppError::AlreadyPaid) => self.load_request(id).await,
            other => other,
        }
    }

    /// Verifies and applies a processor webhook.
    ///
    /// Returns the settled booking, or `None` when the event type is not one
    /// the engine acts on.
    #[instrument(skip_all)]
    pub async fn handle_processor_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<Option<ServiceRequest>, AppError> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::from(ProcessorError::NotConfigured))?;
        let signature = signature
            .ok_or_else(|| AppError::Validation("Missing Stripe-Signature header".into()))?;
        verify_processor_signature(payload, signature, secret, chrono::Utc::now().timestamp())
            .map_err(|e| AppError::Validation(format!("Invalid webhook signature: {}", e)))?;

        let event: ProcessorEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {}", e)))?;
        if event.event_type != PAYMENT_SUCCEEDED_EVENT {
            info!(event_type = %event.event_type, "Ignoring processor event");
            return Ok(None);
        }

        let id = event.service_request_id().ok_or_else(|| {
            AppError::Validation("Payment intent carries no service_request_id".into())
        })?;
        self.confirm_payment(id, &event.data.object.id).await.map(Some)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reviews
    // ─────────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, req), fields(actor = %actor.user_id, rating = req.rating))]
    pub async fn create_review(
        &self,
        actor: &Actor,
        id: ServiceRequestId,
        req: CreateReviewRequest,
    ) -> Result<Review, AppError> {
        let request = self.load_request(id).await?;
        access::require_reviewer(&request, actor)?;

        let review = Review::new(&request, actor.user_id, req.rating, req.comment)?;
        let (review, event) = self.repo.create_review(review).await?;
        self.dispatch(&event).await;
        Ok(review)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // API Keys
    // ─────────────────────────────────────────────────────────────────────────────

    /// Resolves a raw bearer key to the actor it belongs to.
    pub async fn authenticate(&self, raw_key: &str) -> Result<Option<Actor>, AppError> {
        let key = self.repo.verify_api_key_hash(&hash_api_key(raw_key)).await?;
        Ok(key.map(|k| k.actor()))
    }

    /// Creates the first admin key. Refused once any key exists.
    pub async fn bootstrap(
        &self,
        name: &str,
        user_id: Option<UserId>,
    ) -> Result<(ApiKey, String), AppError> {
        if self.repo.count_api_keys().await? > 0 {
            return Err(AppError::Validation(
                "Bootstrap not allowed: API keys already exist. Use an existing key to create new ones.".into(),
            ));
        }
        let user_id = user_id.unwrap_or_default();
        let created = self.repo.create_api_key(name, user_id, Role::Admin).await?;
        info!(key_id = %created.0.id, "Bootstrapped admin key");
        Ok(created)
    }

    pub async fn create_api_key(
        &self,
        actor: &Actor,
        name: &str,
        user_id: UserId,
        role: Role,
    ) -> Result<(ApiKey, String), AppError> {
        access::require_admin(actor)?;
        if name.trim().is_empty() {
            return Err(AppError::Validation("Key name cannot be empty".into()));
        }
        Ok(self.repo.create_api_key(name, user_id, role).await?)
    }

    pub async fn list_api_keys(&self, actor: &Actor) -> Result<Vec<ApiKey>, AppError> {
        access::require_admin(actor)?;
        Ok(self.repo.list_api_keys().await?)
    }

    pub async fn revoke_api_key(&self, actor: &Actor, id: ApiKeyId) -> Result<(), AppError> {
        access::require_admin(actor)?;
        if self.repo.delete_api_key(id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("API key {}", id)))
        }
    }
}
