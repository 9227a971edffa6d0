//! Notification fan-out.
//!
//! Turns outbox events into per-user notifications. Delivery claims the
//! outbox row and stores the notifications in one repository transaction,
//! so an event is delivered once no matter how many dispatchers race on it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use booking_types::{
    BookingEvent, BookingRepository, NewNotification, OutboxEvent, RelatedRef, RepoError,
};

/// Notifications an event produces, one per recipient.
pub fn notifications_for(event: &BookingEvent) -> Vec<NewNotification> {
    match *event {
        BookingEvent::RequestAccepted {
            request_id,
            requester_id,
            ..
        } => vec![NewNotification::about(
            requester_id,
            "Request Accepted",
            "A provider has accepted your service request.",
            RelatedRef::ServiceRequest(request_id),
        )],
        BookingEvent::RequestCompleted {
            request_id,
            requester_id,
            ..
        } => vec![NewNotification::about(
            requester_id,
            "Job Completed",
            "Your service request is complete. You can now pay and leave a review.",
            RelatedRef::ServiceRequest(request_id),
        )],
        BookingEvent::RequestCancelled {
            request_id,
            counterpart,
            ..
        } => counterpart
            .map(|recipient| {
                NewNotification::about(
                    recipient,
                    "Request Cancelled",
                    "A service request you are part of was cancelled.",
                    RelatedRef::ServiceRequest(request_id),
                )
            })
            .into_iter()
            .collect(),
        BookingEvent::MessagePosted {
            conversation_id,
            recipient_id,
            ..
        } => vec![NewNotification::about(
            recipient_id,
            "New Message",
            "You have a new message regarding your service request.",
            RelatedRef::Conversation(conversation_id),
        )],
        BookingEvent::PaymentSucceeded {
            request_id,
            provider_id,
            ..
        } => provider_id
            .map(|recipient| {
                NewNotification::about(
                    recipient,
                    "Payment Received",
                    "The requester has paid for a completed job.",
                    RelatedRef::ServiceRequest(request_id),
                )
            })
            .into_iter()
            .collect(),
        BookingEvent::ReviewSubmitted {
            request_id,
            provider_id,
            rating,
        } => vec![NewNotification::about(
            provider_id,
            "New Review",
            format!("You received a {}-star review.", rating),
            RelatedRef::ServiceRequest(request_id),
        )],
    }
}

/// Delivers outbox events and direct notifications.
pub struct Fanout<R: BookingRepository> {
    repo: Arc<R>,
    max_attempts: i32,
}

impl<R: BookingRepository> Clone for Fanout<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            max_attempts: self.max_attempts,
        }
    }
}

impl<R: BookingRepository> Fanout<R> {
    pub fn new(repo: Arc<R>, max_attempts: i32) -> Self {
        Self { repo, max_attempts }
    }

    /// Creates a single notification. Failures are logged, never returned.
    pub async fn notify(&self, notification: NewNotification) {
        let recipient = notification.recipient_id;
        if let Err(e) = self.repo.create_notification(notification).await {
            warn!(%recipient, "Failed to create notification: {}", e);
        }
    }

    /// Delivers one event. Returns true if this call performed the delivery,
    /// false if it was already delivered or the attempt failed.
    #[instrument(skip(self, event), fields(event_id = %event.id, kind = event.event.kind()))]
    pub async fn deliver(&self, event: &OutboxEvent) -> bool {
        let notifications = notifications_for(&event.event);
        match self.repo.deliver_event(event.id, notifications).await {
            Ok(true) => {
                debug!("Delivered event");
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Event delivery failed: {}", e);
                if let Err(e) = self
                    .repo
                    .record_event_failure(event.id, &e.to_string(), self.max_attempts)
                    .await
                {
                    error!("Failed to record delivery failure: {}", e);
                }
                false
            }
        }
    }

    /// Delivers up to `batch` pending events, oldest first.
    pub async fn dispatch_pending(&self, batch: i64) -> Result<usize, RepoError> {
        let events = self.repo.pending_events(batch).await?;
        let mut delivered = 0;
        for event in &events {
            if self.deliver(event).await {
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}

/// Background loop that re-polls the outbox for undelivered events.
pub struct FanoutWorker<R: BookingRepository> {
    fanout: Fanout<R>,
    interval: Duration,
    batch: i64,
}

impl<R: BookingRepository> FanoutWorker<R> {
    pub fn new(fanout: Fanout<R>, interval: Duration) -> Self {
        Self {
            fanout,
            interval,
            batch: 50,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(self) {
        info!("Starting fan-out worker, polling every {:?}", self.interval);
        loop {
            match self.fanout.dispatch_pending(self.batch).await {
                Ok(0) => {}
                Ok(n) => info!("Delivered {} pending events", n),
                Err(e) => error!("Failed to fetch pending events: {}", e),
            }
            sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_types::{ConversationId, MessageId, ServiceRequestId, UserId};

    #[test]
    fn test_message_notifies_recipient_with_conversation_link() {
        let conversation_id = ConversationId::new();
        let recipient = UserId::new();
        let notifications = notifications_for(&BookingEvent::MessagePosted {
            request_id: ServiceRequestId::new(),
            conversation_id,
            message_id: MessageId::new(),
            sender_id: UserId::new(),
            recipient_id: recipient,
        });

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].recipient_id, recipient);
        assert_eq!(
            notifications[0].related,
            Some(RelatedRef::Conversation(conversation_id))
        );
        assert!(notifications[0].link.is_some());
    }

    #[test]
    fn test_cancel_without_counterpart_notifies_nobody() {
        let notifications = notifications_for(&BookingEvent::RequestCancelled {
            request_id: ServiceRequestId::new(),
            cancelled_by: UserId::new(),
            counterpart: None,
        });
        assert!(notifications.is_empty());
    }

    #[test]
    fn test_lifecycle_recipients() {
        let request_id = ServiceRequestId::new();
        let requester = UserId::new();
        let provider = UserId::new();

        let accepted = notifications_for(&BookingEvent::RequestAccepted {
            request_id,
            requester_id: requester,
            provider_id: provider,
        });
        let completed = notifications_for(&BookingEvent::RequestCompleted {
            request_id,
            requester_id: requester,
            provider_id: provider,
        });
        let paid = notifications_for(&BookingEvent::PaymentSucceeded {
            request_id,
            requester_id: requester,
            provider_id: Some(provider),
        });
        let reviewed = notifications_for(&BookingEvent::ReviewSubmitted {
            request_id,
            provider_id: provider,
            rating: 4,
        });

        assert_eq!(accepted[0].recipient_id, requester);
        assert_eq!(completed[0].recipient_id, requester);
        assert_eq!(paid[0].recipient_id, provider);
        assert_eq!(reviewed[0].recipient_id, provider);
        assert!(reviewed[0].body.contains("4-star"));
    }
}
