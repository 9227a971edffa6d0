//! Payment processor port.
//!
//! The processor owns capture; the engine only creates, inspects and cancels
//! intents.
//! Implementations can be HTTP clients, mock processors, etc.

use serde::{Deserialize, Serialize};

use crate::domain::{Money, ServiceRequestId};

/// Error type for payment processor operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessorError {
    /// The processor refused the request; carries its message verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),

    #[error("Payment processor is not configured")]
    NotConfigured,
}

/// Processor-side lifecycle of an intent, collapsed to what the engine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Waiting on the payer (any of the processor's requires_* / processing states).
    Open,
    Succeeded,
    Canceled,
}

impl IntentStatus {
    /// Maps a processor status string.
    pub fn from_processor(status: &str) -> Self {
        match status {
            "succeeded" => IntentStatus::Succeeded,
            "canceled" => IntentStatus::Canceled,
            _ => IntentStatus::Open,
        }
    }
}

/// Input for creating an intent.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub amount: Money,
    /// Stored as processor metadata so webhooks can find the booking.
    pub service_request_id: ServiceRequestId,
}

/// A payment intent as seen by the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub status: IntentStatus,
    pub amount: i64,
}

/// Port trait for payment processors.
#[async_trait::async_trait]
pub trait PaymentProcessor: Send + Sync + 'static {
    /// Creates an intent for `amount`, tagged with the booking id.
    async fn create_intent(&self, req: IntentRequest) -> Result<PaymentIntent, ProcessorError>;

    /// Fetches an existing intent by its processor reference.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ProcessorError>;

    /// Cancels an intent that lost the race to be recorded on its booking.
    async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent, ProcessorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_status_mapping() {
        assert_eq!(IntentStatus::from_processor("succeeded"), IntentStatus::Succeeded);
        assert_eq!(IntentStatus::from_processor("canceled"), IntentStatus::Canceled);
        assert_eq!(
            IntentStatus::from_processor("requires_payment_method"),
            IntentStatus::Open
        );
    }
}
