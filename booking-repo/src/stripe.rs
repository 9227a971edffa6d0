//! Stripe payment-intent adapter.
//!
//! Talks to the Stripe REST API directly with reqwest. Only intent creation,
//! retrieval and cancellation are needed; capture happens between Stripe and
//! the payer.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use booking_types::{IntentRequest, IntentStatus, PaymentIntent, PaymentProcessor, ProcessorError};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Intent object as returned by `/v1/payment_intents`.
#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    status: String,
    amount: i64,
}

impl From<StripeIntent> for PaymentIntent {
    fn from(intent: StripeIntent) -> Self {
        PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret.unwrap_or_default(),
            status: IntentStatus::from_processor(&intent.status),
            amount: intent.amount,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

/// Extracts Stripe's human readable error message from a failure body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<StripeErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

pub struct StripeProcessor {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeProcessor {
    pub fn new(secret_key: impl Into<String>, api_base: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn read_intent(&self, resp: reqwest::Response) -> Result<PaymentIntent, ProcessorError> {
        let status = resp.status();
        if status.is_success() {
            let intent: StripeIntent = resp
                .json()
                .await
                .map_err(|e| ProcessorError::Unavailable(e.to_string()))?;
            return Ok(intent.into());
        }

        let body = resp.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(ProcessorError::Unavailable(message))
        } else {
            Err(ProcessorError::Rejected(message))
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    #[instrument(skip(self), fields(request_id = %req.service_request_id))]
    async fn create_intent(&self, req: IntentRequest) -> Result<PaymentIntent, ProcessorError> {
        let form = [
            ("amount", req.amount.amount().to_string()),
            ("currency", req.amount.currency().processor_code().to_string()),
            (
                "metadata[service_request_id]",
                req.service_request_id.to_string(),
            ),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let resp = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ProcessorError::Unavailable(e.to_string()))?;

        let intent = self.read_intent(resp).await?;
        debug!(intent_id = %intent.id, "Created payment intent");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ProcessorError> {
        let resp = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ProcessorError::Unavailable(e.to_string()))?;

        self.read_intent(resp).await
    }

    #[instrument(skip(self))]
    async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent, ProcessorError> {
        let resp = self
            .client
            .post(format!(
                "{}/v1/payment_intents/{}/cancel",
                self.api_base, intent_id
            ))
            .bearer_auth(&self.secret_key)
            .form(&[("cancellation_reason", "duplicate")])
            .send()
            .await
            .map_err(|e| ProcessorError::Unavailable(e.to_string()))?;

        let intent = self.read_intent(resp).await?;
        debug!(intent_id = %intent.id, "Cancelled payment intent");
        Ok(intent)
    }
}

/// Stand-in used when no processor key is configured.
pub struct DisabledProcessor;

#[async_trait]
impl PaymentProcessor for DisabledProcessor {
    async fn create_intent(&self, _req: IntentRequest) -> Result<PaymentIntent, ProcessorError> {
        Err(ProcessorError::NotConfigured)
    }

    async fn retrieve_intent(&self, _intent_id: &str) -> Result<PaymentIntent, ProcessorError> {
        Err(ProcessorError::NotConfigured)
    }

    async fn cancel_intent(&self, _intent_id: &str) -> Result<PaymentIntent, ProcessorError> {
        Err(ProcessorError::NotConfigured)
    }
}
