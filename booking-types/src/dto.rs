//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    ApiKey, ApiKeyId, Currency, Money, NewServiceRequest, RequestStatus, Role, UserId,
};
use crate::error::DomainError;

// ─────────────────────────────────────────────────────────────────────────────
// Service Request DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to post a new service request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateServiceRequest {
    #[schema(example = "mowing")]
    pub service_type: String,
    #[serde(default)]
    #[schema(example = "123 Maple Ave")]
    pub address: Option<String>,
    #[serde(default)]
    #[schema(example = "2026-05-01")]
    pub scheduled_date: Option<NaiveDate>,
    /// Price in smallest currency unit (e.g., cents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 4500)]
    pub price: Option<i64>,
    #[serde(default)]
    pub currency: Currency,
}

impl CreateServiceRequest {
    /// Converts the payload into domain input; rejects negative prices.
    pub fn into_new(self) -> Result<NewServiceRequest, DomainError> {
        let price = self
            .price
            .map(|amount| Money::new(amount, self.currency))
            .transpose()?;
        Ok(NewServiceRequest {
            service_type: self.service_type,
            address: self.address,
            scheduled_date: self.scheduled_date,
            price,
        })
    }
}

/// Filter for listing service requests. Every field narrows the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequestFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn requested_by(user: UserId) -> Self {
        Self {
            requester_id: Some(user),
            ..Default::default()
        }
    }

    pub fn provided_by(user: UserId) -> Self {
        Self {
            provider_id: Some(user),
            ..Default::default()
        }
    }

    pub fn open() -> Self {
        Self {
            status: Some(RequestStatus::Pending),
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to post a chat message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostMessageRequest {
    #[schema(example = "on my way")]
    pub content: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Notification DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Query for listing notifications. Defaults to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Review DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to review a completed booking.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateReviewRequest {
    #[schema(minimum = 1, maximum = 5, example = 5)]
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Great job")]
    pub comment: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Client-side handle for collecting a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntentResponse {
    /// Secret the client hands to the processor's SDK
    #[schema(example = "pi_3Nabc_secret_xyz")]
    pub client_secret: String,
    #[schema(example = "pi_3Nabc")]
    pub intent_id: String,
}

/// Webhook event sent by the payment processor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessorEvent {
    #[serde(rename = "type")]
    #[schema(example = "payment_intent.succeeded")]
    pub event_type: String,
    pub data: ProcessorEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessorEventData {
    pub object: ProcessorIntentObject,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessorIntentObject {
    pub id: String,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

impl ProcessorEvent {
    /// Booking id carried in the intent metadata, if present and well-formed.
    pub fn service_request_id(&self) -> Option<crate::domain::ServiceRequestId> {
        self.data
            .object
            .metadata
            .get("service_request_id")
            .and_then(|s| s.parse().ok())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Key DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request for the first admin key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BootstrapRequest {
    /// Name for the API key
    #[schema(example = "ops-admin")]
    pub name: String,
    /// User the key acts as; a fresh id is minted when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// Request to create a new API key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateApiKeyRequest {
    #[schema(example = "provider-app")]
    pub name: String,
    /// Marketplace user the key authenticates as
    pub user_id: UserId,
    pub role: Role,
}

/// A freshly issued key. The raw value is only ever returned here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssuedApiKey {
    #[schema(example = "sk_abc123xyz...")]
    pub api_key: String,
    pub user_id: UserId,
    pub role: Role,
    pub message: String,
}

/// API key info without the raw key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyInfo {
    #[schema(value_type = String, example = "123e4567-e89b-12d3-a456-426614174000")]
    pub id: ApiKeyId,
    pub name: String,
    pub user_id: UserId,
    pub role: Role,
    pub is_active: bool,
    /// When the key was created (ISO 8601)
    #[schema(value_type = String, example = "2026-01-01T00:00:00Z")]
    pub created_at: String,
    /// When the key was last used (ISO 8601)
    #[schema(value_type = Option<String>)]
    pub last_used_at: Option<String>,
}

impl From<ApiKey> for ApiKeyInfo {
    fn from(k: ApiKey) -> Self {
        Self {
            id: k.id,
            name: k.name,
            user_id: k.user_id,
            role: k.role,
            is_active: k.is_active,
            created_at: k.created_at.to_rfc3339(),
            last_used_at: k.last_used_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_price_is_rejected() {
        let req = CreateServiceRequest {
            service_type: "mowing".into(),
            address: Some("123 Maple Ave".into()),
            scheduled_date: NaiveDate::from_ymd_opt(2026, 5, 1),
            price: Some(-1),
            currency: Currency::USD,
        };
        assert!(matches!(req.into_new(), Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateServiceRequest =
            serde_json::from_str(r#"{"service_type":"mowing"}"#).unwrap();
        assert!(req.address.is_none());
        assert!(req.scheduled_date.is_none());
        assert_eq!(req.currency, Currency::USD);
    }

    #[test]
    fn test_processor_event_metadata() {
        let id = crate::domain::ServiceRequestId::new();
        let raw = serde_json::json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1", "metadata": { "service_request_id": id.to_string() } } }
        });
        let event: ProcessorEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.service_request_id(), Some(id));
    }
}
