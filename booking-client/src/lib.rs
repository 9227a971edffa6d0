//! # Booking Client SDK
//!
//! A typed Rust client for the Booking API.

use booking_types::{
    ApiKeyId, ApiKeyInfo, BootstrapRequest, Conversation, ConversationId, ConversationSummary,
    CreateApiKeyRequest, CreateReviewRequest, CreateServiceRequest, IssuedApiKey, Message,
    Notification, NotificationId, NotificationQuery, PaymentIntentResponse, PostMessageRequest,
    RequestFilter, Review, Role, ServiceRequest, ServiceRequestId, UserId,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} ({kind}) - {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Booking API client.
pub struct BookingClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl BookingClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http: Client::new(),
        }
    }

    /// Sets the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Service requests
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_request(
        &self,
        req: &CreateServiceRequest,
    ) -> Result<ServiceRequest, ClientError> {
        self.send(self.request(reqwest::Method::POST, "/api/service_requests").json(req))
            .await
    }

    pub async fn get_request(&self, id: ServiceRequestId) -> Result<ServiceRequest, ClientError> {
        self.get(&format!("/api/service_requests/{}", id)).await
    }

    /// Lists requests matching `filter`. Non-admin callers must scope it.
    pub async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<ServiceRequest>, ClientError> {
        self.send(
            self.request(reqwest::Method::GET, "/api/service_requests")
                .query(filter),
        )
        .await
    }

    pub async fn accept(&self, id: ServiceRequestId) -> Result<ServiceRequest, ClientError> {
        self.post_empty(&format!("/api/service_requests/{}/accept", id))
            .await
    }

    pub async fn complete(&self, id: ServiceRequestId) -> Result<ServiceRequest, ClientError> {
        self.post_empty(&format!("/api/service_requests/{}/complete", id))
            .await
    }

    pub async fn cancel(&self, id: ServiceRequestId) -> Result<ServiceRequest, ClientError> {
        self.post_empty(&format!("/api/service_requests/{}/cancel", id))
            .await
    }

    /// Deletes a request (admin only).
    pub async fn delete_request(&self, id: ServiceRequestId) -> Result<(), ClientError> {
        self.send_no_content(self.request(
            reqwest::Method::DELETE,
            &format!("/api/service_requests/{}", id),
        ))
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conversations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn open_conversation(
        &self,
        request_id: ServiceRequestId,
    ) -> Result<Conversation, ClientError> {
        self.post_empty(&format!("/api/service_requests/{}/conversation", request_id))
            .await
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        self.get("/api/conversations").await
    }

    pub async fn list_messages(&self, id: ConversationId) -> Result<Vec<Message>, ClientError> {
        self.get(&format!("/api/conversations/{}/messages", id))
            .await
    }

    pub async fn post_message(
        &self,
        id: ConversationId,
        content: impl Into<String>,
    ) -> Result<Message, ClientError> {
        let body = PostMessageRequest {
            content: content.into(),
        };
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/api/conversations/{}/messages", id),
            )
            .json(&body),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────────────────

    /// Lists the caller's most recent notifications.
    pub async fn list_notifications(&self) -> Result<Vec<Notification>, ClientError> {
        self.send(
            self.request(reqwest::Method::GET, "/api/notifications")
                .query(&NotificationQuery::default()),
        )
        .await
    }

    pub async fn mark_notification_read(
        &self,
        id: NotificationId,
    ) -> Result<Notification, ClientError> {
        self.post_empty(&format!("/api/notifications/{}/read", id))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payments and reviews
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_payment_intent(
        &self,
        id: ServiceRequestId,
    ) -> Result<PaymentIntentResponse, ClientError> {
        self.post_empty(&format!("/api/service_requests/{}/payment_intent", id))
            .await
    }

    pub async fn create_review(
        &self,
        id: ServiceRequestId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Review, ClientError> {
        let body = CreateReviewRequest { rating, comment };
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/api/service_requests/{}/review", id),
            )
            .json(&body),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates the first admin key on a fresh deployment.
    pub async fn bootstrap(
        &self,
        name: &str,
        user_id: Option<UserId>,
    ) -> Result<IssuedApiKey, ClientError> {
        let body = BootstrapRequest {
            name: name.to_string(),
            user_id,
        };
        self.send(self.request(reqwest::Method::POST, "/api/bootstrap").json(&body))
            .await
    }

    pub async fn create_api_key(
        &self,
        name: &str,
        user_id: UserId,
        role: Role,
    ) -> Result<IssuedApiKey, ClientError> {
        let body = CreateApiKeyRequest {
            name: name.to_string(),
            user_id,
            role,
        };
        self.send(self.request(reqwest::Method::POST, "/api/keys").json(&body))
            .await
    }

    pub async fn list_api_keys(&self) -> Result<Vec<ApiKeyInfo>, ClientError> {
        self.get("/api/keys").await
    }

    pub async fn delete_api_key(&self, id: ApiKeyId) -> Result<(), ClientError> {
        self.send_no_content(self.request(reqwest::Method::DELETE, &format!("/api/keys/{}", id)))
            .await
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(self.request(reqwest::Method::GET, path)).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(self.request(reqwest::Method::POST, path)).await
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = Self::check(req.send().await?).await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_no_content(&self, req: RequestBuilder) -> Result<(), ClientError> {
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<serde_json::Value>(&body).ok();
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(|e| e.as_str())
                .map(String::from)
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            kind: field("kind").unwrap_or_else(|| "unknown".into()),
            message: field("error").unwrap_or(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BookingClient::new("http://localhost:3000");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = BookingClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_sends_bearer_key() {
        let client = BookingClient::new("http://localhost:3000").with_api_key("sk_test");
        let req = client
            .request(reqwest::Method::GET, "/api/conversations")
            .build()
            .unwrap();

        assert_eq!(req.url().as_str(), "http://localhost:3000/api/conversations");
        assert_eq!(
            req.headers()
                .get(reqwest::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok()),
            Some("Bearer sk_test")
        );
    }
}
