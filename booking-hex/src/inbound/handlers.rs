//! HTTP request handlers.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use booking_types::{
    Actor, ApiKeyId, ApiKeyInfo, AppError, BookingRepository, BootstrapRequest,
    ConversationId, CreateApiKeyRequest, CreateReviewRequest, CreateServiceRequest,
    IssuedApiKey, NotificationId, NotificationQuery, PostMessageRequest, RequestFilter,
    ServiceRequestId,
};

use crate::BookingService;

/// Application state shared across handlers.
pub struct AppState<R: BookingRepository> {
    pub service: BookingService<R>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. } | AppError::AlreadyPaid | AppError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            AppError::InvalidPrice => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "kind": self.0.kind(),
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(AppError::Validation(format!("Invalid {} ID", what))))
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Service Requests
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn create_request<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateServiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.service.create_request(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// List service requests, newest first.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn list_requests<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Query(filter): Query<RequestFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = state.service.list_requests(&actor, filter).await?;
    Ok(Json(requests))
}

#[tracing::instrument(skip(state, actor), fields(request_id = %id))]
pub async fn get_request<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ServiceRequestId = parse_id(&id, "service request")?;
    let request = state.service.get_request(&actor, id).await?;
    Ok(Json(request))
}

#[tracing::instrument(skip(state, actor), fields(request_id = %id, user_id = %actor.user_id))]
pub async fn accept_request<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ServiceRequestId = parse_id(&id, "service request")?;
    let request = state.service.accept(&actor, id).await?;
    Ok(Json(request))
}

#[tracing::instrument(skip(state, actor), fields(request_id = %id, user_id = %actor.user_id))]
pub async fn complete_request<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ServiceRequestId = parse_id(&id, "service request")?;
    let request = state.service.complete(&actor, id).await?;
    Ok(Json(request))
}

#[tracing::instrument(skip(state, actor), fields(request_id = %id, user_id = %actor.user_id))]
pub async fn cancel_request<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ServiceRequestId = parse_id(&id, "service request")?;
    let request = state.service.cancel(&actor, id).await?;
    Ok(Json(request))
}

#[tracing::instrument(skip(state, actor), fields(request_id = %id))]
pub async fn delete_request<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ServiceRequestId = parse_id(&id, "service request")?;
    state.service.delete_request(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversations
// ─────────────────────────────────────────────────────────────────────────────

/// Find-or-create the conversation of a booking.
#[tracing::instrument(skip(state, actor), fields(request_id = %id))]
pub async fn open_conversation<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ServiceRequestId = parse_id(&id, "service request")?;
    let conversation = state.service.open_conversation(&actor, id).await?;
    Ok(Json(conversation))
}

#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn list_conversations<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let inbox = state.service.list_conversations(&actor).await?;
    Ok(Json(inbox))
}

#[tracing::instrument(skip(state, actor), fields(conversation_id = %id))]
pub async fn list_messages<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ConversationId = parse_id(&id, "conversation")?;
    let messages = state.service.list_messages(&actor, id).await?;
    Ok(Json(messages))
}

#[tracing::instrument(skip(state, actor, req), fields(conversation_id = %id))]
pub async fn post_message<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ConversationId = parse_id(&id, "conversation")?;
    let message = state.service.post_message(&actor, id, req.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn list_notifications<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let notifications = state
        .service
        .list_notifications(&actor, query.user_id)
        .await?;
    Ok(Json(notifications))
}

#[tracing::instrument(skip(state, actor), fields(notification_id = %id))]
pub async fn mark_notification_read<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: NotificationId = parse_id(&id, "notification")?;
    let notification = state.service.mark_notification_read(&actor, id).await?;
    Ok(Json(notification))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payments & Reviews
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, actor), fields(request_id = %id))]
pub async fn create_payment_intent<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ServiceRequestId = parse_id(&id, "service request")?;
    let intent = state.service.create_payment_intent(&actor, id).await?;
    Ok(Json(intent))
}

/// Processor webhook. Authenticated by its signature, not an API key.
#[tracing::instrument(skip_all)]
pub async fn payment_webhook<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok());
    let settled = state
        .service
        .handle_processor_webhook(&body, signature)
        .await?;
    Ok(Json(serde_json::json!({
        "received": true,
        "service_request_id": settled.map(|r| r.id),
    })))
}

#[tracing::instrument(skip(state, actor), fields(request_id = %id))]
pub async fn create_review<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ServiceRequestId = parse_id(&id, "service request")?;
    let review = state.service.create_review(&actor, id, req).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

// ─────────────────────────────────────────────────────────────────────────────
// API Key Management
// ─────────────────────────────────────────────────────────────────────────────

/// Bootstrap endpoint - creates the first API key.
///
/// This endpoint only works when there are NO existing API keys in the system.
/// The key is an admin key; the raw value is only shown once.
#[tracing::instrument(skip(state), fields(key_name = %req.name))]
pub async fn bootstrap<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<BootstrapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (key, raw_key) = state.service.bootstrap(&req.name, req.user_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(IssuedApiKey {
            api_key: raw_key,
            user_id: key.user_id,
            role: key.role,
            message: "First API key created. Save this key securely - it won't be shown again!"
                .into(),
        }),
    ))
}

/// Create a new API key (admin only).
#[tracing::instrument(skip(state, actor), fields(key_name = %req.name, role = %req.role))]
pub async fn create_api_key<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (key, raw_key) = state
        .service
        .create_api_key(&actor, &req.name, req.user_id, req.role)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IssuedApiKey {
            api_key: raw_key,
            user_id: key.user_id,
            role: key.role,
            message: "API key created. Save this key securely - it won't be shown again!".into(),
        }),
    ))
}

/// List all active API keys (without exposing raw keys).
#[tracing::instrument(skip(state, actor))]
pub async fn list_api_keys<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let keys = state.service.list_api_keys(&actor).await?;
    let response: Vec<ApiKeyInfo> = keys.into_iter().map(ApiKeyInfo::from).collect();
    Ok(Json(response))
}

/// Delete (deactivate) an API key.
#[tracing::instrument(skip(state, actor), fields(key_id = %id))]
pub async fn delete_api_key<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: ApiKeyId = parse_id(&id, "API key")?;
    state.service.revoke_api_key(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_types::RequestStatus;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                AppError::InvalidTransition {
                    from: RequestStatus::Completed,
                    action: "accept",
                },
                StatusCode::CONFLICT,
            ),
            (AppError::AlreadyPaid, StatusCode::CONFLICT),
            (AppError::InvalidPrice, StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::ExternalService("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn test_invalid_id_is_validation_error() {
        let err = parse_id::<ServiceRequestId>("not-a-uuid", "service request").unwrap_err();
        assert!(matches!(err.0, AppError::Validation(_)));
    }
}
