//! Authentication middleware for API key validation.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use booking_types::BookingRepository;

use super::handlers::AppState;

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

/// Routes that carry their own protection (or none).
fn is_public(method: &Method, path: &str) -> bool {
    path == "/health"
        || path.starts_with("/docs")
        || path == "/api-docs/openapi.json"
        || (method == Method::POST && path == "/api/bootstrap")
        || (method == Method::POST && path == "/api/payments/webhook")
}

/// Authentication middleware that resolves API keys to an `Actor`.
///
/// The resolved actor is stored in the request extensions for handlers and
/// the rate limiter. Bypassed for health, docs, bootstrap (only works while
/// no keys exist) and the signature-verified processor webhook.
pub async fn auth_middleware<R: BookingRepository>(
    State(state): State<Arc<AppState<R>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let api_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    match state.service.authenticate(&api_key).await {
        Ok(Some(actor)) => {
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        Ok(None) => unauthorized_response("Invalid API key"),
        Err(e) => {
            tracing::error!("API key verification failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error",
                    "code": 500
                })),
            )
                .into_response()
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": 401
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_key_bearer() {
        assert_eq!(
            extract_api_key(Some("Bearer sk_test_123")),
            Some("sk_test_123")
        );
    }

    #[test]
    fn test_extract_api_key_raw() {
        assert_eq!(extract_api_key(Some("sk_test_123")), Some("sk_test_123"));
    }

    #[test]
    fn test_extract_api_key_none() {
        assert_eq!(extract_api_key(None), None);
    }

    #[test]
    fn test_public_routes() {
        assert!(is_public(&Method::GET, "/health"));
        assert!(is_public(&Method::POST, "/api/bootstrap"));
        assert!(is_public(&Method::POST, "/api/payments/webhook"));
        assert!(is_public(&Method::GET, "/docs/"));
        assert!(!is_public(&Method::GET, "/api/bootstrap"));
        assert!(!is_public(&Method::GET, "/api/service_requests"));
    }
}
