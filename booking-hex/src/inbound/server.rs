//! HTTP Server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use booking_types::BookingRepository;

use super::auth::auth_middleware;
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::BookingService;
use crate::openapi::ApiDoc;

/// HTTP Server for the Booking API.
pub struct HttpServer<R: BookingRepository> {
    state: Arc<AppState<R>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: BookingRepository> HttpServer<R> {
    /// Creates a new HTTP server with the given service.
    pub fn new(service: BookingService<R>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::default()), // 100 req/min default
        }
    }

    /// Creates a new HTTP server with custom rate limiting.
    pub fn with_rate_limit(service: BookingService<R>, requests_per_minute: u32) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/bootstrap", post(handlers::bootstrap::<R>))
            .route(
                "/api/keys",
                post(handlers::create_api_key::<R>).get(handlers::list_api_keys::<R>),
            )
            .route(
                "/api/keys/{id}",
                axum::routing::delete(handlers::delete_api_key::<R>),
            )
            .route(
                "/api/service_requests",
                post(handlers::create_request::<R>).get(handlers::list_requests::<R>),
            )
            .route(
                "/api/service_requests/{id}",
                get(handlers::get_request::<R>).delete(handlers::delete_request::<R>),
            )
            .route(
                "/api/service_requests/{id}/accept",
                post(handlers::accept_request::<R>),
            )
            .route(
                "/api/service_requests/{id}/complete",
                post(handlers::complete_request::<R>),
            )
            .route(
                "/api/service_requests/{id}/cancel",
                post(handlers::cancel_request::<R>),
            )
            .route(
                "/api/service_requests/{id}/conversation",
                post(handlers::open_conversation::<R>),
            )
            .route(
                "/api/service_requests/{id}/payment_intent",
                post(handlers::create_payment_intent::<R>),
            )
            .route(
                "/api/service_requests/{id}/review",
                post(handlers::create_review::<R>),
            )
            .route("/api/conversations", get(handlers::list_conversations::<R>))
            .route(
                "/api/conversations/{id}/messages",
                get(handlers::list_messages::<R>).post(handlers::post_message::<R>),
            )
            .route("/api/notifications", get(handlers::list_notifications::<R>))
            .route(
                "/api/notifications/{id}/read",
                post(handlers::mark_notification_read::<R>),
            )
            .route(
                "/api/payments/webhook",
                post(handlers::payment_webhook::<R>),
            )
            .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R>,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
