//! # Booking Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter and payment processor
//! - Create the booking service and start the fan-out worker
//! - Start the HTTP server

mod config;

use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use booking_hex::{BookingService, FanoutWorker, inbound::HttpServer};
use booking_repo::build_repo;
use booking_repo::stripe::{DisabledProcessor, StripeProcessor};
use booking_types::PaymentProcessor;

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("booking-service"), provider))
}

fn build_processor(config: &config::Config) -> anyhow::Result<Arc<dyn PaymentProcessor>> {
    match &config.stripe_secret_key {
        Some(key) => Ok(Arc::new(StripeProcessor::new(
            key.clone(),
            config.stripe_api_base.clone(),
        )?)),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set; payment intents are disabled");
            Ok(Arc::new(DisabledProcessor))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    let otel = if config.otlp_enabled {
        Some(init_tracer()?)
    } else {
        None
    };
    let telemetry = otel
        .as_ref()
        .map(|(tracer, _)| tracing_opentelemetry::layer().with_tracer(tracer.clone()));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,booking_app=debug,booking_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    tracing::info!("Starting booking server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;
    let processor = build_processor(&config)?;
    if config.stripe_webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set; processor webhooks will be refused");
    }

    let service = BookingService::with_config(repo, processor, config.service_config());

    // Re-deliver anything the inline fan-out missed
    let worker = FanoutWorker::new(service.fanout(), config.fanout_interval);
    tokio::spawn(worker.run());

    let server = HttpServer::with_rate_limit(service, config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces are flushed before exit
    if let Some((_, provider)) = otel {
        let _ = provider.shutdown();
    }
    Ok(())
}
