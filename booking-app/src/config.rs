//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use booking_hex::ServiceConfig;

/// Application configuration.
#[derive(Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    /// Overrides the Stripe API base URL (useful against a local mock)
    pub stripe_api_base: Option<String>,
    pub allow_self_accept: bool,
    pub notification_window: i64,
    pub fanout_interval: Duration,
    pub fanout_max_attempts: i32,
    pub rate_limit_per_minute: u32,
    /// OTLP export is only wired when an endpoint is configured
    pub otlp_enabled: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        Ok(Self {
            port: parse_or(var("PORT"), "PORT", 3000)?,
            database_url,
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            stripe_api_base: var("STRIPE_API_BASE"),
            allow_self_accept: parse_or(var("ALLOW_SELF_ACCEPT"), "ALLOW_SELF_ACCEPT", false)?,
            notification_window: parse_or(var("NOTIFICATION_WINDOW"), "NOTIFICATION_WINDOW", 20)?,
            fanout_interval: Duration::from_secs(parse_or(
                var("FANOUT_INTERVAL_SECS"),
                "FANOUT_INTERVAL_SECS",
                5,
            )?),
            fanout_max_attempts: parse_or(var("FANOUT_MAX_ATTEMPTS"), "FANOUT_MAX_ATTEMPTS", 5)?,
            rate_limit_per_minute: parse_or(
                var("RATE_LIMIT_PER_MINUTE"),
                "RATE_LIMIT_PER_MINUTE",
                100,
            )?,
            otlp_enabled: var("OTEL_EXPORTER_OTLP_ENDPOINT").is_some(),
        })
    }

    /// Service-level settings derived from this configuration.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            allow_self_accept: self.allow_self_accept,
            notification_window: self.notification_window,
            fanout_max_attempts: self.fanout_max_attempts,
            webhook_secret: self.stripe_webhook_secret.clone(),
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();

        assert_eq!(config.port, 3000);
        assert!(!config.allow_self_accept);
        assert_eq!(config.notification_window, 20);
        assert_eq!(config.fanout_interval, Duration::from_secs(5));
        assert_eq!(config.fanout_max_attempts, 5);
        assert_eq!(config.rate_limit_per_minute, 100);
        assert!(config.stripe_secret_key.is_none());
        assert!(!config.otlp_enabled);
    }

    #[test]
    fn test_database_url_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DATABASE_URL", "  ")])).is_err());
    }

    #[test]
    fn test_overrides_flow_into_service_config() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("PORT", "8080"),
            ("ALLOW_SELF_ACCEPT", "true"),
            ("NOTIFICATION_WINDOW", "50"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_123"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        let service = config.service_config();
        assert!(service.allow_self_accept);
        assert_eq!(service.notification_window, 50);
        assert_eq!(service.webhook_secret.as_deref(), Some("whsec_123"));
    }

    #[test]
    fn test_malformed_value_names_the_key() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
