//! Checkout engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TABLESIDE_API_BASE_URL` - Base URL of the remote cart service
//! - `TABLESIDE_GATEWAY_PUBLISHABLE_KEY` - Payment gateway publishable key
//!
//! ## Optional
//! - `TABLESIDE_GATEWAY_BASE_URL` - Gateway API base URL (default: `https://api.gateway.dev`)
//! - `TABLESIDE_REQUEST_TIMEOUT_SECS` - Backend call timeout ceiling (default: 10)
//! - `TABLESIDE_CURRENCY` - ISO 4217 currency code (default: usd)
//! - `TABLESIDE_SURCHARGE_RATE` - Fractional surcharge rate used for the
//!   review-step preview (default: 0.035). The backend figure is always
//!   authoritative at completion.

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Checkout engine configuration.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Base URL of the remote cart service.
    pub api_base_url: String,
    /// Base URL of the payment gateway API.
    pub gateway_base_url: String,
    /// Gateway publishable key (safe to expose client-side).
    pub gateway_publishable_key: String,
    /// Transport timeout ceiling for backend calls, in seconds. The gateway
    /// confirmation call has no client-imposed timeout.
    pub request_timeout_secs: u64,
    /// ISO 4217 currency code declared on payment intents.
    pub currency: String,
    /// Fractional surcharge rate for the display-only preview.
    pub surcharge_rate: Decimal,
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = get_required_env("TABLESIDE_API_BASE_URL")?;
        validate_url("TABLESIDE_API_BASE_URL", &api_base_url)?;

        let gateway_base_url =
            get_env_or_default("TABLESIDE_GATEWAY_BASE_URL", "https://api.gateway.dev");
        validate_url("TABLESIDE_GATEWAY_BASE_URL", &gateway_base_url)?;

        let request_timeout_secs = get_env_or_default("TABLESIDE_REQUEST_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("TABLESIDE_REQUEST_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        let surcharge_rate = parse_rate(
            "TABLESIDE_SURCHARGE_RATE",
            &get_env_or_default("TABLESIDE_SURCHARGE_RATE", "0.035"),
        )?;

        Ok(Self {
            api_base_url,
            gateway_base_url,
            gateway_publishable_key: get_required_env("TABLESIDE_GATEWAY_PUBLISHABLE_KEY")?,
            request_timeout_secs,
            currency: get_env_or_default("TABLESIDE_CURRENCY", "usd"),
            surcharge_rate,
        })
    }

    /// A fixed configuration for tests; no environment access.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:9".to_string(),
            gateway_base_url: "http://127.0.0.1:9".to_string(),
            gateway_publishable_key: "pk_test_fixed".to_string(),
            request_timeout_secs: 10,
            currency: "usd".to_string(),
            surcharge_rate: Decimal::new(35, 3),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a value parses as an absolute URL.
fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a fractional rate, rejecting anything outside [0, 1).
fn parse_rate(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    let rate = Decimal::from_str(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("rate must be in [0, 1), got {rate}"),
        ));
    }
    Ok(rate)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_valid() {
        assert_eq!(parse_rate("X", "0.035").unwrap(), Decimal::new(35, 3));
        assert_eq!(parse_rate("X", "0").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_parse_rate_out_of_range() {
        assert!(parse_rate("X", "1.0").is_err());
        assert!(parse_rate("X", "-0.1").is_err());
        assert!(parse_rate("X", "not a number").is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("X", "https://orders.example.com").is_ok());
        assert!(validate_url("X", "not a url").is_err());
    }

    #[test]
    fn test_for_tests_is_valid() {
        let config = CheckoutConfig::for_tests();
        assert!(validate_url("X", &config.api_base_url).is_ok());
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.surcharge_rate, Decimal::new(35, 3));
    }
}
