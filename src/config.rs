use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use chrono_tz::Tz;

pub const DEFAULT_PROVIDER_API_BASE_URL: &str = "https://api.mercadopago.com";
pub const DEFAULT_PROVIDER_TIMEZONE: &str = "America/Sao_Paulo";
pub const DEFAULT_PROVIDER_CURRENCY: &str = "BRL";
pub const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub access_token: String,
    pub api_base_url: String,
    pub back_url: String,
    pub currency: String,
    /// Shared secret for `x-signature` checks. Unset disables verification.
    pub webhook_secret: Option<String>,
    pub timezone: Tz,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub bind_addr: SocketAddr,
    pub provider: ProviderSettings,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn optional(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            key,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = required("DATABASE_URL")?;
        let frontend_origin = required("FRONTEND_ORIGIN")?;

        let bind_raw = optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid {
                key: "BIND_ADDR",
                value: bind_raw.clone(),
            })?;

        let tz_raw = optional("PROVIDER_TIMEZONE")
            .unwrap_or_else(|| DEFAULT_PROVIDER_TIMEZONE.to_string());
        let timezone = tz_raw.parse::<Tz>().map_err(|_| ConfigError::Invalid {
            key: "PROVIDER_TIMEZONE",
            value: tz_raw.clone(),
        })?;

        let back_url = optional("PROVIDER_BACK_URL").unwrap_or_else(|| {
            format!(
                "{}/subscription/return",
                frontend_origin.trim_end_matches('/')
            )
        });

        let provider = ProviderSettings {
            access_token: required("PROVIDER_ACCESS_TOKEN")?,
            api_base_url: optional("PROVIDER_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PROVIDER_API_BASE_URL.to_string()),
            back_url,
            currency: optional("PROVIDER_CURRENCY")
                .unwrap_or_else(|| DEFAULT_PROVIDER_CURRENCY.to_string()),
            webhook_secret: optional("PROVIDER_WEBHOOK_SECRET"),
            timezone,
            timeout: Duration::from_secs(parse_or(
                "PROVIDER_TIMEOUT_SECONDS",
                DEFAULT_PROVIDER_TIMEOUT_SECONDS,
            )?),
        };

        Ok(Config {
            database_url,
            frontend_origin,
            bind_addr,
            provider,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/entitlements_test".into(),
            frontend_origin: "http://localhost:5173".into(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            provider: ProviderSettings {
                access_token: "test-token".into(),
                api_base_url: "http://localhost:0".into(),
                back_url: "http://localhost:5173/subscription/return".into(),
                currency: DEFAULT_PROVIDER_CURRENCY.into(),
                webhook_secret: None,
                timezone: chrono_tz::America::Sao_Paulo,
                timeout: Duration::from_secs(1),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_when_unset() {
        let value: u64 = parse_or("ENTITLEMENTS_TEST_UNSET_KEY", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn parse_or_rejects_garbage() {
        std::env::set_var("ENTITLEMENTS_TEST_BAD_TIMEOUT", "soon");
        let err = parse_or::<u64>("ENTITLEMENTS_TEST_BAD_TIMEOUT", 10).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "ENTITLEMENTS_TEST_BAD_TIMEOUT", .. }
        ));
    }

    #[test]
    fn required_treats_blank_as_missing() {
        std::env::set_var("ENTITLEMENTS_TEST_BLANK", "   ");
        assert!(matches!(
            required("ENTITLEMENTS_TEST_BLANK"),
            Err(ConfigError::Missing("ENTITLEMENTS_TEST_BLANK"))
        ));
    }
}
