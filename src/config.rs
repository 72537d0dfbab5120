use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::domain::payment::{PaymentSettings, SweepPolicy};
use crate::errors::{AppError, Result};
use crate::gateway::ChapaConfig;

/// Upper bounds that keep derived durations representable
const MAX_CHAPA_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const MAX_SWEEP_GRACE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub metrics_port: u16,

    pub chapa_secret_key: String,
    pub chapa_base_url: String,
    pub chapa_timeout: Duration,
    pub chapa_callback_url: String,

    pub site_url: String,
    pub frontend_url: String,
    pub default_currency: String,

    pub sweep_interval: Duration,
    pub sweep_grace: Duration,
    pub sweep_batch_size: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        let config = Self::from_lookup(|name| env::var(name).ok())?;
        tracing::info!("Application configuration loaded successfully.");
        Ok(config)
    }

    /// Build from any variable source; `from_env` passes the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get_env = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("Missing environment variable '{name}'")))
        };
        let or_default = |name: &str, default: &str| get_env(name).unwrap_or_else(|_| default.to_string());

        let server_host = or_default("SERVER_HOST", "127.0.0.1");
        let server_port = parse_var("SERVER_PORT", &or_default("SERVER_PORT", "8000"))?;
        let database_url = get_env("DATABASE_URL")?;
        let database_max_connections =
            parse_var("DATABASE_MAX_CONNECTIONS", &or_default("DATABASE_MAX_CONNECTIONS", "10"))?;
        let metrics_port = parse_var("METRICS_PORT", &or_default("METRICS_PORT", "9090"))?;

        let chapa_secret_key = get_env("CHAPA_SECRET_KEY")?;
        let chapa_base_url = or_default("CHAPA_BASE_URL", "https://api.chapa.co/v1");
        let chapa_timeout =
            Duration::from_secs(parse_var("CHAPA_TIMEOUT_SECS", &or_default("CHAPA_TIMEOUT_SECS", "30"))?);

        let site_url = or_default("SITE_URL", "http://127.0.0.1:8000");
        let chapa_callback_url = get_env("CHAPA_CALLBACK_URL")
            .unwrap_or_else(|_| format!("{}/api/payments/webhook/", site_url.trim_end_matches('/')));
        let frontend_url = or_default("FRONTEND_URL", "http://localhost:3000");
        let default_currency = or_default("DEFAULT_CURRENCY", "ETB");

        let sweep_interval =
            Duration::from_secs(parse_var("SWEEP_INTERVAL_SECS", &or_default("SWEEP_INTERVAL_SECS", "300"))?);
        let sweep_grace =
            Duration::from_secs(parse_var("SWEEP_GRACE_SECS", &or_default("SWEEP_GRACE_SECS", "600"))?);
        let sweep_batch_size = parse_var("SWEEP_BATCH_SIZE", &or_default("SWEEP_BATCH_SIZE", "20"))?;

        if chapa_timeout.is_zero() || sweep_interval.is_zero() {
            return Err(AppError::Config(
                "CHAPA_TIMEOUT_SECS and SWEEP_INTERVAL_SECS must be positive".into(),
            ));
        }
        if chapa_timeout > MAX_CHAPA_TIMEOUT {
            return Err(AppError::Config(format!(
                "CHAPA_TIMEOUT_SECS must be at most {}",
                MAX_CHAPA_TIMEOUT.as_secs()
            )));
        }
        if sweep_grace > MAX_SWEEP_GRACE {
            return Err(AppError::Config(format!(
                "SWEEP_GRACE_SECS must be at most {}",
                MAX_SWEEP_GRACE.as_secs()
            )));
        }

        Ok(Self {
            server_host,
            server_port,
            database_url,
            database_max_connections,
            metrics_port,
            chapa_secret_key,
            chapa_base_url,
            chapa_timeout,
            chapa_callback_url,
            site_url,
            frontend_url,
            default_currency,
            sweep_interval,
            sweep_grace,
            sweep_batch_size,
        })
    }

    pub fn chapa(&self) -> ChapaConfig {
        ChapaConfig {
            base_url: self.chapa_base_url.clone(),
            secret_key: self.chapa_secret_key.clone(),
            timeout: self.chapa_timeout,
        }
    }

    pub fn payment_settings(&self) -> PaymentSettings {
        // An initialization that has not finished within two gateway timeouts never will
        let abandon_after = chrono::Duration::from_std(self.chapa_timeout * 2)
            .unwrap_or(chrono::Duration::MAX);
        PaymentSettings {
            default_currency: self.default_currency.clone(),
            callback_url: Some(self.chapa_callback_url.clone()),
            frontend_url: self.frontend_url.clone(),
            abandon_after,
        }
    }

    pub fn sweep_policy(&self) -> SweepPolicy {
        SweepPolicy {
            grace: self.sweep_grace,
            batch_size: self.sweep_batch_size,
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("database_url", &"[REDACTED]")
            .field("database_max_connections", &self.database_max_connections)
            .field("metrics_port", &self.metrics_port)
            .field("chapa_secret_key", &"[REDACTED]")
            .field("chapa_base_url", &self.chapa_base_url)
            .field("chapa_timeout", &self.chapa_timeout)
            .field("chapa_callback_url", &self.chapa_callback_url)
            .field("site_url", &self.site_url)
            .field("frontend_url", &self.frontend_url)
            .field("default_currency", &self.default_currency)
            .field("sweep_interval", &self.sweep_interval)
            .field("sweep_grace", &self.sweep_grace)
            .field("sweep_batch_size", &self.sweep_batch_size)
            .finish()
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| AppError::Config(format!("Invalid {name}: {e}")))
}
