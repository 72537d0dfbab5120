mod schema;

use std::time::Duration;

use anyhow::{anyhow, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, IsTransient, RetryConfig, RetryResult};

pub use schema::ensure_schema;

struct ConnectError(sqlx::Error);

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl IsTransient for ConnectError {
    fn is_transient(&self) -> bool {
        !matches!(self.0, sqlx::Error::Configuration(_))
    }
}

/// Open the Postgres pool, retrying while the database comes up
pub async fn connect(database_url: &str, max_connections: u32, metrics: &Metrics) -> Result<PgPool> {
    let result = retry_on_transient(RetryConfig::aggressive(), |attempt| async move {
        tracing::debug!(attempt, "Connecting to database");
        if attempt > 1 {
            metrics.record_retry_attempt("db_connect");
        }
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(ConnectError)
    })
    .await;

    match result {
        RetryResult::Success(pool) => {
            tracing::info!("✅ Connected to database");
            Ok(pool)
        }
        RetryResult::Failed(e) => Err(anyhow!("database unreachable after retries: {e}")),
        RetryResult::PermanentFailure(e) => Err(anyhow!("invalid database configuration: {e}")),
    }
}
