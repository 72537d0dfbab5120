use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::metrics::Metrics;
use super::{
    Checkout, GatewayError, InitializeRequest, PayerInfo, PaymentGateway, RejectionReason,
    Verification, VerifyOutcome,
};

// ============================================================================
// Chapa HTTP Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct ChapaConfig {
    pub base_url: String,
    pub secret_key: String,
    pub timeout: Duration,
}

pub struct ChapaClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    metrics: Option<Arc<Metrics>>,
}

impl ChapaClient {
    pub fn new(config: ChapaConfig) -> Result<Self, GatewayError> {
        if config.secret_key.trim().is_empty() {
            return Err(GatewayError::MissingField("secret_key"));
        }

        // TLS verification stays at reqwest's default (on)
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(&self, operation: &str, outcome: &str, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_gateway_request(operation, outcome, started.elapsed().as_secs_f64());
        }
    }

    /// Read the body of a non-200 response into a typed rejection
    async fn rejection(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("message").map(message_text))
            .unwrap_or_else(|| default_message(RejectionReason::from_status(status)).to_string());

        GatewayError::rejected(status, message)
    }

    async fn post_initialize(&self, request: &InitializeRequest) -> Result<Checkout, GatewayError> {
        let url = format!("{}/transaction/initialize", self.base_url);
        tracing::debug!(url = %url, body = ?request, "Chapa initialize request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::rejection(response).await);
        }

        let body: Value = response.json().await?;
        tracing::debug!(body = %body, "Chapa initialize response");

        if body.get("status").and_then(Value::as_str) != Some("success") {
            let message = body
                .get("message")
                .map(message_text)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(GatewayError::Rejected {
                status: 200,
                reason: RejectionReason::Declined,
                message: format!("Payment initialization failed: {message}"),
            });
        }

        let checkout_url = body
            .pointer("/data/checkout_url")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Unavailable("invalid response format: missing checkout_url".into()))?;

        Ok(Checkout { checkout_url: checkout_url.to_string() })
    }

    async fn get_verify(&self, tx_ref: &str) -> Result<VerifyOutcome, GatewayError> {
        let url = format!("{}/transaction/verify/{}", self.base_url, tx_ref);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.secret_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                tracing::warn!(tx_ref = %tx_ref, "Transaction not found on Chapa, payment not completed");
                return Ok(VerifyOutcome::NotFound);
            }
            _ => return Err(Self::rejection(response).await),
        }

        let body: Value = response.json().await?;
        tracing::debug!(tx_ref = %tx_ref, body = %body, "Chapa verify response");

        if body.get("status").and_then(Value::as_str) != Some("success") {
            return Ok(VerifyOutcome::Found(Verification::pending()));
        }

        let data = body
            .get("data")
            .filter(|data| data.is_object())
            .ok_or_else(|| GatewayError::Unavailable("invalid response format: missing data".into()))?;

        Ok(VerifyOutcome::Found(parse_verification(data)))
    }
}

#[async_trait]
impl PaymentGateway for ChapaClient {
    async fn initialize(&self, request: &InitializeRequest) -> Result<Checkout, GatewayError> {
        request.validate()?;

        tracing::info!(tx_ref = %request.tx_ref, amount = %request.amount, "Initializing Chapa payment");
        let started = Instant::now();

        let result = self.post_initialize(request).await;
        match &result {
            Ok(_) => self.record("initialize", "success", started),
            Err(e) => {
                tracing::error!(tx_ref = %request.tx_ref, error = %e, "Chapa initialize failed");
                self.record("initialize", e.kind(), started);
            }
        }
        result
    }

    async fn verify(&self, tx_ref: &str) -> Result<VerifyOutcome, GatewayError> {
        if tx_ref.trim().is_empty() {
            return Err(GatewayError::MissingField("tx_ref"));
        }

        tracing::info!(tx_ref = %tx_ref, "Verifying Chapa payment");
        let started = Instant::now();

        let result = self.get_verify(tx_ref).await;
        match &result {
            Ok(VerifyOutcome::NotFound) => self.record("verify", "not_found", started),
            Ok(VerifyOutcome::Found(_)) => self.record("verify", "success", started),
            Err(e) => {
                tracing::error!(tx_ref = %tx_ref, error = %e, "Chapa verify failed");
                self.record("verify", e.kind(), started);
            }
        }
        result
    }
}

fn parse_verification(data: &Value) -> Verification {
    let provider_status = data
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase();

    let text = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
    let first_name = text("first_name").unwrap_or_default();
    let last_name = text("last_name").unwrap_or_default();

    Verification {
        verified: provider_status == "success",
        provider_transaction_id: data.get("id").filter(|id| !id.is_null()).map(message_text),
        amount: data.get("amount").and_then(decimal_value),
        currency: text("currency"),
        payer: PayerInfo {
            email: text("email"),
            name: format!("{first_name} {last_name}").trim().to_string(),
        },
        created_at: text("created_at"),
        provider_status,
    }
}

/// Numbers may arrive as JSON numbers or strings
fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

/// Provider messages are usually strings but sometimes nested objects
fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn default_message(reason: RejectionReason) -> &'static str {
    match reason {
        RejectionReason::BadRequest => "Bad Request: Invalid request",
        RejectionReason::Unauthorized => "Unauthorized: Invalid API key",
        RejectionReason::Forbidden => "Forbidden: Insufficient permissions",
        RejectionReason::NotFound => "Not Found: Resource not found",
        RejectionReason::Validation => "Validation Error: Invalid data",
        RejectionReason::RateLimited => "Too Many Requests: Rate limit exceeded",
        RejectionReason::Server => "Chapa Server Error",
        RejectionReason::Declined | RejectionReason::Unexpected => "Unexpected error",
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
