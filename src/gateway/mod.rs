// ============================================================================
// Payment Gateway - stateless adapter to the external payment provider
// ============================================================================
//
// `PaymentGateway` is the seam the payment service depends on. `ChapaClient`
// talks HTTP to the real provider; tests use `testing::FakeGateway`.
//
// No retries happen here. Callers own retry policy.
//
// ============================================================================

mod client;
mod errors;
mod monitored;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

pub use client::{ChapaClient, ChapaConfig};
pub use errors::{GatewayError, RejectionReason};
pub use monitored::MonitoredGateway;

/// Parameters of a checkout initialization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitializeRequest {
    pub amount: Decimal,
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tx_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(rename = "meta", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl InitializeRequest {
    /// Local checks run before any network round-trip.
    ///
    /// `last_name` may be empty but must be sent; the rest must be non-blank.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.amount <= Decimal::ZERO {
            return Err(GatewayError::InvalidAmount(self.amount));
        }
        if self.email.trim().is_empty() {
            return Err(GatewayError::MissingField("email"));
        }
        if self.first_name.trim().is_empty() {
            return Err(GatewayError::MissingField("first_name"));
        }
        if self.tx_ref.trim().is_empty() {
            return Err(GatewayError::MissingField("tx_ref"));
        }
        if self.currency.trim().is_empty() {
            return Err(GatewayError::MissingField("currency"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkout {
    pub checkout_url: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PayerInfo {
    pub email: Option<String>,
    pub name: String,
}

/// Transaction state as reported by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub verified: bool,
    /// Raw provider status, lowercased (`success`, `failed`, `pending`, ...)
    pub provider_status: String,
    pub provider_transaction_id: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub payer: PayerInfo,
    pub created_at: Option<String>,
}

impl Verification {
    pub fn pending() -> Self {
        Self {
            verified: false,
            provider_status: "pending".to_string(),
            provider_transaction_id: None,
            amount: None,
            currency: None,
            payer: PayerInfo::default(),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// Provider has no such transaction yet: the customer has not paid
    NotFound,
    Found(Verification),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &InitializeRequest) -> Result<Checkout, GatewayError>;

    async fn verify(&self, tx_ref: &str) -> Result<VerifyOutcome, GatewayError>;
}
