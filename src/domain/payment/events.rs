use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::PaymentStatus;

// ============================================================================
// Payment Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentEvent {
    CheckoutAttached(CheckoutAttached),
    Verified(PaymentVerified),
    Failed(PaymentFailed),
    Cancelled(PaymentCancelled),
}

impl PaymentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::CheckoutAttached(_) => "PaymentCheckoutAttached",
            PaymentEvent::Verified(_) => "PaymentVerified",
            PaymentEvent::Failed(_) => "PaymentFailed",
            PaymentEvent::Cancelled(_) => "PaymentCancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutAttached {
    pub checkout_url: String,
    pub at: DateTime<Utc>,
}

/// Gateway verification applied to the payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentVerified {
    pub status: PaymentStatus,
    pub gateway_transaction_id: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCancelled {
    pub at: DateTime<Utc>,
}
