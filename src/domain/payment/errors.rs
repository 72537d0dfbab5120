use rust_decimal::Decimal;
use uuid::Uuid;

use super::value_objects::PaymentStatus;

// ============================================================================
// Payment Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaymentError {
    #[error("Order {0} is already paid")]
    AlreadyPaid(Uuid),

    #[error("Order {0} is cancelled and cannot be paid")]
    OrderCancelled(Uuid),

    #[error("Amount {requested} does not match the amount due {due}")]
    AmountMismatch { requested: Decimal, due: Decimal },

    #[error("Payment initialization for order {0} is already in progress")]
    InitializationInProgress(Uuid),

    #[error("No transaction reference in webhook payload")]
    MissingTxRef,

    #[error("Cannot {action} a payment in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: PaymentStatus,
    },

    #[error("Currency must be a 3-letter code, got {0:?}")]
    InvalidCurrency(String),
}
