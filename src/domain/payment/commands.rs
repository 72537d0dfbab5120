use super::value_objects::PaymentStatus;

// ============================================================================
// Payment Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentCommand {
    /// Store the checkout URL returned by gateway initialization
    AttachCheckout { checkout_url: String },
    /// Apply a verification result obtained from the gateway
    ApplyVerification {
        status: PaymentStatus,
        gateway_transaction_id: Option<String>,
    },
    MarkFailed,
    /// Abandon an in-flight attempt so a fresh one can start
    Cancel,
}

impl PaymentCommand {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentCommand::AttachCheckout { .. } => "attach_checkout",
            PaymentCommand::ApplyVerification { .. } => "apply_verification",
            PaymentCommand::MarkFailed => "mark_failed",
            PaymentCommand::Cancel => "cancel",
        }
    }
}
