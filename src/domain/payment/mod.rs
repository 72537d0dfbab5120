// ============================================================================
// Payment Domain - Payment Aggregate, Webhook Audit and Settlement
// ============================================================================
//
// - Value objects (TxRef, PaymentStatus, PaymentMethod, Payer)
// - Events and commands for the Payment aggregate
// - Errors (PaymentError enum)
// - Webhook records (audit row per inbound notification)
// - Service (PaymentService: initialize, verify, webhook, sweep)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod webhook;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use webhook::*;
pub use command_handler::*;
