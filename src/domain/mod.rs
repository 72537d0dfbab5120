// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Value objects
// - Events
// - Commands
// - Errors
// - Aggregate implementation
// - Service (command handler)
//
// Persistence and the payment gateway are reached through traits only.
//
// ============================================================================

pub mod aggregate;
pub mod customer;
pub mod order;
pub mod payment;
