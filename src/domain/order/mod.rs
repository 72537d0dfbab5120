// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// - Value objects (OrderNumber, OrderStatus, OrderItem, Actor)
// - Events (OrderCancelled, OrderDeliveryConfirmed, OrderStatusSet)
// - Commands (Cancel, ConfirmDelivery, SetStatus)
// - Errors (OrderError enum)
// - Aggregate (Order, OrderDraft, status transition rules)
// - Service (OrderService)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
