// ============================================================================
// Customer Reference
// ============================================================================
//
// Customers are owned by an upstream identity service. This crate only reads
// the fields it needs to scope queries and build gateway payloads.
//
// ============================================================================

pub mod value_objects;

pub use value_objects::*;
