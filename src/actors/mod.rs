// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for background concerns.
//
// Structure:
// - core/           - Shared types (HealthStatus, ComponentHealth)
// - infrastructure/ - Concrete actors (Coordinator, HealthMonitor, Sweeper)
//
// Note: Domain logic (orders, payments) lives in the services, NOT actors.
//       Actors only schedule and supervise.
//
// ============================================================================

// Private module declarations
mod core;
mod infrastructure;

// Re-export only what's needed in the public API
pub use core::{ComponentHealth, HealthStatus};
pub use infrastructure::{
    CoordinatorActor,
    GetSystemHealth,
    HealthMonitorActor,
    PendingPaymentSweeper,
    RunSweep,
    Shutdown,
    SystemHealth,
    UpdateHealth,
};
