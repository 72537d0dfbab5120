// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - Pending-payment sweeping
// - Health monitoring
// - Coordination and supervision
//
// ============================================================================

// Private module declarations
mod coordinator;
mod health_monitor;
mod sweeper;

// Re-export for public API
pub use coordinator::{CoordinatorActor, Shutdown};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
pub use sweeper::{PendingPaymentSweeper, RunSweep};
