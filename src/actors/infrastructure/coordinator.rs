use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::HealthStatus;
use crate::domain::payment::{PaymentService, SweepPolicy};
use super::{GetSystemHealth, HealthMonitorActor, PendingPaymentSweeper, UpdateHealth};

// ============================================================================
// Coordinator Actor - Orchestrates background actors
// ============================================================================
//
// Responsibilities:
// - Starts the pending-payment sweeper and wires it to the health monitor
// - Logs system health periodically
// - Coordinates graceful shutdown
//
// Actor Hierarchy:
//   CoordinatorActor (Supervisor)
//   ├── PendingPaymentSweeper
//   └── HealthMonitorActor (started by the caller, shared with /health)
//
// ============================================================================

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

pub struct CoordinatorActor {
    payments: Arc<PaymentService>,
    sweep_policy: SweepPolicy,
    sweep_interval: Duration,
    health_monitor: Addr<HealthMonitorActor>,
    sweeper: Option<Addr<PendingPaymentSweeper>>,
}

impl CoordinatorActor {
    pub fn new(
        payments: Arc<PaymentService>,
        sweep_policy: SweepPolicy,
        sweep_interval: Duration,
        health_monitor: Addr<HealthMonitorActor>,
    ) -> Self {
        Self {
            payments,
            sweep_policy,
            sweep_interval,
            health_monitor,
            sweeper: None,
        }
    }

    fn start_child_actors(&mut self) {
        tracing::info!("Starting supervised child actors");

        let sweeper = PendingPaymentSweeper::new(
            self.payments.clone(),
            self.sweep_policy,
            self.sweep_interval,
        )
        .with_health_monitor(self.health_monitor.clone())
        .start();
        self.sweeper = Some(sweeper);

        self.health_monitor.do_send(UpdateHealth {
            component: "payment_sweeper".to_string(),
            status: HealthStatus::Healthy,
            details: Some("Sweeper started".to_string()),
        });

        tracing::info!("✅ All supervised actors started successfully");
    }
}

impl Actor for CoordinatorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("🎯 CoordinatorActor started");
        self.start_child_actors();

        ctx.run_interval(HEALTH_LOG_INTERVAL, |act, _ctx| {
            let health_monitor = act.health_monitor.clone();
            actix::spawn(async move {
                match health_monitor.send(GetSystemHealth).await {
                    Ok(health) => match health.overall_status {
                        HealthStatus::Healthy => {
                            tracing::debug!("System health check: Healthy");
                        }
                        HealthStatus::Degraded(ref msg) => {
                            tracing::warn!("System health check: Degraded - {}", msg);
                        }
                        HealthStatus::Unhealthy(ref msg) => {
                            tracing::error!("System health check: Unhealthy - {}", msg);
                        }
                    },
                    Err(e) => {
                        tracing::error!("Failed to get system health: {}", e);
                    }
                }
            });
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        tracing::info!("🛑 CoordinatorActor stopping - initiating graceful shutdown");
        Running::Stop
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("🛑 CoordinatorActor stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "()")]
pub struct Shutdown;

impl Handler<Shutdown> for CoordinatorActor {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) {
        tracing::info!("Received shutdown signal");

        if let Some(sweeper) = self.sweeper.take() {
            sweeper.do_send(StopActor);
        }
        self.health_monitor.do_send(StopActor);

        ctx.stop();
    }
}

/// Message to gracefully stop a child actor
#[derive(Message)]
#[rtype(result = "()")]
struct StopActor;

impl Handler<StopActor> for PendingPaymentSweeper {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("PendingPaymentSweeper received stop signal");
        ctx.stop();
    }
}

impl Handler<StopActor> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor received stop signal");
        ctx.stop();
    }
}
