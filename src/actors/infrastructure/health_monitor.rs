use actix::prelude::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::metrics::Metrics;

// ============================================================================
// Health Monitor Actor - Aggregates component health
// ============================================================================
//
// Responsibilities:
// - Track health status reported by each component
// - Probe the database periodically when a pool is attached
// - Mirror the overall status into the `actor_health_status` gauge
// - Answer `/health` queries
//
// ============================================================================

const DATABASE_PROBE_INTERVAL: Duration = Duration::from_secs(10);

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "()")]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Message)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    database: Option<PgPool>,
    metrics: Arc<Metrics>,
}

impl HealthMonitorActor {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            components: HashMap::new(),
            database: None,
            metrics,
        }
    }

    pub fn with_database(mut self, pool: PgPool) -> Self {
        self.database = Some(pool);
        self
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut degraded = Vec::new();
        let mut unhealthy = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => unhealthy.push(format!("{name}: {msg}")),
                HealthStatus::Degraded(msg) => degraded.push(format!("{name}: {msg}")),
                HealthStatus::Healthy => {}
            }
        }
        unhealthy.sort();
        degraded.sort();

        if !unhealthy.is_empty() {
            HealthStatus::Unhealthy(unhealthy.join(", "))
        } else if !degraded.is_empty() {
            HealthStatus::Degraded(degraded.join(", "))
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Actor for HealthMonitorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor started");
        self.metrics.update_health_status(self.compute_overall_status().as_gauge());

        let Some(pool) = self.database.clone() else {
            return;
        };
        let addr = ctx.address();

        ctx.run_interval(DATABASE_PROBE_INTERVAL, move |_act, _ctx| {
            let pool = pool.clone();
            let addr = addr.clone();

            actix::spawn(async move {
                let (status, details) = match sqlx::query("SELECT 1").execute(&pool).await {
                    Ok(_) => (HealthStatus::Healthy, None),
                    Err(e) => (
                        HealthStatus::Unhealthy("database unreachable".to_string()),
                        Some(e.to_string()),
                    ),
                };

                addr.do_send(UpdateHealth {
                    component: "database".to_string(),
                    status,
                    details,
                });
            });
        });
    }
}

impl Handler<UpdateHealth> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateHealth, _: &mut Self::Context) {
        tracing::debug!(
            component = %msg.component,
            status = ?msg.status,
            "Updated component health"
        );

        let health = ComponentHealth::new(msg.component.clone(), msg.status).with_details(msg.details);
        self.components.insert(msg.component, health);

        self.metrics.update_health_status(self.compute_overall_status().as_gauge());
    }
}

impl Handler<GetSystemHealth> for HealthMonitorActor {
    type Result = MessageResult<GetSystemHealth>;

    fn handle(&mut self, _msg: GetSystemHealth, _: &mut Self::Context) -> Self::Result {
        MessageResult(SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        })
    }
}
