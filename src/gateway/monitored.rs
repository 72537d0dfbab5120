use actix::Addr;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::actors::{HealthMonitorActor, HealthStatus, UpdateHealth};
use super::{Checkout, GatewayError, InitializeRequest, PaymentGateway, VerifyOutcome};

// ============================================================================
// Monitored Gateway - reports provider reachability to the health monitor
// ============================================================================
//
// Only transport failures (`Unavailable`) count against the provider. A
// rejection or a not-found answer proves it is reachable and resets the
// streak. Health is reported on state changes, not on every call.
//
// ============================================================================

pub const COMPONENT: &str = "gateway";

/// Consecutive transport failures before the gateway is reported degraded
pub const DEGRADED_AFTER: u32 = 3;

pub struct MonitoredGateway {
    inner: Arc<dyn PaymentGateway>,
    health_monitor: Addr<HealthMonitorActor>,
    consecutive_failures: AtomicU32,
}

impl MonitoredGateway {
    pub fn new(inner: Arc<dyn PaymentGateway>, health_monitor: Addr<HealthMonitorActor>) -> Self {
        health_monitor.do_send(UpdateHealth {
            component: COMPONENT.to_string(),
            status: HealthStatus::Healthy,
            details: Some("No calls yet".to_string()),
        });

        Self {
            inner,
            health_monitor,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    fn observe<T>(&self, result: &Result<T, GatewayError>) {
        match result {
            Err(GatewayError::Unavailable(message)) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures == DEGRADED_AFTER {
                    tracing::warn!(failures, error = %message, "Payment gateway unreachable");
                    self.health_monitor.do_send(UpdateHealth {
                        component: COMPONENT.to_string(),
                        status: HealthStatus::Degraded(format!(
                            "{failures} consecutive gateway calls failed"
                        )),
                        details: Some(message.clone()),
                    });
                }
            }
            _ => {
                let failures = self.consecutive_failures.swap(0, Ordering::SeqCst);
                if failures >= DEGRADED_AFTER {
                    tracing::info!(failures, "Payment gateway reachable again");
                    self.health_monitor.do_send(UpdateHealth {
                        component: COMPONENT.to_string(),
                        status: HealthStatus::Healthy,
                        details: None,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for MonitoredGateway {
    async fn initialize(&self, request: &InitializeRequest) -> Result<Checkout, GatewayError> {
        let result = self.inner.initialize(request).await;
        self.observe(&result);
        result
    }

    async fn verify(&self, tx_ref: &str) -> Result<VerifyOutcome, GatewayError> {
        let result = self.inner.verify(tx_ref).await;
        self.observe(&result);
        result
    }
}
