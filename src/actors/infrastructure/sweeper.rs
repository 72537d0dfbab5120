use actix::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::HealthStatus;
use crate::domain::payment::{PaymentService, SweepPolicy, SweepReport};
use super::{HealthMonitorActor, UpdateHealth};

// ============================================================================
// Pending-Payment Sweeper - Periodic re-verification of stale payments
// ============================================================================
//
// Runs independently of request handling. Each tick re-verifies a bounded
// batch of old pending payments through `PaymentService::sweep_pending`.
// At most one sweep runs at a time; a tick that finds one in flight is
// skipped.
//
// ============================================================================

const COMPONENT: &str = "payment_sweeper";

/// Trigger a sweep now. Resolves to `None` when one is already running.
#[derive(Message)]
#[rtype(result = "Option<SweepReport>")]
pub struct RunSweep;

pub struct PendingPaymentSweeper {
    payments: Arc<PaymentService>,
    policy: SweepPolicy,
    interval: Duration,
    in_flight: Arc<AtomicBool>,
    health_monitor: Option<Addr<HealthMonitorActor>>,
}

impl PendingPaymentSweeper {
    pub fn new(payments: Arc<PaymentService>, policy: SweepPolicy, interval: Duration) -> Self {
        Self {
            payments,
            policy,
            interval,
            in_flight: Arc::new(AtomicBool::new(false)),
            health_monitor: None,
        }
    }

    pub fn with_health_monitor(mut self, health_monitor: Addr<HealthMonitorActor>) -> Self {
        self.health_monitor = Some(health_monitor);
        self
    }

    fn sweep(&self) -> impl std::future::Future<Output = Option<SweepReport>> + 'static {
        let payments = self.payments.clone();
        let policy = self.policy;
        let in_flight = self.in_flight.clone();
        let health_monitor = self.health_monitor.clone();

        async move {
            let Some(guard) = InFlight::acquire(&in_flight) else {
                tracing::debug!("Previous sweep still running, skipping tick");
                return None;
            };

            let result = payments.sweep_pending(policy).await;
            drop(guard);

            let (status, details) = match &result {
                Ok(report) if report.errors == 0 => (HealthStatus::Healthy, None),
                Ok(report) => (
                    HealthStatus::Degraded(format!("{} payments could not be verified", report.errors)),
                    None,
                ),
                Err(e) => {
                    tracing::error!(error = %e, "Pending-payment sweep failed");
                    (HealthStatus::Degraded("last sweep failed".to_string()), Some(e.to_string()))
                }
            };
            if let Some(monitor) = health_monitor {
                monitor.do_send(UpdateHealth {
                    component: COMPONENT.to_string(),
                    status,
                    details,
                });
            }

            result.ok()
        }
    }
}

/// Holds the in-flight flag for one sweep. Released on drop, so a panicking
/// or cancelled sweep does not block later ticks.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag.clone()))
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Actor for PendingPaymentSweeper {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            grace_secs = self.policy.grace.as_secs(),
            batch_size = self.policy.batch_size,
            "PendingPaymentSweeper started"
        );

        ctx.run_interval(self.interval, |act, _ctx| {
            let sweep = act.sweep();
            actix::spawn(async move {
                let _ = sweep.await;
            });
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("PendingPaymentSweeper stopped");
    }
}

impl Handler<RunSweep> for PendingPaymentSweeper {
    type Result = ResponseFuture<Option<SweepReport>>;

    fn handle(&mut self, _msg: RunSweep, _: &mut Self::Context) -> Self::Result {
        Box::pin(self.sweep())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::GetSystemHealth;
    use crate::domain::payment::{Payment, PaymentMethod, PaymentSettings, PaymentStatus};
    use crate::gateway::testing::FakeGateway;
    use crate::gateway::GatewayError;
    use crate::metrics::Metrics;
    use crate::store::{MemoryStore, PaymentRepository};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    const HOUR: Duration = Duration::from_secs(3600);

    fn service(store: Arc<MemoryStore>, gateway: Arc<FakeGateway>, metrics: Arc<Metrics>) -> Arc<PaymentService> {
        Arc::new(PaymentService::new(
            store.clone(),
            store.clone(),
            store,
            gateway,
            metrics,
            PaymentSettings {
                default_currency: "ETB".into(),
                callback_url: None,
                frontend_url: "http://localhost:3000".into(),
                abandon_after: chrono::Duration::seconds(60),
            },
        ))
    }

    async fn stale_payment(store: &MemoryStore) -> Payment {
        let mut payment = Payment::new_pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::new(2550, 2),
            "ETB",
            PaymentMethod::Chapa,
            serde_json::json!({}),
        );
        payment.checkout_url = Some(FakeGateway::checkout_url_for(payment.tx_ref.as_str()));
        payment.created_at = Utc::now() - chrono::Duration::minutes(30);
        store.insert_payment(&payment).await.unwrap();
        payment
    }

    fn policy() -> SweepPolicy {
        SweepPolicy { grace: Duration::from_secs(600), batch_size: 20 }
    }

    #[actix_web::test]
    async fn test_run_sweep_settles_and_reports_health() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let payment = stale_payment(&store).await;
        gateway.verify_returns(Ok(FakeGateway::success("CHX-5")));

        let monitor = HealthMonitorActor::new(metrics.clone()).start();
        let sweeper = PendingPaymentSweeper::new(service(store.clone(), gateway, metrics.clone()), policy(), HOUR)
            .with_health_monitor(monitor.clone())
            .start();

        let report = sweeper.send(RunSweep).await.unwrap().unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.completed, 1);

        let stored = store.find_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert_eq!(metrics.sweeper_runs_total.get(), 1);

        let health = monitor.send(GetSystemHealth).await.unwrap();
        assert!(health.components[COMPONENT].status.is_healthy());
    }

    #[actix_web::test]
    async fn test_item_errors_degrade_health() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        stale_payment(&store).await;
        gateway.verify_returns(Err(GatewayError::Unavailable("timeout".into())));

        let monitor = HealthMonitorActor::new(metrics.clone()).start();
        let sweeper = PendingPaymentSweeper::new(service(store, gateway, metrics), policy(), HOUR)
            .with_health_monitor(monitor.clone())
            .start();

        let report = sweeper.send(RunSweep).await.unwrap().unwrap();
        assert_eq!(report.errors, 1);

        let health = monitor.send(GetSystemHealth).await.unwrap();
        assert_eq!(
            health.components[COMPONENT].status,
            HealthStatus::Degraded("1 payments could not be verified".into())
        );
    }

    #[actix_web::test]
    async fn test_overlapping_sweep_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let metrics = Arc::new(Metrics::new().unwrap());

        let sweeper = PendingPaymentSweeper::new(service(store, gateway.clone(), metrics.clone()), policy(), HOUR);
        let in_flight = sweeper.in_flight.clone();
        let addr = sweeper.start();

        in_flight.store(true, Ordering::SeqCst);
        assert!(addr.send(RunSweep).await.unwrap().is_none());
        assert_eq!(metrics.sweeper_runs_total.get(), 0);

        in_flight.store(false, Ordering::SeqCst);
        assert!(addr.send(RunSweep).await.unwrap().is_some());
        assert_eq!(gateway.verify_count(), 0);
    }

    #[test]
    fn test_in_flight_released_when_sweep_unwinds() {
        let flag = Arc::new(AtomicBool::new(false));

        let unwound = std::panic::catch_unwind(|| {
            let _guard = InFlight::acquire(&flag).unwrap();
            assert!(InFlight::acquire(&flag).is_none());
            panic!("sweep blew up");
        });

        assert!(unwound.is_err());
        assert!(!flag.load(Ordering::SeqCst));
        assert!(InFlight::acquire(&flag).is_some());
    }

    #[actix_web::test]
    async fn test_dropped_sweep_releases_flag() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let sweeper = PendingPaymentSweeper::new(service(store, Arc::new(FakeGateway::new()), metrics), policy(), HOUR);

        // Poll once so the guard is taken, then drop the sweep mid-flight
        let mut sweep = Box::pin(sweeper.sweep());
        let _ = futures_util::poll!(&mut sweep);
        drop(sweep);

        assert!(!sweeper.in_flight.load(Ordering::SeqCst));
        assert!(sweeper.sweep().await.is_some());
    }
}
