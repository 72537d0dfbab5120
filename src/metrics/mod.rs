// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry,
};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Order creation and status transitions
// - Payment initialization and settlement
// - Gateway calls (outcome, latency)
// - Webhook deliveries
// - Pending-payment sweeps
// - Retry attempts and actor health
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Order Metrics
    pub orders_created_total: IntCounter,
    pub order_transitions_total: IntCounterVec,

    // Payment Metrics
    pub payments_initialized_total: IntCounterVec,
    pub payments_settled_total: IntCounterVec,

    // Gateway Metrics
    pub gateway_requests_total: IntCounterVec,
    pub gateway_request_duration: HistogramVec,

    // Webhook Metrics
    pub webhooks_received_total: IntCounterVec,

    // Sweeper Metrics
    pub sweeper_runs_total: IntCounter,
    pub sweeper_payments_total: IntCounterVec,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,

    // Actor Metrics
    pub actor_health_status: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Metrics
        let orders_created_total = IntCounter::new(
            "orders_created_total",
            "Total orders created",
        )?;
        registry.register(Box::new(orders_created_total.clone()))?;

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order status transition attempts"),
            &["actor", "action", "outcome"],
        )?;
        registry.register(Box::new(order_transitions_total.clone()))?;

        // Payment Metrics
        let payments_initialized_total = IntCounterVec::new(
            Opts::new("payments_initialized_total", "Payment initialization requests"),
            &["outcome"],
        )?;
        registry.register(Box::new(payments_initialized_total.clone()))?;

        let payments_settled_total = IntCounterVec::new(
            Opts::new("payments_settled_total", "Payments that reached completed"),
            &["source"],
        )?;
        registry.register(Box::new(payments_settled_total.clone()))?;

        // Gateway Metrics
        let gateway_requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Payment gateway requests"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(gateway_requests_total.clone()))?;

        let gateway_request_duration = HistogramVec::new(
            HistogramOpts::new("gateway_request_duration_seconds", "Payment gateway request latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["operation"],
        )?;
        registry.register(Box::new(gateway_request_duration.clone()))?;

        // Webhook Metrics
        let webhooks_received_total = IntCounterVec::new(
            Opts::new("webhooks_received_total", "Inbound gateway webhooks"),
            &["event_type", "outcome"],
        )?;
        registry.register(Box::new(webhooks_received_total.clone()))?;

        // Sweeper Metrics
        let sweeper_runs_total = IntCounter::new(
            "sweeper_runs_total",
            "Pending-payment sweeps executed",
        )?;
        registry.register(Box::new(sweeper_runs_total.clone()))?;

        let sweeper_payments_total = IntCounterVec::new(
            Opts::new("sweeper_payments_total", "Payments re-verified by the sweeper"),
            &["outcome"],
        )?;
        registry.register(Box::new(sweeper_payments_total.clone()))?;

        // Retry Metrics
        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        // Actor Metrics
        let actor_health_status = IntGauge::new(
            "actor_health_status",
            "Overall health (0=Unhealthy, 1=Degraded, 2=Healthy)",
        )?;
        registry.register(Box::new(actor_health_status.clone()))?;

        Ok(Self {
            registry,
            orders_created_total,
            order_transitions_total,
            payments_initialized_total,
            payments_settled_total,
            gateway_requests_total,
            gateway_request_duration,
            webhooks_received_total,
            sweeper_runs_total,
            sweeper_payments_total,
            retry_attempts_total,
            actor_health_status,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self) {
        self.orders_created_total.inc();
    }

    pub fn record_order_transition(&self, actor: &str, action: &str, outcome: &str) {
        self.order_transitions_total.with_label_values(&[actor, action, outcome]).inc();
    }

    /// `outcome`: created, reused, failed
    pub fn record_payment_initialized(&self, outcome: &str) {
        self.payments_initialized_total.with_label_values(&[outcome]).inc();
    }

    /// `source`: verify, webhook, sweeper
    pub fn record_settlement(&self, source: &str) {
        self.payments_settled_total.with_label_values(&[source]).inc();
    }

    pub fn record_gateway_request(&self, operation: &str, outcome: &str, duration_secs: f64) {
        self.gateway_requests_total.with_label_values(&[operation, outcome]).inc();
        self.gateway_request_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn record_webhook(&self, event_type: &str, outcome: &str) {
        // Unknown provider events share one label to bound cardinality
        let event_type = match event_type {
            "charge.success" | "charge.failure" => event_type,
            _ => "other",
        };
        self.webhooks_received_total.with_label_values(&[event_type, outcome]).inc();
    }

    pub fn record_sweep_run(&self) {
        self.sweeper_runs_total.inc();
    }

    /// `outcome`: completed, failed, pending, error
    pub fn record_sweep_payment(&self, outcome: &str) {
        self.sweeper_payments_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_retry_attempt(&self, operation: &str) {
        self.retry_attempts_total.with_label_values(&[operation]).inc();
    }

    pub fn update_health_status(&self, status: i64) {
        self.actor_health_status.set(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str) -> f64 {
        let gathered = metrics.registry.gather();
        let family = gathered.iter().find(|m| m.name() == name).unwrap();
        family.metric.iter().map(|m| m.counter.value.unwrap_or(0.0)).sum()
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_order_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_created();
        metrics.record_order_transition("customer", "cancel", "applied");
        metrics.record_order_transition("customer", "cancel", "rejected");

        assert_eq!(metrics.orders_created_total.get(), 1);
        assert_eq!(counter_value(&metrics, "order_transitions_total"), 2.0);
    }

    #[test]
    fn test_record_gateway_request() {
        let metrics = Metrics::new().unwrap();
        metrics.record_gateway_request("verify", "success", 0.2);
        metrics.record_gateway_request("verify", "not_found", 0.1);

        let gathered = metrics.registry.gather();
        let requests = gathered.iter().find(|m| m.name() == "gateway_requests_total").unwrap();
        assert_eq!(requests.metric.len(), 2);

        let histogram = metrics
            .gateway_request_duration
            .with_label_values(&["verify"])
            .get_sample_count();
        assert_eq!(histogram, 2);
    }

    #[test]
    fn test_webhook_event_label_is_bounded() {
        let metrics = Metrics::new().unwrap();
        metrics.record_webhook("charge.success", "processed");
        metrics.record_webhook("payout.created", "processed");
        metrics.record_webhook("transfer.reversed", "processed");

        let other = metrics
            .webhooks_received_total
            .with_label_values(&["other", "processed"])
            .get();
        assert_eq!(other, 2);
    }

    #[test]
    fn test_sweep_and_health_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_sweep_run();
        metrics.record_sweep_payment("completed");
        metrics.update_health_status(2);

        assert_eq!(metrics.sweeper_runs_total.get(), 1);
        assert_eq!(metrics.actor_health_status.get(), 2);
    }
}
