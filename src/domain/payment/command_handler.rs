use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::aggregate::Aggregate;
use crate::domain::order::{Order, OrderStatus};
use crate::errors::{AppError, Result};
use crate::gateway::{InitializeRequest, PaymentGateway, VerifyOutcome};
use crate::metrics::Metrics;
use crate::store::{OrderRepository, PaymentRepository, StoreError, WebhookRepository};

use super::aggregate::Payment;
use super::commands::PaymentCommand;
use super::errors::PaymentError;
use super::value_objects::{Payer, PaymentMethod, PaymentStatus, TxRef};
use super::webhook::{WebhookRecord, WebhookUpdate, EVENT_CHARGE_FAILURE, EVENT_CHARGE_SUCCESS};

// ============================================================================
// Payment Service
// ============================================================================
//
// Three paths settle a payment: user-initiated verification, the webhook
// reconciler and the pending-payment sweeper. All of them funnel through
// `reconcile`, which asks the gateway and writes the result with a
// compare-and-set on the status it loaded. A completed payment is sticky,
// so whichever path loses the race becomes a no-op.
//
// ============================================================================

const CAS_ATTEMPTS: u32 = 3;

/// Settings the service needs from application config
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub default_currency: String,
    pub callback_url: Option<String>,
    pub frontend_url: String,
    /// A pending payment with no checkout URL older than this is abandoned
    pub abandon_after: chrono::Duration,
}

/// Body of a payment initialization request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentRequest {
    pub order_id: Uuid,
    /// When given, must equal the amount due on the order
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub return_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentInitialized {
    pub payment: Payment,
    pub checkout_url: String,
    /// True when an in-flight payment was returned instead of a new one
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub status: PaymentStatus,
    pub tx_ref: TxRef,
    pub checkout_url: Option<String>,
    pub message: String,
    pub payment: Payment,
}

impl VerificationResult {
    fn new(payment: Payment, message: &str) -> Self {
        Self {
            verified: payment.is_paid(),
            status: payment.status,
            tx_ref: payment.tx_ref.clone(),
            checkout_url: payment.checkout_url.clone(),
            message: message.to_string(),
            payment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookOutcome {
    pub webhook_id: Uuid,
    pub event_type: String,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct SweepPolicy {
    pub grace: Duration,
    pub batch_size: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

pub struct PaymentService {
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentRepository>,
    webhooks: Arc<dyn WebhookRepository>,
    gateway: Arc<dyn PaymentGateway>,
    metrics: Arc<Metrics>,
    settings: PaymentSettings,
    /// Serializes initialization per order within this process
    init_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentRepository>,
        webhooks: Arc<dyn WebhookRepository>,
        gateway: Arc<dyn PaymentGateway>,
        metrics: Arc<Metrics>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            orders,
            payments,
            webhooks,
            gateway,
            metrics,
            settings,
            init_locks: Mutex::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------------

    /// Start a checkout for one of the payer's orders.
    ///
    /// Returns the existing checkout when an attempt is already in flight.
    pub async fn create_payment(&self, payer: &Payer, request: PaymentRequest) -> Result<PaymentInitialized> {
        let currency = normalize_currency(
            request.currency.as_deref().unwrap_or(&self.settings.default_currency),
        )?;

        let lock = {
            let mut locks = self.init_locks.lock().await;
            locks.entry(request.order_id).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().await;
            self.initialize_locked(payer, request.clone(), currency).await
        };

        let mut locks = self.init_locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&request.order_id);
        }

        result
    }

    async fn initialize_locked(
        &self,
        payer: &Payer,
        request: PaymentRequest,
        currency: String,
    ) -> Result<PaymentInitialized> {
        let order = self
            .orders
            .find_order(request.order_id)
            .await?
            .filter(|order| order.belongs_to(payer.id))
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", request.order_id)))?;

        if order.status == OrderStatus::Cancelled {
            return Err(PaymentError::OrderCancelled(order.id).into());
        }
        if order.payment_settled {
            return Err(PaymentError::AlreadyPaid(order.id).into());
        }

        let due = order.amount_due();
        if let Some(requested) = request.amount {
            if requested != due {
                return Err(PaymentError::AmountMismatch { requested, due }.into());
            }
        }

        if let Some(existing) = self.payments.find_active_payment(order.id).await? {
            if existing.is_paid() {
                return Err(PaymentError::AlreadyPaid(order.id).into());
            }
            if let Some(checkout_url) = existing.checkout_url.clone() {
                self.metrics.record_payment_initialized("reused");
                tracing::info!(
                    order_id = %order.id,
                    tx_ref = %existing.tx_ref,
                    "Returning in-flight checkout"
                );
                return Ok(PaymentInitialized { payment: existing, checkout_url, reused: true });
            }
            if !existing.is_abandoned(Utc::now(), self.settings.abandon_after) {
                return Err(PaymentError::InitializationInProgress(order.id).into());
            }

            tracing::warn!(
                order_id = %order.id,
                tx_ref = %existing.tx_ref,
                "Cancelling abandoned payment attempt"
            );
            let (cancelled, _) = self.apply(existing, PaymentCommand::Cancel).await?;
            if cancelled.status.is_active() {
                return Err(PaymentError::InitializationInProgress(order.id).into());
            }
        }

        let mut payment = Payment::new_pending(
            order.id,
            payer.id,
            due,
            currency,
            PaymentMethod::Chapa,
            Value::Null,
        );
        payment.metadata = payment_metadata(&order, &payment, request.metadata);

        match self.payments.insert_payment(&payment).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(constraint)) if constraint.contains("one_active") => {
                return Err(PaymentError::InitializationInProgress(order.id).into());
            }
            Err(e) => return Err(e.into()),
        }

        let gateway_request = InitializeRequest {
            amount: payment.amount,
            currency: payment.currency.clone(),
            email: payer.email.clone(),
            first_name: payer.display_first_name().to_string(),
            last_name: payer.last_name.clone(),
            tx_ref: payment.tx_ref.to_string(),
            phone_number: payer.phone_number.clone().filter(|p| !p.trim().is_empty()),
            callback_url: self.settings.callback_url.clone(),
            return_url: Some(request.return_url.unwrap_or_else(|| {
                format!(
                    "{}/order/payment-success?tx_ref={}",
                    self.settings.frontend_url.trim_end_matches('/'),
                    payment.tx_ref
                )
            })),
            metadata: Some(payment.metadata.clone()),
        };

        let checkout = match self.gateway.initialize(&gateway_request).await {
            Ok(checkout) => checkout,
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    tx_ref = %payment.tx_ref,
                    error = %e,
                    kind = e.kind(),
                    "Payment initialization failed"
                );
                self.metrics.record_payment_initialized("failed");
                if let Err(mark_err) = self.apply(payment, PaymentCommand::MarkFailed).await {
                    tracing::error!(error = %mark_err, "Could not mark payment failed");
                }
                return Err(e.into());
            }
        };

        let (payment, _) = self
            .apply(payment, PaymentCommand::AttachCheckout { checkout_url: checkout.checkout_url.clone() })
            .await?;

        self.metrics.record_payment_initialized("created");
        tracing::info!(
            order_id = %order.id,
            payment_id = %payment.id,
            tx_ref = %payment.tx_ref,
            amount = %payment.amount,
            "✅ Payment initialized"
        );

        Ok(PaymentInitialized {
            payment,
            checkout_url: checkout.checkout_url,
            reused: false,
        })
    }

    // ------------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------------

    pub async fn verify_and_complete(&self, tx_ref: &TxRef) -> Result<VerificationResult> {
        let payment = self.load_by_tx_ref(tx_ref).await?;
        self.reconcile(payment, "verify").await
    }

    /// Same as [`PaymentService::verify_and_complete`], restricted to the payer's own payments
    pub async fn verify_for_customer(&self, customer_id: Uuid, tx_ref: &TxRef) -> Result<VerificationResult> {
        let payment = self.load_by_tx_ref(tx_ref).await?;
        if payment.customer_id != customer_id {
            return Err(AppError::NotFound(format!("Payment not found: {tx_ref}")));
        }
        self.reconcile(payment, "verify").await
    }

    async fn load_by_tx_ref(&self, tx_ref: &TxRef) -> Result<Payment> {
        self.payments
            .find_payment_by_tx_ref(tx_ref)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment not found: {tx_ref}")))
    }

    /// Ask the gateway about `payment` and persist whatever it reports
    async fn reconcile(&self, payment: Payment, source: &'static str) -> Result<VerificationResult> {
        if payment.is_paid() {
            return Ok(VerificationResult::new(payment, "Payment already completed"));
        }

        let verification = match self.gateway.verify(payment.tx_ref.as_str()).await? {
            VerifyOutcome::NotFound => {
                tracing::debug!(tx_ref = %payment.tx_ref, "Gateway has no transaction yet");
                return Ok(VerificationResult::new(
                    payment,
                    "Payment not yet completed. Please complete the payment.",
                ));
            }
            VerifyOutcome::Found(verification) => verification,
        };

        let command = PaymentCommand::ApplyVerification {
            status: PaymentStatus::from_provider(&verification.provider_status),
            gateway_transaction_id: verification.provider_transaction_id,
        };
        let (payment, changed) = self.apply(payment, command).await?;

        if changed && payment.is_paid() {
            self.metrics.record_settlement(source);
            tracing::info!(
                payment_id = %payment.id,
                order_id = %payment.order_id,
                tx_ref = %payment.tx_ref,
                source,
                "✅ Payment settled"
            );
        }

        let message = match payment.status {
            PaymentStatus::Completed => "Payment verified successfully",
            PaymentStatus::Failed => "Payment failed",
            PaymentStatus::Cancelled => "Payment cancelled",
            PaymentStatus::Pending | PaymentStatus::Processing => "Payment pending",
        };
        Ok(VerificationResult::new(payment, message))
    }

    /// Run `command` and save with compare-and-set, reloading on a lost race.
    ///
    /// Returns the stored payment and whether this call changed it.
    async fn apply(&self, mut payment: Payment, command: PaymentCommand) -> Result<(Payment, bool)> {
        for attempt in 1..=CAS_ATTEMPTS {
            let expected = payment.status;
            let events = payment.execute(&command)?;
            if events.is_empty() {
                return Ok((payment, false));
            }

            if self.payments.compare_and_save_payment(&payment, expected).await? {
                for event in &events {
                    tracing::debug!(
                        payment_id = %payment.id,
                        event = event.event_type(),
                        status = %payment.status,
                        "Payment updated"
                    );
                }
                return Ok((payment, true));
            }

            tracing::debug!(
                payment_id = %payment.id,
                command = command.name(),
                attempt,
                "Payment changed concurrently, reloading"
            );
            payment = self
                .payments
                .find_payment(payment.id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment.id)))?;
        }

        Err(AppError::Conflict(format!(
            "Payment {} is being updated concurrently",
            payment.id
        )))
    }

    // ------------------------------------------------------------------------
    // Webhooks
    // ------------------------------------------------------------------------

    /// Record the notification, then act on it. The record survives any failure.
    pub async fn handle_webhook(&self, payload: Value, headers: Value) -> Result<WebhookOutcome> {
        let record = WebhookRecord::received(payload, headers);
        self.webhooks.insert_webhook(&record).await?;

        let result = self.process_webhook(&record).await;

        let update = match &result {
            Ok(_) => WebhookUpdate::Processed { at: Utc::now() },
            Err(e) => WebhookUpdate::Failed { error: e.to_string() },
        };
        if let Err(e) = self.webhooks.update_webhook(record.id, &update).await {
            tracing::error!(webhook_id = %record.id, error = %e, "Could not update webhook record");
        }

        match &result {
            Ok(status) => {
                self.metrics.record_webhook(&record.event_type, "processed");
                tracing::info!(
                    webhook_id = %record.id,
                    event_type = %record.event_type,
                    payment_status = %status,
                    "Webhook processed"
                );
            }
            Err(e) => {
                self.metrics.record_webhook(&record.event_type, "failed");
                tracing::warn!(
                    webhook_id = %record.id,
                    event_type = %record.event_type,
                    error = %e,
                    "Webhook processing failed"
                );
            }
        }

        result.map(|payment_status| WebhookOutcome {
            webhook_id: record.id,
            event_type: record.event_type,
            payment_status,
        })
    }

    async fn process_webhook(&self, record: &WebhookRecord) -> Result<PaymentStatus> {
        let tx_ref = record.tx_ref().ok_or(PaymentError::MissingTxRef)?;
        let payment = self.load_by_tx_ref(&tx_ref).await?;

        self.webhooks
            .update_webhook(record.id, &WebhookUpdate::Linked { payment_id: payment.id })
            .await?;

        match record.event_type.as_str() {
            // The payload is never trusted: success is confirmed with the gateway
            EVENT_CHARGE_SUCCESS => Ok(self.reconcile(payment, "webhook").await?.status),
            EVENT_CHARGE_FAILURE => {
                let (payment, _) = self.apply(payment, PaymentCommand::MarkFailed).await?;
                Ok(payment.status)
            }
            other => {
                tracing::debug!(event_type = other, tx_ref = %tx_ref, "Ignoring webhook event");
                Ok(payment.status)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Sweeper
    // ------------------------------------------------------------------------

    /// Re-verify stale pending payments. One failure never stops the batch.
    pub async fn sweep_pending(&self, policy: SweepPolicy) -> Result<SweepReport> {
        self.metrics.record_sweep_run();

        let grace = chrono::Duration::from_std(policy.grace)
            .map_err(|e| AppError::Config(format!("invalid sweep grace period: {e}")))?;
        let stale = self
            .payments
            .list_stale_pending(PaymentMethod::Chapa, Utc::now() - grace, i64::from(policy.batch_size))
            .await?;

        let mut report = SweepReport { checked: stale.len(), ..SweepReport::default() };

        for payment in stale {
            let payment_id = payment.id;
            let outcome = match self.reconcile(payment, "sweeper").await {
                Ok(result) => match result.status {
                    PaymentStatus::Completed => {
                        report.completed += 1;
                        "completed"
                    }
                    PaymentStatus::Failed | PaymentStatus::Cancelled => {
                        report.failed += 1;
                        "failed"
                    }
                    PaymentStatus::Pending | PaymentStatus::Processing => {
                        report.still_pending += 1;
                        "pending"
                    }
                },
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(payment_id = %payment_id, error = %e, "Sweep verification failed");
                    "error"
                }
            };
            self.metrics.record_sweep_payment(outcome);
        }

        if report.checked > 0 {
            tracing::info!(
                checked = report.checked,
                completed = report.completed,
                failed = report.failed,
                still_pending = report.still_pending,
                errors = report.errors,
                "Pending-payment sweep finished"
            );
        }

        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get_payment(&self, customer_id: Uuid, payment_id: Uuid) -> Result<Payment> {
        self.payments
            .find_payment(payment_id)
            .await?
            .filter(|payment| payment.customer_id == customer_id)
            .ok_or_else(|| AppError::NotFound(format!("Payment {payment_id} not found")))
    }

    pub async fn payment_history(&self, customer_id: Uuid) -> Result<Vec<Payment>> {
        Ok(self.payments.list_payments_for_customer(customer_id).await?)
    }
}

fn normalize_currency(currency: &str) -> Result<String, PaymentError> {
    let currency = currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PaymentError::InvalidCurrency(currency.to_string()));
    }
    Ok(currency.to_ascii_uppercase())
}

/// Caller metadata plus the identifiers support staff look payments up by
fn payment_metadata(order: &Order, payment: &Payment, extra: Option<Value>) -> Value {
    let mut metadata = match extra {
        Some(Value::Object(map)) => map,
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("client".to_string(), other);
            map
        }
    };
    metadata.insert("order_id".to_string(), json!(order.id));
    metadata.insert("order_number".to_string(), json!(order.order_number.as_str()));
    metadata.insert("customer_id".to_string(), json!(order.customer_id));
    metadata.insert("payment_id".to_string(), json!(payment.id));
    Value::Object(metadata)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::domain::order::{
        Actor, NewOrder, OrderCommand, OrderPaymentMethod, OrderService, RequestedItem,
    };
    use crate::gateway::testing::FakeGateway;
    use crate::gateway::GatewayError;
    use crate::store::MemoryStore;

    const ITEM_A: i64 = 1;
    const ITEM_B: i64 = 2;

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<FakeGateway>,
        metrics: Arc<Metrics>,
        orders: OrderService,
        service: Arc<PaymentService>,
    }

    fn settings() -> PaymentSettings {
        PaymentSettings {
            default_currency: "ETB".into(),
            callback_url: Some("http://127.0.0.1:8000/api/payments/webhook/".into()),
            frontend_url: "http://localhost:3000/".into(),
            abandon_after: chrono::Duration::seconds(60),
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let catalog = Arc::new(InMemoryCatalog::with_items([
            (ITEM_A, Decimal::new(1000, 2)),
            (ITEM_B, Decimal::new(550, 2)),
        ]));
        let orders = OrderService::new(store.clone(), catalog, metrics.clone());
        let service = Arc::new(PaymentService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            gateway.clone(),
            metrics.clone(),
            settings(),
        ));
        Fixture { store, gateway, metrics, orders, service }
    }

    fn payer() -> Payer {
        Payer {
            id: Uuid::new_v4(),
            email: "abebe@example.com".into(),
            username: "abebe".into(),
            first_name: String::new(),
            last_name: "Kebede".into(),
            phone_number: Some("+251911000000".into()),
        }
    }

    async fn place_order(fx: &Fixture, customer_id: Uuid) -> Order {
        fx.orders
            .create_order(
                customer_id,
                NewOrder {
                    delivery_address: "Bole Road, Addis Ababa".into(),
                    delivery_coordinates: None,
                    delivery_distance: None,
                    delivery_fee: None,
                    phone_number: "+251911000000".into(),
                    payment_method: OrderPaymentMethod::Online,
                    items: vec![
                        RequestedItem { menu_item_id: ITEM_A, quantity: 2, special_request: None },
                        RequestedItem { menu_item_id: ITEM_B, quantity: 1, special_request: None },
                    ],
                    special_instructions: None,
                },
            )
            .await
            .unwrap()
    }

    fn request_for(order: &Order) -> PaymentRequest {
        PaymentRequest { order_id: order.id, ..Default::default() }
    }

    async fn initialized(fx: &Fixture, payer: &Payer) -> (Order, Payment) {
        let order = place_order(fx, payer.id).await;
        let init = fx.service.create_payment(payer, request_for(&order)).await.unwrap();
        (order, init.payment)
    }

    fn success_webhook(tx_ref: &TxRef) -> Value {
        json!({"event": "charge.success", "data": {"tx_ref": tx_ref.as_str(), "status": "success"}})
    }

    #[tokio::test]
    async fn test_create_payment_builds_gateway_request() {
        let fx = fixture();
        let payer = payer();
        let order = place_order(&fx, payer.id).await;

        let init = fx.service.create_payment(&payer, request_for(&order)).await.unwrap();

        assert!(!init.reused);
        assert_eq!(init.payment.status, PaymentStatus::Pending);
        assert_eq!(init.payment.amount, Decimal::new(2550, 2));
        assert_eq!(init.checkout_url, FakeGateway::checkout_url_for(init.payment.tx_ref.as_str()));
        assert_eq!(init.payment.checkout_url.as_deref(), Some(init.checkout_url.as_str()));
        assert_eq!(init.payment.metadata["order_number"], json!(order.order_number.as_str()));
        assert_eq!(init.payment.metadata["payment_id"], json!(init.payment.id));

        let sent = fx.gateway.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.first_name, "abebe");
        assert_eq!(sent.currency, "ETB");
        assert_eq!(
            sent.return_url.as_deref(),
            Some(format!("http://localhost:3000/order/payment-success?tx_ref={}", init.payment.tx_ref).as_str())
        );
        assert_eq!(sent.callback_url, settings().callback_url);

        let stored = fx.store.find_payment(init.payment.id).await.unwrap().unwrap();
        assert_eq!(stored, init.payment);
    }

    #[tokio::test]
    async fn test_concurrent_create_payment_returns_same_checkout() {
        let fx = fixture();
        let payer = payer();
        let order = place_order(&fx, payer.id).await;
        fx.gateway.delay_initialize(Duration::from_millis(50));

        let (first, second) = tokio::join!(
            fx.service.create_payment(&payer, request_for(&order)),
            fx.service.create_payment(&payer, request_for(&order)),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.payment.tx_ref, second.payment.tx_ref);
        assert_eq!(first.checkout_url, second.checkout_url);
        assert!(first.reused ^ second.reused);
        assert_eq!(fx.gateway.initialize_count(), 1);
        assert_eq!(fx.store.payments_for_order(order.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_failure_marks_payment_failed() {
        let fx = fixture();
        let payer = payer();
        let order = place_order(&fx, payer.id).await;
        fx.gateway.fail_initialize(GatewayError::Unavailable("connect timeout".into()));

        let err = fx.service.create_payment(&payer, request_for(&order)).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayUnavailable(_)));

        let attempts = fx.store.payments_for_order(order.id).await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, PaymentStatus::Failed);

        let stored_order = fx.store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored_order.status, OrderStatus::Pending);
        assert!(!stored_order.payment_settled);
    }

    #[tokio::test]
    async fn test_retry_after_failed_initialization_uses_new_tx_ref() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let catalog = Arc::new(InMemoryCatalog::with_items([(ITEM_A, Decimal::new(1000, 2))]));
        let orders = OrderService::new(store.clone(), catalog, metrics.clone());

        let failing = Arc::new(FakeGateway::new());
        failing.fail_initialize(GatewayError::rejected(401, "Invalid API key"));
        let failing_service = PaymentService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            failing,
            metrics.clone(),
            settings(),
        );
        let healthy_service = PaymentService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(FakeGateway::new()),
            metrics,
            settings(),
        );

        let payer = payer();
        let order = orders
            .create_order(
                payer.id,
                NewOrder {
                    delivery_address: "Piassa".into(),
                    delivery_coordinates: None,
                    delivery_distance: None,
                    delivery_fee: Some(Decimal::new(3000, 2)),
                    phone_number: "+251911000000".into(),
                    payment_method: OrderPaymentMethod::Online,
                    items: vec![RequestedItem { menu_item_id: ITEM_A, quantity: 1, special_request: None }],
                    special_instructions: None,
                },
            )
            .await
            .unwrap();

        let err = failing_service.create_payment(&payer, request_for(&order)).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayRejected { status: 401, .. }));

        let retry = healthy_service.create_payment(&payer, request_for(&order)).await.unwrap();
        assert_eq!(retry.payment.amount, Decimal::new(4000, 2));

        let attempts = store.payments_for_order(order.id).await;
        assert_eq!(attempts.len(), 2);
        let failed = attempts.iter().find(|p| p.is_failed()).unwrap();
        assert_ne!(failed.tx_ref, retry.payment.tx_ref);
    }

    #[tokio::test]
    async fn test_create_payment_guards() {
        let fx = fixture();
        let payer = payer();
        let order = place_order(&fx, payer.id).await;

        let err = fx
            .service
            .create_payment(
                &payer,
                PaymentRequest { amount: Some(Decimal::new(100, 0)), ..request_for(&order) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = fx
            .service
            .create_payment(&payer, PaymentRequest { currency: Some("birr".into()), ..request_for(&order) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let stranger = Payer { id: Uuid::new_v4(), ..payer.clone() };
        let err = fx.service.create_payment(&stranger, request_for(&order)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        fx.orders
            .transition_status(order.id, Actor::Customer(payer.id), OrderCommand::Cancel)
            .await
            .unwrap();
        let err = fx.service.create_payment(&payer, request_for(&order)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        assert_eq!(fx.gateway.initialize_count(), 0);
    }

    #[tokio::test]
    async fn test_paid_order_rejects_new_payment() {
        let fx = fixture();
        let payer = payer();
        let (order, payment) = initialized(&fx, &payer).await;
        fx.gateway.verify_returns(Ok(FakeGateway::success("CHX-1")));
        fx.service.verify_and_complete(&payment.tx_ref).await.unwrap();

        let err = fx.service.create_payment(&payer, request_for(&order)).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyPaid(_)));
        assert_eq!(fx.gateway.initialize_count(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_and_abandoned_attempts() {
        let fx = fixture();
        let payer = payer();
        let order = place_order(&fx, payer.id).await;

        let stuck = Payment::new_pending(
            order.id,
            payer.id,
            order.amount_due(),
            "ETB",
            PaymentMethod::Chapa,
            json!({}),
        );
        fx.store.insert_payment(&stuck).await.unwrap();

        let err = fx.service.create_payment(&payer, request_for(&order)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let mut old = fx.store.find_payment(stuck.id).await.unwrap().unwrap();
        old.created_at = Utc::now() - chrono::Duration::minutes(10);
        assert!(fx.store.compare_and_save_payment(&old, PaymentStatus::Pending).await.unwrap());

        let init = fx.service.create_payment(&payer, request_for(&order)).await.unwrap();
        assert_ne!(init.payment.tx_ref, stuck.tx_ref);

        let abandoned = fx.store.find_payment(stuck.id).await.unwrap().unwrap();
        assert_eq!(abandoned.status, PaymentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_verify_success_settles_order() {
        let fx = fixture();
        let payer = payer();
        let (order, payment) = initialized(&fx, &payer).await;
        fx.gateway.verify_returns(Ok(FakeGateway::success("CHX-42")));

        let result = fx.service.verify_and_complete(&payment.tx_ref).await.unwrap();

        assert!(result.verified);
        assert_eq!(result.status, PaymentStatus::Completed);
        assert_eq!(result.message, "Payment verified successfully");
        assert_eq!(result.payment.gateway_transaction_id.as_deref(), Some("CHX-42"));
        assert!(result.payment.paid_at.is_some());

        let stored_order = fx.store.find_order(order.id).await.unwrap().unwrap();
        assert!(stored_order.payment_settled);
        assert_eq!(fx.metrics.payments_settled_total.with_label_values(&["verify"]).get(), 1);
    }

    #[tokio::test]
    async fn test_verify_not_found_keeps_payment_pending() {
        let fx = fixture();
        let payer = payer();
        let (order, payment) = initialized(&fx, &payer).await;

        let result = fx.service.verify_and_complete(&payment.tx_ref).await.unwrap();

        assert!(!result.verified);
        assert_eq!(result.status, PaymentStatus::Pending);
        assert_eq!(result.checkout_url, payment.checkout_url);

        let stored = fx.store.find_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(!fx.store.find_order(order.id).await.unwrap().unwrap().payment_settled);
    }

    #[tokio::test]
    async fn test_verify_completed_payment_skips_gateway() {
        let fx = fixture();
        let payer = payer();
        let (_, payment) = initialized(&fx, &payer).await;
        fx.gateway.verify_returns(Ok(FakeGateway::success("CHX-7")));
        fx.service.verify_and_complete(&payment.tx_ref).await.unwrap();
        let calls = fx.gateway.verify_count();

        let second = fx.service.verify_and_complete(&payment.tx_ref).await.unwrap();
        let third = fx.service.verify_and_complete(&payment.tx_ref).await.unwrap();

        assert_eq!(fx.gateway.verify_count(), calls);
        assert_eq!(second, third);
        assert!(second.verified);
        assert_eq!(second.message, "Payment already completed");
    }

    #[tokio::test]
    async fn test_verify_failed_provider_status() {
        let fx = fixture();
        let payer = payer();
        let (order, payment) = initialized(&fx, &payer).await;
        fx.gateway.verify_returns(Ok(FakeGateway::failed()));

        let result = fx.service.verify_and_complete(&payment.tx_ref).await.unwrap();
        assert_eq!(result.status, PaymentStatus::Failed);
        assert!(!result.verified);
        assert!(!fx.store.find_order(order.id).await.unwrap().unwrap().payment_settled);
    }

    #[tokio::test]
    async fn test_verify_unknown_or_foreign_tx_ref() {
        let fx = fixture();
        let payer = payer();
        let (_, payment) = initialized(&fx, &payer).await;

        let err = fx.service.verify_and_complete(&TxRef::generate()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = fx.service.verify_for_customer(Uuid::new_v4(), &payment.tx_ref).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(fx.gateway.verify_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_success_webhooks_settle_once() {
        let fx = fixture();
        let payer = payer();
        let (order, payment) = initialized(&fx, &payer).await;
        fx.gateway.verify_returns(Ok(FakeGateway::success("CHX-99")));

        let (first, second) = tokio::join!(
            fx.service.handle_webhook(success_webhook(&payment.tx_ref), json!({})),
            fx.service.handle_webhook(success_webhook(&payment.tx_ref), json!({})),
        );
        assert_eq!(first.unwrap().payment_status, PaymentStatus::Completed);
        assert_eq!(second.unwrap().payment_status, PaymentStatus::Completed);

        let stored = fx.store.find_payment(payment.id).await.unwrap().unwrap();
        let paid_at = stored.paid_at;
        assert!(paid_at.is_some());
        assert!(fx.store.find_order(order.id).await.unwrap().unwrap().payment_settled);
        assert_eq!(fx.metrics.payments_settled_total.with_label_values(&["webhook"]).get(), 1);

        // A late replay changes nothing
        fx.service.handle_webhook(success_webhook(&payment.tx_ref), json!({})).await.unwrap();
        let replayed = fx.store.find_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(replayed.paid_at, paid_at);
        assert_eq!(replayed.updated_at, stored.updated_at);

        let records = fx.store.webhooks().await;
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.is_verified && r.payment_id == Some(payment.id)));
    }

    #[tokio::test]
    async fn test_failure_webhook_marks_failed_without_verify() {
        let fx = fixture();
        let payer = payer();
        let (_, payment) = initialized(&fx, &payer).await;

        let outcome = fx
            .service
            .handle_webhook(
                json!({"event": "charge.failure", "data": {"tx_ref": payment.tx_ref.as_str()}}),
                json!({"user-agent": "Chapa"}),
            )
            .await
            .unwrap();

        assert_eq!(outcome.payment_status, PaymentStatus::Failed);
        assert_eq!(fx.gateway.verify_count(), 0);

        let record = fx.store.find_webhook(outcome.webhook_id).await.unwrap().unwrap();
        assert_eq!(record.event_type, EVENT_CHARGE_FAILURE);
        assert_eq!(record.payment_id, Some(payment.id));
        assert_eq!(record.headers["user-agent"], "Chapa");
        assert!(record.is_verified);
        assert!(record.processed_at.is_some());
        assert!(record.verification_error.is_none());
    }

    #[tokio::test]
    async fn test_other_webhook_events_leave_payment_alone() {
        let fx = fixture();
        let payer = payer();
        let (_, payment) = initialized(&fx, &payer).await;

        let outcome = fx
            .service
            .handle_webhook(
                json!({"event": "charge.refunded", "data": {"tx_ref": payment.tx_ref.as_str()}}),
                json!({}),
            )
            .await
            .unwrap();

        assert_eq!(outcome.payment_status, PaymentStatus::Pending);
        let record = fx.store.find_webhook(outcome.webhook_id).await.unwrap().unwrap();
        assert!(record.processed_at.is_some());
        assert_eq!(record.event_type, "charge.refunded");
    }

    #[tokio::test]
    async fn test_unmatched_webhooks_are_still_recorded() {
        let fx = fixture();

        let err = fx
            .service
            .handle_webhook(json!({"event": "charge.success", "data": {}}), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = fx
            .service
            .handle_webhook(json!({"event": "charge.success", "data": {"tx_ref": "TX-UNKNOWN"}}), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let records = fx.store.webhooks().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.payment_id.is_none() && !r.is_verified));
        assert!(records.iter().all(|r| r.verification_error.is_some()));
        assert!(records.iter().any(|r| {
            r.verification_error.as_deref() == Some("Not found: Payment not found: TX-UNKNOWN")
        }));
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failures() {
        let fx = fixture();
        let payer = payer();

        let mut stale = Vec::new();
        for minutes in [30, 25, 20] {
            let (_, payment) = initialized(&fx, &payer).await;
            let mut aged = payment.clone();
            aged.created_at = Utc::now() - chrono::Duration::minutes(minutes);
            assert!(fx.store.compare_and_save_payment(&aged, PaymentStatus::Pending).await.unwrap());
            stale.push(aged);
        }
        let (_, fresh) = initialized(&fx, &payer).await;

        fx.gateway.push_verify(Ok(FakeGateway::success("CHX-1")));
        fx.gateway.push_verify(Ok(FakeGateway::failed()));
        fx.gateway.push_verify(Err(GatewayError::Unavailable("timeout".into())));

        let report = fx
            .service
            .sweep_pending(SweepPolicy { grace: Duration::from_secs(600), batch_size: 20 })
            .await
            .unwrap();

        assert_eq!(
            report,
            SweepReport { checked: 3, completed: 1, failed: 1, still_pending: 0, errors: 1 }
        );
        assert_eq!(fx.gateway.verify_count(), 3);

        let mut statuses = Vec::new();
        for payment in &stale {
            statuses.push(fx.store.find_payment(payment.id).await.unwrap().unwrap().status);
        }
        assert_eq!(statuses, [PaymentStatus::Completed, PaymentStatus::Failed, PaymentStatus::Pending]);
        assert_eq!(
            fx.store.find_payment(fresh.id).await.unwrap().unwrap().status,
            PaymentStatus::Pending
        );
        assert_eq!(fx.metrics.sweeper_payments_total.with_label_values(&["error"]).get(), 1);
    }

    #[tokio::test]
    async fn test_sweep_respects_batch_size() {
        let fx = fixture();
        let payer = payer();
        for _ in 0..3 {
            let (_, payment) = initialized(&fx, &payer).await;
            let mut aged = payment.clone();
            aged.created_at = Utc::now() - chrono::Duration::hours(1);
            fx.store.compare_and_save_payment(&aged, PaymentStatus::Pending).await.unwrap();
        }

        let report = fx
            .service
            .sweep_pending(SweepPolicy { grace: Duration::from_secs(600), batch_size: 2 })
            .await
            .unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.still_pending, 2);
    }

    #[tokio::test]
    async fn test_payment_queries_are_scoped_to_customer() {
        let fx = fixture();
        let payer = payer();
        let (_, first) = initialized(&fx, &payer).await;
        let (_, second) = initialized(&fx, &payer).await;

        assert_eq!(fx.service.get_payment(payer.id, first.id).await.unwrap().id, first.id);
        assert!(matches!(
            fx.service.get_payment(Uuid::new_v4(), first.id).await,
            Err(AppError::NotFound(_))
        ));

        let history = fx.service.payment_history(payer.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|p| p.id == second.id));
        assert!(fx.service.payment_history(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
