use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::order::{Order, OrderFilter, OrderStatus};
use crate::domain::payment::{
    Payment, PaymentMethod, PaymentStatus, TxRef, WebhookRecord, WebhookUpdate,
};
use super::{OrderRepository, PaymentRepository, StoreError, WebhookRepository};

#[derive(Default)]
struct State {
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
    webhooks: HashMap<Uuid, WebhookRecord>,
}

/// In-process store with the same constraints as the Postgres schema.
///
/// A single lock covers all tables, so every operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn order_item_count(&self) -> usize {
        self.state.lock().await.orders.values().map(|o| o.items.len()).sum()
    }

    pub async fn payments_for_order(&self, order_id: Uuid) -> Vec<Payment> {
        let state = self.state.lock().await;
        state.payments.values().filter(|p| p.order_id == order_id).cloned().collect()
    }

    pub async fn webhooks(&self) -> Vec<WebhookRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state.webhooks.values().cloned().collect();
        records.sort_by_key(|r| r.received_at);
        records
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.orders.values().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::UniqueViolation("orders_order_number_key".into()));
        }
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::UniqueViolation("orders_pkey".into()));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| filter.customer_id.map_or(true, |id| o.customer_id == id))
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .filter(|o| filter.payment_method.map_or(true, |m| o.payment_method == m))
            .filter(|o| filter.payment_settled.map_or(true, |p| o.payment_settled == p))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn save_order_status(&self, order: &Order, expected: OrderStatus) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.orders.get_mut(&order.id) else {
            return Ok(false);
        };
        if stored.status != expected {
            return Ok(false);
        }

        stored.status = order.status;
        // A stamped timestamp is never replaced or cleared
        stored.confirmed_at = stored.confirmed_at.or(order.confirmed_at);
        stored.prepared_at = stored.prepared_at.or(order.prepared_at);
        stored.dispatched_at = stored.dispatched_at.or(order.dispatched_at);
        stored.delivered_at = stored.delivered_at.or(order.delivered_at);
        stored.cancelled_at = stored.cancelled_at.or(order.cancelled_at);
        Ok(true)
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.payments.values().any(|p| p.tx_ref == payment.tx_ref) {
            return Err(StoreError::UniqueViolation("payments_tx_ref_key".into()));
        }
        if payment.status.is_active()
            && state
                .payments
                .values()
                .any(|p| p.order_id == payment.order_id && p.status.is_active())
        {
            return Err(StoreError::UniqueViolation("payments_one_active_per_order".into()));
        }
        state.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.state.lock().await.payments.get(&id).cloned())
    }

    async fn find_payment_by_tx_ref(&self, tx_ref: &TxRef) -> Result<Option<Payment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.payments.values().find(|p| &p.tx_ref == tx_ref).cloned())
    }

    async fn find_active_payment(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.order_id == order_id && p.status.is_active())
            .cloned())
    }

    async fn list_payments_for_customer(&self, customer_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let state = self.state.lock().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|p| p.customer_id == customer_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn list_stale_pending(
        &self,
        method: PaymentMethod,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError> {
        let state = self.state.lock().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|p| {
                p.status == PaymentStatus::Pending && p.method == method && p.created_at < created_before
            })
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        payments.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(payments)
    }

    async fn compare_and_save_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.payments.get(&payment.id) {
            Some(stored) if stored.status == expected => {}
            _ => return Ok(false),
        }

        state.payments.insert(payment.id, payment.clone());
        if payment.status == PaymentStatus::Completed {
            if let Some(order) = state.orders.get_mut(&payment.order_id) {
                order.payment_settled = true;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl WebhookRepository for MemoryStore {
    async fn insert_webhook(&self, record: &WebhookRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.webhooks.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_webhook(&self, id: Uuid, update: &WebhookUpdate) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let record = state
            .webhooks
            .get_mut(&id)
            .ok_or_else(|| StoreError::Corrupt(format!("webhook record {id} missing")))?;

        match update {
            WebhookUpdate::Linked { payment_id } => record.payment_id = Some(*payment_id),
            WebhookUpdate::Processed { at } => {
                record.is_verified = true;
                record.processed_at = Some(*at);
            }
            WebhookUpdate::Failed { error } => record.verification_error = Some(error.clone()),
        }
        Ok(())
    }

    async fn find_webhook(&self, id: Uuid) -> Result<Option<WebhookRecord>, StoreError> {
        Ok(self.state.lock().await.webhooks.get(&id).cloned())
    }
}
