use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::order::{
    Coordinates, Order, OrderFilter, OrderItem, OrderNumber, OrderStatus,
};
use crate::domain::payment::{
    Payment, PaymentMethod, PaymentStatus, TxRef, WebhookRecord, WebhookUpdate,
};
use super::{OrderRepository, PaymentRepository, StoreError, WebhookRepository};

// ============================================================================
// Postgres Store
// ============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, StoreError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, menu_item_id, quantity, unit_price, special_request
             FROM order_items
             WHERE order_id = ANY($1)
             ORDER BY order_id, position",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id = row.order_id;
            items.entry(order_id).or_default().push(row.try_into()?);
        }
        Ok(items)
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.load_items(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect()
    }
}

const ORDER_COLUMNS: &str = "id, order_number, customer_id, status, payment_method, payment_settled,
    total_amount, delivery_address, delivery_latitude, delivery_longitude, delivery_distance,
    delivery_fee, special_instructions, phone_number, created_at, confirmed_at, prepared_at,
    dispatched_at, delivered_at, cancelled_at";

const PAYMENT_COLUMNS: &str = "id, order_id, customer_id, amount, currency, payment_method, status,
    tx_ref, gateway_transaction_id, checkout_url, metadata, created_at, updated_at, paid_at";

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: Uuid,
    status: String,
    payment_method: String,
    payment_settled: bool,
    total_amount: Decimal,
    delivery_address: String,
    delivery_latitude: Option<Decimal>,
    delivery_longitude: Option<Decimal>,
    delivery_distance: Option<f64>,
    delivery_fee: Decimal,
    special_instructions: String,
    phone_number: String,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    prepared_at: Option<DateTime<Utc>>,
    dispatched_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, StoreError> {
        let delivery_coordinates = match (self.delivery_latitude, self.delivery_longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        };

        Ok(Order {
            id: self.id,
            order_number: OrderNumber::from_stored(self.order_number),
            customer_id: self.customer_id,
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            payment_method: self.payment_method.parse().map_err(StoreError::Corrupt)?,
            payment_settled: self.payment_settled,
            total_amount: self.total_amount,
            items,
            delivery_address: self.delivery_address,
            delivery_coordinates,
            delivery_distance: self.delivery_distance,
            delivery_fee: self.delivery_fee,
            special_instructions: self.special_instructions,
            phone_number: self.phone_number,
            created_at: self.created_at,
            confirmed_at: self.confirmed_at,
            prepared_at: self.prepared_at,
            dispatched_at: self.dispatched_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    menu_item_id: i64,
    quantity: i32,
    unit_price: Decimal,
    special_request: String,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity)
            .map_err(|_| StoreError::Corrupt(format!("negative quantity on item {}", row.id)))?;

        Ok(OrderItem {
            id: row.id,
            menu_item_id: row.menu_item_id,
            quantity,
            unit_price: row.unit_price,
            special_request: row.special_request,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    customer_id: Uuid,
    amount: Decimal,
    currency: String,
    payment_method: String,
    status: String,
    tx_ref: String,
    gateway_transaction_id: Option<String>,
    checkout_url: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            customer_id: row.customer_id,
            amount: row.amount,
            currency: row.currency,
            method: row.payment_method.parse().map_err(StoreError::Corrupt)?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            tx_ref: TxRef::from_stored(row.tx_ref),
            gateway_transaction_id: row.gateway_transaction_id,
            checkout_url: row.checkout_url,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
            paid_at: row.paid_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: Uuid,
    payment_id: Option<Uuid>,
    event_type: String,
    payload: serde_json::Value,
    headers: serde_json::Value,
    is_verified: bool,
    verification_error: Option<String>,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl From<WebhookRow> for WebhookRecord {
    fn from(row: WebhookRow) -> Self {
        WebhookRecord {
            id: row.id,
            event_type: row.event_type,
            payload: row.payload,
            headers: row.headers,
            is_verified: row.is_verified,
            payment_id: row.payment_id,
            verification_error: row.verification_error,
            received_at: row.received_at,
            processed_at: row.processed_at,
        }
    }
}

// ============================================================================
// Orders
// ============================================================================

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (
                id, order_number, customer_id, status, payment_method, payment_settled,
                total_amount, delivery_address, delivery_latitude, delivery_longitude,
                delivery_distance, delivery_fee, special_instructions, phone_number,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)",
        )
        .bind(order.id)
        .bind(order.order_number.as_str())
        .bind(order.customer_id)
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.payment_settled)
        .bind(order.total_amount)
        .bind(&order.delivery_address)
        .bind(order.delivery_coordinates.map(|c| c.latitude))
        .bind(order.delivery_coordinates.map(|c| c.longitude))
        .bind(order.delivery_distance)
        .bind(order.delivery_fee)
        .bind(&order.special_instructions)
        .bind(&order.phone_number)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        if !order.items.is_empty() {
            let quantities = order
                .items
                .iter()
                .map(|item| {
                    i32::try_from(item.quantity)
                        .map_err(|_| StoreError::Corrupt(format!("quantity {} out of range", item.quantity)))
                })
                .collect::<Result<Vec<i32>, StoreError>>()?;

            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO order_items (id, order_id, position, menu_item_id, quantity, unit_price, special_request) ",
            );
            builder.push_values(order.items.iter().zip(quantities).enumerate(), |mut row, (position, (item, quantity))| {
                row.push_bind(item.id)
                    .push_bind(order.id)
                    .push_bind(position as i32)
                    .push_bind(item.menu_item_id)
                    .push_bind(quantity)
                    .push_bind(item.unit_price)
                    .push_bind(&item.special_request);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"));

        if let Some(customer_id) = filter.customer_id {
            builder.push(" AND customer_id = ").push_bind(customer_id);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(method) = filter.payment_method {
            builder.push(" AND payment_method = ").push_bind(method.as_str());
        }
        if let Some(settled) = filter.payment_settled {
            builder.push(" AND payment_settled = ").push_bind(settled);
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build_query_as::<OrderRow>()
            .fetch_all(&self.pool)
            .await?;

        self.hydrate(rows).await
    }

    async fn save_order_status(&self, order: &Order, expected: OrderStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET
                status = $1,
                confirmed_at = COALESCE(confirmed_at, $2),
                prepared_at = COALESCE(prepared_at, $3),
                dispatched_at = COALESCE(dispatched_at, $4),
                delivered_at = COALESCE(delivered_at, $5),
                cancelled_at = COALESCE(cancelled_at, $6),
                updated_at = NOW()
             WHERE id = $7 AND status = $8",
        )
        .bind(order.status.as_str())
        .bind(order.confirmed_at)
        .bind(order.prepared_at)
        .bind(order.dispatched_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// Payments
// ============================================================================

#[async_trait]
impl PaymentRepository for PgStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payments (
                id, order_id, customer_id, amount, currency, payment_method, status, tx_ref,
                gateway_transaction_id, checkout_url, metadata, created_at, updated_at, paid_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(payment.customer_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.tx_ref.as_str())
        .bind(&payment.gateway_transaction_id)
        .bind(&payment.checkout_url)
        .bind(&payment.metadata)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .bind(payment.paid_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        sqlx::query_as::<_, PaymentRow>(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    async fn find_payment_by_tx_ref(&self, tx_ref: &TxRef) -> Result<Option<Payment>, StoreError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE tx_ref = $1"
        ))
        .bind(tx_ref.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Payment::try_from)
        .transpose()
    }

    async fn find_active_payment(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let active: Vec<&str> = PaymentStatus::ACTIVE.iter().map(|s| s.as_str()).collect();

        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE order_id = $1 AND status = ANY($2)
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(order_id)
        .bind(&active[..])
        .fetch_optional(&self.pool)
        .await?
        .map(Payment::try_from)
        .transpose()
    }

    async fn list_payments_for_customer(&self, customer_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE customer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect()
    }

    async fn list_stale_pending(
        &self,
        method: PaymentMethod,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE status = $1 AND payment_method = $2 AND created_at < $3
             ORDER BY created_at
             LIMIT $4"
        ))
        .bind(PaymentStatus::Pending.as_str())
        .bind(method.as_str())
        .bind(created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect()
    }

    async fn compare_and_save_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE payments SET
                status = $1,
                gateway_transaction_id = $2,
                checkout_url = $3,
                paid_at = COALESCE(paid_at, $4),
                updated_at = $5
             WHERE id = $6 AND status = $7",
        )
        .bind(payment.status.as_str())
        .bind(&payment.gateway_transaction_id)
        .bind(&payment.checkout_url)
        .bind(payment.paid_at)
        .bind(payment.updated_at)
        .bind(payment.id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        if payment.status == PaymentStatus::Completed {
            sqlx::query(
                "UPDATE orders SET payment_settled = TRUE, updated_at = NOW()
                 WHERE id = $1 AND payment_settled = FALSE",
            )
            .bind(payment.order_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}

// ============================================================================
// Webhooks
// ============================================================================

#[async_trait]
impl WebhookRepository for PgStore {
    async fn insert_webhook(&self, record: &WebhookRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payment_webhooks (
                id, payment_id, event_type, payload, headers, is_verified,
                verification_error, received_at, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(record.payment_id)
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(&record.headers)
        .bind(record.is_verified)
        .bind(&record.verification_error)
        .bind(record.received_at)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_webhook(&self, id: Uuid, update: &WebhookUpdate) -> Result<(), StoreError> {
        let query = match update {
            WebhookUpdate::Linked { payment_id } => {
                sqlx::query("UPDATE payment_webhooks SET payment_id = $1 WHERE id = $2").bind(*payment_id)
            }
            WebhookUpdate::Processed { at } => sqlx::query(
                "UPDATE payment_webhooks SET is_verified = TRUE, processed_at = $1 WHERE id = $2",
            )
            .bind(*at),
            WebhookUpdate::Failed { error } => {
                sqlx::query("UPDATE payment_webhooks SET verification_error = $1 WHERE id = $2")
                    .bind(error.as_str())
            }
        };

        let result = query.bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!("webhook record {id} missing")));
        }
        Ok(())
    }

    async fn find_webhook(&self, id: Uuid) -> Result<Option<WebhookRecord>, StoreError> {
        let row = sqlx::query_as::<_, WebhookRow>(
            "SELECT id, payment_id, event_type, payload, headers, is_verified,
                    verification_error, received_at, processed_at
             FROM payment_webhooks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(WebhookRecord::from))
    }
}
