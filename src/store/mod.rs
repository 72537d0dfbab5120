// ============================================================================
// Persistence seams
// ============================================================================
//
// Services depend on these traits only. `PgStore` is the production
// implementation; `MemoryStore` backs tests and local demos.
//
// Status updates are compare-and-set against the status the caller loaded,
// so concurrent writers never overwrite each other silently.
//
// ============================================================================

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::order::{Order, OrderFilter, OrderStatus};
use crate::domain::payment::{Payment, PaymentMethod, PaymentStatus, TxRef, WebhookRecord, WebhookUpdate};
use crate::utils::IsTransient;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::UniqueViolation(constraint);
            }
        }
        StoreError::Database(err)
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert the order and all of its items in one transaction
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Newest first
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    /// Persist status and lifecycle timestamps if the stored status is still
    /// `expected`. Timestamps already set in storage are kept as they are.
    /// Returns false when another writer got there first.
    async fn save_order_status(&self, order: &Order, expected: OrderStatus) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Fails with `UniqueViolation` on a duplicate tx_ref or a second active
    /// payment for the same order.
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn find_payment_by_tx_ref(&self, tx_ref: &TxRef) -> Result<Option<Payment>, StoreError>;

    /// The pending, processing or completed payment of an order, if any
    async fn find_active_payment(&self, order_id: Uuid) -> Result<Option<Payment>, StoreError>;

    /// Newest first
    async fn list_payments_for_customer(&self, customer_id: Uuid) -> Result<Vec<Payment>, StoreError>;

    /// Oldest first, at most `limit`
    async fn list_stale_pending(
        &self,
        method: PaymentMethod,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, StoreError>;

    /// Persist the payment if the stored status is still `expected`.
    ///
    /// When the saved status is `completed`, the linked order's
    /// payment-settled flag is set in the same transaction.
    async fn compare_and_save_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn insert_webhook(&self, record: &WebhookRecord) -> Result<(), StoreError>;

    async fn update_webhook(&self, id: Uuid, update: &WebhookUpdate) -> Result<(), StoreError>;

    async fn find_webhook(&self, id: Uuid) -> Result<Option<WebhookRecord>, StoreError>;
}
