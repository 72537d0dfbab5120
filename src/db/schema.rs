use anyhow::{Context, Result};
use sqlx::PgPool;

// ============================================================================
// Schema bootstrap
// ============================================================================
//
// Idempotent: every statement is IF NOT EXISTS, so this runs on each start.
//
// ============================================================================

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS menu_items (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        price NUMERIC(10, 2) NOT NULL CHECK (price >= 0),
        is_available BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        order_number VARCHAR(20) NOT NULL UNIQUE,
        customer_id UUID NOT NULL,
        status TEXT NOT NULL,
        payment_method TEXT NOT NULL,
        payment_settled BOOLEAN NOT NULL DEFAULT FALSE,
        total_amount NUMERIC(10, 2) NOT NULL,
        delivery_address TEXT NOT NULL,
        delivery_latitude NUMERIC(9, 6),
        delivery_longitude NUMERIC(9, 6),
        delivery_distance DOUBLE PRECISION,
        delivery_fee NUMERIC(10, 2) NOT NULL DEFAULT 0,
        special_instructions TEXT NOT NULL DEFAULT '',
        phone_number TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        confirmed_at TIMESTAMPTZ,
        prepared_at TIMESTAMPTZ,
        dispatched_at TIMESTAMPTZ,
        delivered_at TIMESTAMPTZ,
        cancelled_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS orders_customer_created ON orders (customer_id, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS order_items (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        menu_item_id BIGINT NOT NULL,
        quantity INTEGER NOT NULL CHECK (quantity >= 1),
        unit_price NUMERIC(10, 2) NOT NULL,
        special_request TEXT NOT NULL DEFAULT ''
    )",
    "CREATE INDEX IF NOT EXISTS order_items_order ON order_items (order_id, position)",
    "CREATE TABLE IF NOT EXISTS payments (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        customer_id UUID NOT NULL,
        amount NUMERIC(10, 2) NOT NULL,
        currency VARCHAR(3) NOT NULL DEFAULT 'ETB',
        payment_method TEXT NOT NULL,
        status TEXT NOT NULL,
        tx_ref VARCHAR(100) NOT NULL UNIQUE,
        gateway_transaction_id TEXT,
        checkout_url TEXT,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        paid_at TIMESTAMPTZ
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS payments_one_active_per_order
        ON payments (order_id) WHERE status IN ('pending', 'processing', 'completed')",
    "CREATE INDEX IF NOT EXISTS payments_status_created ON payments (status, created_at)",
    "CREATE INDEX IF NOT EXISTS payments_customer_created ON payments (customer_id, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS payment_webhooks (
        id UUID PRIMARY KEY,
        payment_id UUID REFERENCES payments (id) ON DELETE CASCADE,
        event_type TEXT NOT NULL,
        payload JSONB NOT NULL,
        headers JSONB NOT NULL,
        is_verified BOOLEAN NOT NULL DEFAULT FALSE,
        verification_error TEXT,
        received_at TIMESTAMPTZ NOT NULL,
        processed_at TIMESTAMPTZ
    )",
];

pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("schema statement failed: {}", first_line(statement)))?;
    }

    tracing::info!(statements = SCHEMA.len(), "✅ Database schema ready");
    Ok(())
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement)
}
