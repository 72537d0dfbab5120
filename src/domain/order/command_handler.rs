use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::CatalogLookup;
use crate::domain::aggregate::Aggregate;
use crate::errors::{AppError, Result};
use crate::metrics::Metrics;
use crate::store::{OrderRepository, StoreError};

use super::aggregate::{NewOrder, Order, OrderDraft};
use super::commands::OrderCommand;
use super::value_objects::{Actor, OrderFilter, OrderNumber};

// ============================================================================
// Order Service
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → compare-and-set save
//
// ============================================================================

const ORDER_NUMBER_ATTEMPTS: u32 = 5;

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn CatalogLookup>,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn CatalogLookup>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { orders, catalog, metrics }
    }

    /// Validate and price every line, then persist order and items together.
    pub async fn create_order(&self, customer_id: Uuid, details: NewOrder) -> Result<Order> {
        let mut draft = OrderDraft::new(customer_id, details)?;

        for requested in draft.requested_items() {
            let catalog_item = self.catalog.get(requested.menu_item_id).await?;
            draft.push_line(&requested, catalog_item)?;
        }

        let mut order = draft.into_order(OrderNumber::generate())?;

        let mut attempt = 1;
        loop {
            match self.orders.insert_order(&order).await {
                Ok(()) => break,
                Err(StoreError::UniqueViolation(constraint))
                    if constraint.contains("order_number") && attempt < ORDER_NUMBER_ATTEMPTS =>
                {
                    tracing::warn!(
                        order_number = %order.order_number,
                        attempt,
                        "Order number collision, regenerating"
                    );
                    order.order_number = OrderNumber::generate();
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.metrics.record_order_created();
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            customer_id = %customer_id,
            total = %order.total_amount,
            items = order.items.len(),
            "✅ Order created"
        );

        Ok(order)
    }

    /// Customers only see their own orders; anything else is reported as missing.
    pub async fn get_order(&self, order_id: Uuid, actor: Actor) -> Result<Order> {
        let order = self
            .orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

        match actor {
            Actor::Customer(customer_id) if !order.belongs_to(customer_id) => {
                Err(AppError::NotFound(format!("Order {order_id} not found")))
            }
            _ => Ok(order),
        }
    }

    pub async fn list_orders(&self, actor: Actor, mut filter: OrderFilter) -> Result<Vec<Order>> {
        filter.customer_id = match actor {
            Actor::Customer(customer_id) => Some(customer_id),
            Actor::Staff => filter.customer_id,
        };
        Ok(self.orders.list_orders(&filter).await?)
    }

    pub async fn transition_status(
        &self,
        order_id: Uuid,
        actor: Actor,
        command: OrderCommand,
    ) -> Result<Order> {
        if matches!((actor, &command), (Actor::Customer(_), OrderCommand::SetStatus(_))) {
            return Err(AppError::Forbidden("Only staff can set an arbitrary status".into()));
        }

        let mut order = self.get_order(order_id, actor).await?;
        let expected = order.status;

        let events = match order.execute(&command) {
            Ok(events) => events,
            Err(e) => {
                self.metrics.record_order_transition(actor.kind(), command.name(), "rejected");
                tracing::debug!(order_id = %order_id, command = %command, error = %e, "Transition rejected");
                return Err(e.into());
            }
        };

        if !self.orders.save_order_status(&order, expected).await? {
            self.metrics.record_order_transition(actor.kind(), command.name(), "conflict");
            return Err(AppError::Conflict(format!(
                "Order {order_id} was modified concurrently, reload and retry"
            )));
        }

        self.metrics.record_order_transition(actor.kind(), command.name(), "applied");
        for event in &events {
            tracing::info!(
                order_id = %order_id,
                actor = actor.kind(),
                event = event.event_type(),
                from = %expected,
                to = %event.new_status(),
                "Order status changed"
            );
        }

        // Storage may hold timestamps stamped by an earlier round trip through this status
        Ok(self.orders.find_order(order_id).await?.unwrap_or(order))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
