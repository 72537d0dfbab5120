use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::CatalogItem;
use crate::domain::aggregate::Aggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::value_objects::{
    Coordinates, OrderItem, OrderNumber, OrderPaymentMethod, OrderStatus, RequestedItem,
};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub order_number: OrderNumber,
    pub customer_id: Uuid,

    // Current State
    pub status: OrderStatus,
    pub payment_method: OrderPaymentMethod,
    pub payment_settled: bool,
    pub total_amount: Decimal,
    pub items: Vec<OrderItem>,

    // Delivery
    pub delivery_address: String,
    pub delivery_coordinates: Option<Coordinates>,
    pub delivery_distance: Option<f64>,
    pub delivery_fee: Decimal,
    pub special_instructions: String,
    pub phone_number: String,

    // Lifecycle timestamps, each written at most once
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub prepared_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn status_progress(&self) -> u8 {
        self.status.progress()
    }

    /// Sum of the line totals
    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    /// What the customer is charged: items plus delivery fee
    pub fn amount_due(&self) -> Decimal {
        self.total_amount + self.delivery_fee
    }

    pub fn belongs_to(&self, customer_id: Uuid) -> bool {
        self.customer_id == customer_id
    }
}

/// Whether staff may move an order from `from` to `to`.
///
/// Permissive: every status is reachable from every other one.
pub fn staff_transition_allowed(_from: OrderStatus, _to: OrderStatus) -> bool {
    true
}

// ============================================================================
// Order Draft - staged creation
// ============================================================================
//
// Every line is validated and priced in memory first; nothing reaches the
// store until the whole draft is complete.
//
// ============================================================================

/// Order details supplied by the customer at checkout
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub delivery_address: String,
    #[serde(default)]
    pub delivery_coordinates: Option<Coordinates>,
    #[serde(default)]
    pub delivery_distance: Option<f64>,
    #[serde(default)]
    pub delivery_fee: Option<Decimal>,
    pub phone_number: String,
    pub payment_method: OrderPaymentMethod,
    pub items: Vec<RequestedItem>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

/// Largest quantity accepted on a single line
pub const MAX_LINE_QUANTITY: u32 = 1_000;

/// Largest amount a `NUMERIC(10, 2)` money column holds: 99,999,999.99
pub const MAX_ORDER_AMOUNT: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

#[derive(Debug)]
pub struct OrderDraft {
    customer_id: Uuid,
    details: NewOrder,
    lines: Vec<OrderItem>,
    total: Decimal,
}

impl OrderDraft {
    /// Validate the order header. Lines are added with [`OrderDraft::push_line`].
    pub fn new(customer_id: Uuid, details: NewOrder) -> Result<Self, OrderError> {
        if details.items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        if details.delivery_address.trim().is_empty() {
            return Err(OrderError::MissingDeliveryAddress);
        }
        if details.phone_number.trim().is_empty() {
            return Err(OrderError::MissingPhoneNumber);
        }
        if let Some(fee) = details.delivery_fee {
            if fee.is_sign_negative() {
                return Err(OrderError::NegativeDeliveryFee);
            }
            if fee > MAX_ORDER_AMOUNT {
                return Err(OrderError::AmountTooLarge(fee));
            }
        }

        Ok(Self {
            customer_id,
            details,
            lines: Vec::new(),
            total: Decimal::ZERO,
        })
    }

    pub fn requested_items(&self) -> Vec<RequestedItem> {
        self.details.items.clone()
    }

    /// Price one requested line against its catalog entry.
    ///
    /// The catalog price is copied into the line; later catalog changes do
    /// not reach this order.
    pub fn push_line(
        &mut self,
        requested: &RequestedItem,
        catalog_item: Option<CatalogItem>,
    ) -> Result<(), OrderError> {
        let quantity = u32::try_from(requested.quantity)
            .ok()
            .filter(|q| (1..=MAX_LINE_QUANTITY).contains(q))
            .ok_or(OrderError::InvalidQuantity {
                menu_item_id: requested.menu_item_id,
                quantity: requested.quantity,
            })?;

        let catalog_item = catalog_item.ok_or(OrderError::ItemNotFound(requested.menu_item_id))?;
        if !catalog_item.available {
            return Err(OrderError::ItemUnavailable(requested.menu_item_id));
        }

        let line = OrderItem {
            id: Uuid::new_v4(),
            menu_item_id: requested.menu_item_id,
            quantity,
            unit_price: catalog_item.price,
            special_request: requested.special_request.clone().unwrap_or_default(),
        };
        let total = self.total + line.line_total();
        if total > MAX_ORDER_AMOUNT {
            return Err(OrderError::AmountTooLarge(total));
        }
        self.total = total;
        self.lines.push(line);
        Ok(())
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    /// Finish the draft. Fails if not every requested line was priced.
    pub fn into_order(self, order_number: OrderNumber) -> Result<Order, OrderError> {
        if self.lines.is_empty() || self.lines.len() != self.details.items.len() {
            return Err(OrderError::EmptyItems);
        }
        let amount_due = self.total + self.details.delivery_fee.unwrap_or(Decimal::ZERO);
        if amount_due > MAX_ORDER_AMOUNT {
            return Err(OrderError::AmountTooLarge(amount_due));
        }

        Ok(Order {
            id: Uuid::new_v4(),
            order_number,
            customer_id: self.customer_id,
            status: OrderStatus::Pending,
            payment_method: self.details.payment_method,
            payment_settled: false,
            total_amount: self.total,
            items: self.lines,
            delivery_address: self.details.delivery_address.trim().to_string(),
            delivery_coordinates: self.details.delivery_coordinates,
            delivery_distance: self.details.delivery_distance,
            delivery_fee: self.details.delivery_fee.unwrap_or(Decimal::ZERO),
            special_instructions: self.details.special_instructions.unwrap_or_default(),
            phone_number: self.details.phone_number.trim().to_string(),
            created_at: Utc::now(),
            confirmed_at: None,
            prepared_at: None,
            dispatched_at: None,
            delivered_at: None,
            cancelled_at: None,
        })
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_event(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancelled_at.get_or_insert(e.cancelled_at);
            }
            OrderEvent::DeliveryConfirmed(e) => {
                self.status = OrderStatus::Delivered;
                self.delivered_at.get_or_insert(e.delivered_at);
            }
            OrderEvent::StatusSet(e) => {
                self.status = e.to;
                match e.to {
                    OrderStatus::Confirmed => {
                        self.confirmed_at.get_or_insert(e.at);
                    }
                    OrderStatus::Preparing => {
                        self.prepared_at.get_or_insert(e.at);
                    }
                    OrderStatus::OnTheWay => {
                        self.dispatched_at.get_or_insert(e.at);
                    }
                    _ => {}
                }
            }
        }
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let now = Utc::now();

        match command {
            OrderCommand::Cancel => match self.status {
                OrderStatus::Pending | OrderStatus::Confirmed => {
                    Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                        from: self.status,
                        cancelled_at: now,
                    })])
                }
                status => Err(OrderError::InvalidTransition { action: command.name(), status }),
            },

            OrderCommand::ConfirmDelivery => match self.status {
                OrderStatus::OnTheWay => Ok(vec![OrderEvent::DeliveryConfirmed(
                    OrderDeliveryConfirmed { delivered_at: now },
                )]),
                status => Err(OrderError::InvalidTransition { action: command.name(), status }),
            },

            OrderCommand::SetStatus(to) => {
                if !staff_transition_allowed(self.status, *to) {
                    return Err(OrderError::InvalidTransition {
                        action: command.name(),
                        status: self.status,
                    });
                }

                Ok(vec![OrderEvent::StatusSet(OrderStatusSet {
                    from: self.status,
                    to: *to,
                    at: now,
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn price(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    fn available(cents: i64) -> Option<CatalogItem> {
        Some(CatalogItem { price: price(cents), available: true })
    }

    fn new_order(items: Vec<RequestedItem>) -> NewOrder {
        NewOrder {
            delivery_address: "Bole Road, Addis Ababa".to_string(),
            delivery_coordinates: None,
            delivery_distance: Some(2.5),
            delivery_fee: Some(price(3000)),
            phone_number: "+251911000000".to_string(),
            payment_method: OrderPaymentMethod::Online,
            items,
            special_instructions: None,
        }
    }

    fn line(menu_item_id: i64, quantity: i64) -> RequestedItem {
        RequestedItem { menu_item_id, quantity, special_request: None }
    }

    fn order_in(status: OrderStatus) -> Order {
        let mut draft = OrderDraft::new(Uuid::new_v4(), new_order(vec![line(1, 1)])).unwrap();
        draft.push_line(&line(1, 1), available(1000)).unwrap();
        let mut order = draft.into_order(OrderNumber::generate()).unwrap();
        order.status = status;
        order
    }

    #[test]
    fn test_draft_totals_lines_from_catalog_prices() {
        let requested = vec![line(1, 2), line(2, 1)];
        let mut draft = OrderDraft::new(Uuid::new_v4(), new_order(requested.clone())).unwrap();
        draft.push_line(&requested[0], available(1000)).unwrap();
        draft.push_line(&requested[1], available(550)).unwrap();

        let order = draft.into_order(OrderNumber::generate()).unwrap();
        assert_eq!(order.total_amount, price(2550));
        assert_eq!(order.items_total(), order.total_amount);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.payment_settled);
        assert_eq!(order.amount_due(), price(5550));
    }

    #[test]
    fn test_draft_rejects_empty_items() {
        let err = OrderDraft::new(Uuid::new_v4(), new_order(vec![])).unwrap_err();
        assert_eq!(err, OrderError::EmptyItems);
    }

    #[test]
    fn test_draft_rejects_non_positive_quantity() {
        let mut draft = OrderDraft::new(Uuid::new_v4(), new_order(vec![line(1, 0)])).unwrap();
        let err = draft.push_line(&line(1, 0), available(1000)).unwrap_err();
        assert_eq!(err, OrderError::InvalidQuantity { menu_item_id: 1, quantity: 0 });

        let err = draft.push_line(&line(1, -3), available(1000)).unwrap_err();
        assert!(matches!(err, OrderError::InvalidQuantity { quantity: -3, .. }));
    }

    #[test]
    fn test_draft_rejects_oversized_quantity() {
        let mut draft = OrderDraft::new(Uuid::new_v4(), new_order(vec![line(1, 1)])).unwrap();
        draft
            .push_line(&line(1, MAX_LINE_QUANTITY as i64), available(100))
            .unwrap();

        for quantity in [MAX_LINE_QUANTITY as i64 + 1, i32::MAX as i64 + 1, i64::MAX] {
            let err = draft.push_line(&line(1, quantity), available(100)).unwrap_err();
            assert_eq!(err, OrderError::InvalidQuantity { menu_item_id: 1, quantity });
        }
    }

    #[test]
    fn test_max_order_amount_matches_column() {
        assert_eq!(MAX_ORDER_AMOUNT.to_string(), "99999999.99");
    }

    #[test]
    fn test_draft_rejects_totals_beyond_money_columns() {
        let mut draft = OrderDraft::new(Uuid::new_v4(), new_order(vec![line(1, 1)])).unwrap();
        let err = draft
            .push_line(&line(1, 1000), Some(CatalogItem { price: MAX_ORDER_AMOUNT, available: true }))
            .unwrap_err();
        assert!(matches!(err, OrderError::AmountTooLarge(_)));
        assert_eq!(draft.total(), Decimal::ZERO);

        // Items fit but the delivery fee pushes the amount due over
        let mut details = new_order(vec![line(1, 1)]);
        details.delivery_fee = Some(MAX_ORDER_AMOUNT);
        let mut draft = OrderDraft::new(Uuid::new_v4(), details).unwrap();
        draft.push_line(&line(1, 1), available(100)).unwrap();
        let err = draft.into_order(OrderNumber::generate()).unwrap_err();
        assert!(matches!(err, OrderError::AmountTooLarge(_)));

        let mut details = new_order(vec![line(1, 1)]);
        details.delivery_fee = Some(MAX_ORDER_AMOUNT + price(1));
        assert!(matches!(
            OrderDraft::new(Uuid::new_v4(), details).unwrap_err(),
            OrderError::AmountTooLarge(_)
        ));
    }

    #[test]
    fn test_draft_rejects_unknown_and_unavailable_items() {
        let mut draft = OrderDraft::new(Uuid::new_v4(), new_order(vec![line(9, 1)])).unwrap();
        assert_eq!(draft.push_line(&line(9, 1), None).unwrap_err(), OrderError::ItemNotFound(9));

        let sold_out = Some(CatalogItem { price: price(100), available: false });
        assert_eq!(
            draft.push_line(&line(9, 1), sold_out).unwrap_err(),
            OrderError::ItemUnavailable(9)
        );
    }

    #[test]
    fn test_incomplete_draft_cannot_become_an_order() {
        let requested = vec![line(1, 1), line(2, 1)];
        let mut draft = OrderDraft::new(Uuid::new_v4(), new_order(requested.clone())).unwrap();
        draft.push_line(&requested[0], available(1000)).unwrap();
        assert!(draft.into_order(OrderNumber::generate()).is_err());
    }

    #[test]
    fn test_customer_cancel_allowed_from_pending_and_confirmed() {
        for status in [OrderStatus::Pending, OrderStatus::Confirmed] {
            let mut order = order_in(status);
            order.execute(&OrderCommand::Cancel).unwrap();
            assert_eq!(order.status, OrderStatus::Cancelled);
            assert!(order.cancelled_at.is_some());
        }
    }

    #[test]
    fn test_customer_cancel_rejected_once_preparing() {
        for status in [
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::OnTheWay,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let mut order = order_in(status);
            let before = order.clone();
            let err = order.execute(&OrderCommand::Cancel).unwrap_err();
            assert_eq!(err, OrderError::InvalidTransition { action: "cancel", status });
            assert_eq!(order, before);
        }
    }

    #[test]
    fn test_confirm_delivery_only_from_on_the_way() {
        let mut order = order_in(OrderStatus::OnTheWay);
        order.execute(&OrderCommand::ConfirmDelivery).unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        let delivered_at = order.delivered_at.unwrap();

        let err = order.execute(&OrderCommand::ConfirmDelivery).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { status: OrderStatus::Delivered, .. }));
        assert_eq!(order.delivered_at, Some(delivered_at));

        let mut early = order_in(OrderStatus::Ready);
        assert!(early.execute(&OrderCommand::ConfirmDelivery).is_err());
        assert!(early.delivered_at.is_none());
    }

    #[test]
    fn test_staff_set_status_stamps_once() {
        let mut order = order_in(OrderStatus::Pending);
        order.execute(&OrderCommand::SetStatus(OrderStatus::Confirmed)).unwrap();
        let confirmed_at = order.confirmed_at.unwrap();

        order.execute(&OrderCommand::SetStatus(OrderStatus::Pending)).unwrap();
        order.execute(&OrderCommand::SetStatus(OrderStatus::Confirmed)).unwrap();
        assert_eq!(order.confirmed_at, Some(confirmed_at));

        order.execute(&OrderCommand::SetStatus(OrderStatus::Preparing)).unwrap();
        order.execute(&OrderCommand::SetStatus(OrderStatus::OnTheWay)).unwrap();
        assert!(order.prepared_at.is_some());
        assert!(order.dispatched_at.is_some());
        assert_eq!(order.status, OrderStatus::OnTheWay);
    }

    #[test]
    fn test_staff_may_jump_states() {
        let mut order = order_in(OrderStatus::Pending);
        order.execute(&OrderCommand::SetStatus(OrderStatus::Delivered)).unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert!(order.confirmed_at.is_none());
        assert!(order.delivered_at.is_none());
    }

    #[test]
    fn test_cancelled_at_not_overwritten() {
        let mut order = order_in(OrderStatus::Pending);
        order.execute(&OrderCommand::Cancel).unwrap();
        let first = order.cancelled_at;

        order.execute(&OrderCommand::SetStatus(OrderStatus::Pending)).unwrap();
        order.execute(&OrderCommand::Cancel).unwrap();
        assert_eq!(order.cancelled_at, first);
    }
}
