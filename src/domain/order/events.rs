use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::OrderStatus;

// ============================================================================
// Order Events - facts emitted by the Order aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Cancelled(OrderCancelled),
    DeliveryConfirmed(OrderDeliveryConfirmed),
    StatusSet(OrderStatusSet),
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Cancelled(_) => "OrderCancelled",
            OrderEvent::DeliveryConfirmed(_) => "OrderDeliveryConfirmed",
            OrderEvent::StatusSet(_) => "OrderStatusSet",
        }
    }

    pub fn new_status(&self) -> OrderStatus {
        match self {
            OrderEvent::Cancelled(_) => OrderStatus::Cancelled,
            OrderEvent::DeliveryConfirmed(_) => OrderStatus::Delivered,
            OrderEvent::StatusSet(e) => e.to,
        }
    }
}

/// Customer cancelled the order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub from: OrderStatus,
    pub cancelled_at: DateTime<Utc>,
}

/// Customer confirmed receipt of the delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDeliveryConfirmed {
    pub delivered_at: DateTime<Utc>,
}

/// Staff moved the order to an arbitrary status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusSet {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
}
