use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Identifier of a menu item in the external catalog
pub type MenuItemId = i64;

const ORDER_NUMBER_LEN: usize = 12;

/// Human-readable order number, fixed length, uppercase alphanumeric
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Derive a fresh number from a random v4 UUID.
    ///
    /// Uniqueness is still enforced by the storage layer; callers retry on
    /// a unique violation.
    pub fn generate() -> Self {
        let token = Uuid::new_v4().simple().to_string().to_uppercase();
        Self(token[..ORDER_NUMBER_LEN].to_string())
    }

    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::OnTheWay,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::OnTheWay => "on_the_way",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Fixed progress percentage shown to customers
    pub fn progress(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 20,
            OrderStatus::Preparing => 40,
            OrderStatus::Ready => 60,
            OrderStatus::OnTheWay => 80,
            OrderStatus::Delivered => 100,
            OrderStatus::Cancelled => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// How the customer intends to pay for the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentMethod {
    Cash,
    Card,
    Online,
}

impl OrderPaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentMethod::Cash => "cash",
            OrderPaymentMethod::Card => "card",
            OrderPaymentMethod::Online => "online",
        }
    }
}

impl FromStr for OrderPaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(OrderPaymentMethod::Cash),
            "card" => Ok(OrderPaymentMethod::Card),
            "online" => Ok(OrderPaymentMethod::Online),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: Decimal,
    pub longitude: Decimal,
}

/// Line item as persisted; `unit_price` is a snapshot taken at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub menu_item_id: MenuItemId,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub special_request: String,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Line item as requested by the client, before catalog resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedItem {
    pub menu_item_id: MenuItemId,
    pub quantity: i64,
    #[serde(default)]
    pub special_request: Option<String>,
}

/// Who is asking for a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(Uuid),
    Staff,
}

impl Actor {
    pub fn kind(&self) -> &'static str {
        match self {
            Actor::Customer(_) => "customer",
            Actor::Staff => "staff",
        }
    }
}

/// Filters shared by the customer and staff order listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    #[serde(skip)]
    pub customer_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub payment_method: Option<OrderPaymentMethod>,
    pub payment_settled: Option<bool>,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_order_number_shape() {
        let number = OrderNumber::generate();
        assert_eq!(number.as_str().len(), ORDER_NUMBER_LEN);
        assert!(number
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_order_numbers_are_distinct() {
        let numbers: HashSet<_> = (0..5_000).map(|_| OrderNumber::generate()).collect();
        assert_eq!(numbers.len(), 5_000);
    }

    #[test]
    fn test_status_progress_table() {
        let expected = [0, 20, 40, 60, 80, 100, 0];
        for (status, pct) in OrderStatus::ALL.iter().zip(expected) {
            assert_eq!(status.progress(), pct, "{status}");
        }
    }

    #[test]
    fn test_status_wire_names_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&OrderStatus::OnTheWay).unwrap(),
            "\"on_the_way\""
        );
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_line_total() {
        let item = OrderItem {
            id: Uuid::new_v4(),
            menu_item_id: 7,
            quantity: 3,
            unit_price: Decimal::new(550, 2),
            special_request: String::new(),
        };
        assert_eq!(item.line_total(), Decimal::new(1650, 2));
    }
}
