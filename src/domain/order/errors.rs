use super::value_objects::{MenuItemId, OrderStatus};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid quantity {quantity} for menu item {menu_item_id}")]
    InvalidQuantity {
        menu_item_id: MenuItemId,
        quantity: i64,
    },

    #[error("Menu item with ID {0} does not exist")]
    ItemNotFound(MenuItemId),

    #[error("Menu item with ID {0} is not available")]
    ItemUnavailable(MenuItemId),

    #[error("Delivery address is required")]
    MissingDeliveryAddress,

    #[error("Phone number is required")]
    MissingPhoneNumber,

    #[error("Delivery fee cannot be negative")]
    NegativeDeliveryFee,

    #[error("Order amount {0} exceeds the maximum of {max}", max = super::aggregate::MAX_ORDER_AMOUNT)]
    AmountTooLarge(rust_decimal::Decimal),

    #[error("Cannot {action} an order in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: OrderStatus,
    },
}
