use std::fmt;
use std::str::FromStr;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OrderCommand {
    /// Customer: allowed from pending or confirmed
    Cancel,
    /// Customer: allowed from on_the_way only
    ConfirmDelivery,
    /// Staff: any status, subject to `staff_transition_allowed`
    SetStatus(OrderStatus),
}

impl OrderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::Cancel => "cancel",
            OrderCommand::ConfirmDelivery => "confirm_delivery",
            OrderCommand::SetStatus(_) => "set_status",
        }
    }
}

impl fmt::Display for OrderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderCommand::SetStatus(status) => write!(f, "set_status({status})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Actions a customer may request through the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerAction {
    Cancel,
    ConfirmDelivery,
}

impl FromStr for CustomerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel" => Ok(CustomerAction::Cancel),
            "confirm_delivery" => Ok(CustomerAction::ConfirmDelivery),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

impl From<CustomerAction> for OrderCommand {
    fn from(action: CustomerAction) -> Self {
        match action {
            CustomerAction::Cancel => OrderCommand::Cancel,
            CustomerAction::ConfirmDelivery => OrderCommand::ConfirmDelivery,
        }
    }
}
