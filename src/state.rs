use std::sync::Arc;

use crate::domain::order::OrderService;
use crate::domain::payment::PaymentService;

/// Shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}
