use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::order::{
    Actor, CustomerAction, NewOrder, Order, OrderCommand, OrderFilter, OrderStatus,
};
use crate::errors::{AppError, Result};
use crate::state::AppState;
use crate::web::AuthenticatedUser;

/// Order plus the progress percentage shown to customers
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub status_progress: u8,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            status_progress: order.status_progress(),
            order,
        }
    }
}

fn responses(orders: Vec<Order>) -> Vec<OrderResponse> {
    orders.into_iter().map(OrderResponse::from).collect()
}

#[derive(Debug, Deserialize)]
pub struct CustomerActionRequest {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct StaffStatusRequest {
    pub status: OrderStatus,
}

#[instrument(
    name = "handler::create_order",
    skip(app_state, auth_user, req_payload),
    fields(user_id = %auth_user.id(), items = req_payload.items.len())
)]
pub async fn create_order_handler(
    app_state: web::Data<AppState>,
    auth_user: AuthenticatedUser,
    req_payload: web::Json<NewOrder>,
) -> Result<HttpResponse> {
    let order = app_state
        .orders
        .create_order(auth_user.id(), req_payload.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(OrderResponse::from(order)))
}

#[instrument(name = "handler::list_orders", skip(app_state, auth_user, filter), fields(user_id = %auth_user.id()))]
pub async fn list_orders_handler(
    app_state: web::Data<AppState>,
    auth_user: AuthenticatedUser,
    filter: web::Query<OrderFilter>,
) -> Result<HttpResponse> {
    let orders = app_state
        .orders
        .list_orders(Actor::Customer(auth_user.id()), filter.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(responses(orders)))
}

#[instrument(name = "handler::get_order", skip(app_state, auth_user), fields(user_id = %auth_user.id()))]
pub async fn get_order_handler(
    app_state: web::Data<AppState>,
    auth_user: AuthenticatedUser,
    order_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let order = app_state
        .orders
        .get_order(order_id.into_inner(), Actor::Customer(auth_user.id()))
        .await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

#[instrument(
    name = "handler::customer_order_action",
    skip(app_state, auth_user, req_payload),
    fields(user_id = %auth_user.id(), action = %req_payload.action)
)]
pub async fn customer_action_handler(
    app_state: web::Data<AppState>,
    auth_user: AuthenticatedUser,
    order_id: web::Path<Uuid>,
    req_payload: web::Json<CustomerActionRequest>,
) -> Result<HttpResponse> {
    let action: CustomerAction = req_payload.action.parse().map_err(AppError::Validation)?;
    let order = app_state
        .orders
        .transition_status(
            order_id.into_inner(),
            Actor::Customer(auth_user.id()),
            OrderCommand::from(action),
        )
        .await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

#[instrument(name = "handler::staff_list_orders", skip(app_state, auth_user, filter), fields(user_id = %auth_user.id()))]
pub async fn staff_list_orders_handler(
    app_state: web::Data<AppState>,
    auth_user: AuthenticatedUser,
    filter: web::Query<OrderFilter>,
) -> Result<HttpResponse> {
    auth_user.require_staff()?;
    let orders = app_state
        .orders
        .list_orders(auth_user.0.actor(), filter.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(responses(orders)))
}

#[instrument(
    name = "handler::staff_update_status",
    skip(app_state, auth_user, req_payload),
    fields(user_id = %auth_user.id(), status = %req_payload.status)
)]
pub async fn staff_update_status_handler(
    app_state: web::Data<AppState>,
    auth_user: AuthenticatedUser,
    order_id: web::Path<Uuid>,
    req_payload: web::Json<StaffStatusRequest>,
) -> Result<HttpResponse> {
    auth_user.require_staff()?;
    let order = app_state
        .orders
        .transition_status(
            order_id.into_inner(),
            auth_user.0.actor(),
            OrderCommand::SetStatus(req_payload.status),
        )
        .await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}
