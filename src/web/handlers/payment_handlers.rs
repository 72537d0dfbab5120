use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::payment::{PaymentRequest, TxRef};
use crate::errors::Result;
use crate::state::AppState;
use crate::web::AuthenticatedUser;

#[instrument(
    name = "handler::initialize_payment",
    skip(app_state, auth_user, req_payload),
    fields(user_id = %auth_user.id(), order_id = %req_payload.order_id)
)]
pub async fn initialize_payment_handler(
    app_state: web::Data<AppState>,
    auth_user: AuthenticatedUser,
    req_payload: web::Json<PaymentRequest>,
) -> Result<HttpResponse> {
    let payer = auth_user.0.to_payer();
    let init = app_state
        .payments
        .create_payment(&payer, req_payload.into_inner())
        .await?;

    let mut response = if init.reused {
        HttpResponse::Ok()
    } else {
        HttpResponse::Created()
    };
    Ok(response.json(json!({
        "payment": init.payment,
        "tx_ref": init.payment.tx_ref,
        "checkout_url": init.checkout_url,
        "reused": init.reused,
    })))
}

#[instrument(name = "handler::verify_payment", skip(app_state, auth_user), fields(user_id = %auth_user.id()))]
pub async fn verify_payment_handler(
    app_state: web::Data<AppState>,
    auth_user: AuthenticatedUser,
    tx_ref: web::Path<String>,
) -> Result<HttpResponse> {
    let tx_ref = TxRef::from_stored(tx_ref.into_inner());
    let result = app_state
        .payments
        .verify_for_customer(auth_user.id(), &tx_ref)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

#[instrument(name = "handler::get_payment", skip(app_state, auth_user), fields(user_id = %auth_user.id()))]
pub async fn get_payment_handler(
    app_state: web::Data<AppState>,
    auth_user: AuthenticatedUser,
    payment_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let payment = app_state
        .payments
        .get_payment(auth_user.id(), payment_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(payment))
}

#[instrument(name = "handler::payment_history", skip(app_state, auth_user), fields(user_id = %auth_user.id()))]
pub async fn payment_history_handler(
    app_state: web::Data<AppState>,
    auth_user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let payments = app_state.payments.payment_history(auth_user.id()).await?;
    Ok(HttpResponse::Ok().json(payments))
}
