use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::{json, Map, Value};
use tracing::{instrument, warn};

use crate::errors::{AppError, Result};
use crate::state::AppState;

/// Header map as JSON, for the audit record
fn headers_json(req: &HttpRequest) -> Value {
    let headers: Map<String, Value> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), Value::String(value.to_string())))
        })
        .collect();
    Value::Object(headers)
}

/// Unauthenticated: nothing in the payload is trusted until re-verified
#[instrument(
    name = "handler::payment_webhook",
    skip(app_state, req, body),
    fields(payload_bytes = body.len())
)]
pub async fn payment_webhook_handler(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let payload = serde_json::from_slice::<Value>(&body)
        .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&body) }));

    match app_state.payments.handle_webhook(payload, headers_json(&req)).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(json!({
            "received": true,
            "processed": true,
            "event": outcome.event_type,
            "payment_status": outcome.payment_status,
        }))),
        // Redelivery cannot fix these; acknowledge so the provider stops retrying
        Err(e @ (AppError::NotFound(_) | AppError::Validation(_) | AppError::InvalidTransition(_))) => {
            warn!(error = %e, "Webhook acknowledged without processing");
            Ok(HttpResponse::Ok().json(json!({
                "received": true,
                "processed": false,
                "error": e.to_string(),
            })))
        }
        Err(e) => Err(e),
    }
}
