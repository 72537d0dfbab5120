use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::value_objects::TxRef;

// ============================================================================
// Payment Webhook Record - audit row for every inbound notification
// ============================================================================

pub const EVENT_CHARGE_SUCCESS: &str = "charge.success";
pub const EVENT_CHARGE_FAILURE: &str = "charge.failure";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub headers: Value,
    pub is_verified: bool,
    pub payment_id: Option<Uuid>,
    pub verification_error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookRecord {
    /// Capture a notification as received. NUL characters are dropped since
    /// Postgres cannot store them in text or JSONB.
    pub fn received(payload: Value, headers: Value) -> Self {
        let payload = strip_nul(payload);
        let headers = strip_nul(headers);
        let event_type = payload
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            id: Uuid::new_v4(),
            event_type,
            payload,
            headers,
            is_verified: false,
            payment_id: None,
            verification_error: None,
            received_at: Utc::now(),
            processed_at: None,
        }
    }

    /// `data.tx_ref`, when present and non-empty
    pub fn tx_ref(&self) -> Option<TxRef> {
        self.payload
            .get("data")
            .and_then(|data| data.get("tx_ref"))
            .and_then(Value::as_str)
            .filter(|tx_ref| !tx_ref.is_empty())
            .map(TxRef::from_stored)
    }
}

fn strip_nul(value: Value) -> Value {
    fn clean(s: String) -> String {
        if s.contains('\0') {
            s.replace('\0', "")
        } else {
            s
        }
    }

    match value {
        Value::String(s) => Value::String(clean(s)),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nul).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (clean(key), strip_nul(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Mutation applied to a stored record once processing has an outcome
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookUpdate {
    Linked { payment_id: Uuid },
    Processed { at: DateTime<Utc> },
    Failed { error: String },
}
