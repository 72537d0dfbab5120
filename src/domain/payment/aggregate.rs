use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregate::Aggregate;
use super::commands::PaymentCommand;
use super::errors::PaymentError;
use super::events::*;
use super::value_objects::{PaymentMethod, PaymentStatus, TxRef};

// ============================================================================
// Payment Aggregate
// ============================================================================
//
// Terminal statuses are sticky: any command against a completed, failed or
// cancelled payment produces no events. Concurrent settlement paths rely on
// this to stay idempotent.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub tx_ref: TxRef,
    pub gateway_transaction_id: Option<String>,
    pub checkout_url: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new_pending(
        order_id: Uuid,
        customer_id: Uuid,
        amount: Decimal,
        currency: impl Into<String>,
        method: PaymentMethod,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            customer_id,
            amount,
            currency: currency.into(),
            method,
            status: PaymentStatus::Pending,
            tx_ref: TxRef::generate(),
            gateway_transaction_id: None,
            checkout_url: None,
            metadata,
            created_at: now,
            updated_at: now,
            paid_at: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    pub fn is_failed(&self) -> bool {
        self.status == PaymentStatus::Failed
    }

    /// Pending with no checkout URL and older than `max_age`: the
    /// initialization that created it never finished.
    pub fn is_abandoned(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.status == PaymentStatus::Pending
            && self.checkout_url.is_none()
            && now - self.created_at > max_age
    }
}

impl Aggregate for Payment {
    type Event = PaymentEvent;
    type Command = PaymentCommand;
    type Error = PaymentError;

    fn apply_event(&mut self, event: &Self::Event) {
        match event {
            PaymentEvent::CheckoutAttached(e) => {
                self.checkout_url = Some(e.checkout_url.clone());
                self.updated_at = e.at;
            }
            PaymentEvent::Verified(e) => {
                self.status = e.status;
                if let Some(txn_id) = &e.gateway_transaction_id {
                    self.gateway_transaction_id = Some(txn_id.clone());
                }
                if e.status == PaymentStatus::Completed {
                    self.paid_at.get_or_insert(e.at);
                }
                self.updated_at = e.at;
            }
            PaymentEvent::Failed(e) => {
                self.status = PaymentStatus::Failed;
                self.updated_at = e.at;
            }
            PaymentEvent::Cancelled(e) => {
                self.status = PaymentStatus::Cancelled;
                self.updated_at = e.at;
            }
        }
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let now = Utc::now();

        match command {
            PaymentCommand::AttachCheckout { checkout_url } => {
                if self.status.is_terminal() {
                    return Err(PaymentError::InvalidTransition {
                        action: command.name(),
                        status: self.status,
                    });
                }
                Ok(vec![PaymentEvent::CheckoutAttached(CheckoutAttached {
                    checkout_url: checkout_url.clone(),
                    at: now,
                })])
            }

            PaymentCommand::ApplyVerification { status, gateway_transaction_id } => {
                if self.status.is_terminal() {
                    return Ok(vec![]);
                }

                // A "still pending" answer never moves processing back to pending
                let status = match status {
                    PaymentStatus::Pending => self.status,
                    other => *other,
                };
                let new_txn_id = gateway_transaction_id.is_some()
                    && *gateway_transaction_id != self.gateway_transaction_id;

                if status == self.status && !new_txn_id {
                    return Ok(vec![]);
                }

                Ok(vec![PaymentEvent::Verified(PaymentVerified {
                    status,
                    gateway_transaction_id: gateway_transaction_id.clone(),
                    at: now,
                })])
            }

            PaymentCommand::MarkFailed => {
                if self.status.is_terminal() {
                    return Ok(vec![]);
                }
                Ok(vec![PaymentEvent::Failed(PaymentFailed { at: now })])
            }

            PaymentCommand::Cancel => {
                if self.status.is_terminal() {
                    return Ok(vec![]);
                }
                Ok(vec![PaymentEvent::Cancelled(PaymentCancelled { at: now })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Payment {
        Payment::new_pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::new(2550, 2),
            "ETB",
            PaymentMethod::Chapa,
            serde_json::json!({}),
        )
    }

    fn verification(status: PaymentStatus, txn: Option<&str>) -> PaymentCommand {
        PaymentCommand::ApplyVerification {
            status,
            gateway_transaction_id: txn.map(str::to_string),
        }
    }

    #[test]
    fn test_new_payment_is_pending() {
        let payment = pending();
        assert!(payment.is_pending());
        assert!(!payment.is_paid());
        assert!(payment.paid_at.is_none());
        assert!(payment.tx_ref.as_str().starts_with("TX-"));
    }

    #[test]
    fn test_successful_verification_completes_and_stamps_paid_at() {
        let mut payment = pending();
        let events = payment.execute(&verification(PaymentStatus::Completed, Some("CH-1"))).unwrap();
        assert_eq!(events.len(), 1);
        assert!(payment.is_paid());
        assert!(payment.paid_at.is_some());
        assert_eq!(payment.gateway_transaction_id.as_deref(), Some("CH-1"));
    }

    #[test]
    fn test_completed_is_sticky() {
        let mut payment = pending();
        payment.execute(&verification(PaymentStatus::Completed, Some("CH-1"))).unwrap();
        let snapshot = payment.clone();

        assert!(payment.execute(&PaymentCommand::MarkFailed).unwrap().is_empty());
        assert!(payment.execute(&PaymentCommand::Cancel).unwrap().is_empty());
        assert!(payment
            .execute(&verification(PaymentStatus::Pending, Some("CH-2")))
            .unwrap()
            .is_empty());
        assert!(payment
            .execute(&verification(PaymentStatus::Completed, Some("CH-1")))
            .unwrap()
            .is_empty());
        assert_eq!(payment, snapshot);
    }

    #[test]
    fn test_pending_verification_without_news_is_a_no_op() {
        let payment = pending();
        let events = payment.handle_command(&verification(PaymentStatus::Pending, None)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_pending_verification_does_not_regress_processing() {
        let mut payment = pending();
        payment.status = PaymentStatus::Processing;
        payment.execute(&verification(PaymentStatus::Pending, Some("CH-9"))).unwrap();
        assert_eq!(payment.status, PaymentStatus::Processing);
        assert_eq!(payment.gateway_transaction_id.as_deref(), Some("CH-9"));
    }

    #[test]
    fn test_mark_failed_from_pending() {
        let mut payment = pending();
        payment.execute(&PaymentCommand::MarkFailed).unwrap();
        assert!(payment.is_failed());
        assert!(payment.paid_at.is_none());
    }

    #[test]
    fn test_attach_checkout_rejected_when_terminal() {
        let mut payment = pending();
        payment.execute(&PaymentCommand::Cancel).unwrap();
        let err = payment
            .execute(&PaymentCommand::AttachCheckout { checkout_url: "https://pay".into() })
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidTransition { status: PaymentStatus::Cancelled, .. }));
    }

    #[test]
    fn test_abandoned_detection() {
        let mut payment = pending();
        let max_age = chrono::Duration::seconds(60);
        assert!(!payment.is_abandoned(Utc::now(), max_age));

        payment.created_at = Utc::now() - chrono::Duration::seconds(120);
        assert!(payment.is_abandoned(Utc::now(), max_age));

        payment.checkout_url = Some("https://checkout".into());
        assert!(!payment.is_abandoned(Utc::now(), max_age));
    }
}
