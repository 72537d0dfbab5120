use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::domain::order::OrderError;
use crate::domain::payment::PaymentError;
use crate::gateway::GatewayError;
use crate::store::StoreError;
use crate::utils::IsTransient;

// ============================================================================
// Service-boundary error taxonomy
// ============================================================================
//
// Domain, gateway and storage errors all funnel into `AppError` at the
// service boundary. Handlers return it directly; `ResponseError` turns it
// into a JSON body without leaking internals.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment gateway rejected the request ({status}): {message}")]
    GatewayRejected { status: u16, message: String },

    #[error("Already paid: {0}")]
    AlreadyPaid(String),

    /// Lost an optimistic-concurrency race or hit a uniqueness guard
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence error: {0}")]
    Persistence(StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl AppError {
    /// Stable machine-readable code for response bodies
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::GatewayUnavailable(_) => "gateway_unavailable",
            AppError::GatewayRejected { .. } => "gateway_rejected",
            AppError::AlreadyPaid(_) => "already_paid",
            AppError::Conflict(_) => "conflict",
            AppError::Persistence(_) => "persistence_error",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// User-safe message; server-side failures get a generic text
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(m)
            | AppError::Unauthorized(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::InvalidTransition(m)
            | AppError::AlreadyPaid(m)
            | AppError::Conflict(m) => m.clone(),
            AppError::GatewayUnavailable(_) => {
                "The payment provider is temporarily unreachable. Please try again in a few minutes."
                    .to_string()
            }
            AppError::GatewayRejected { .. } => {
                "The payment provider declined the request. Please check your details and try again."
                    .to_string()
            }
            AppError::Persistence(_) | AppError::Config(_) | AppError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

impl IsTransient for AppError {
    fn is_transient(&self) -> bool {
        matches!(self, AppError::GatewayUnavailable(_) | AppError::Persistence(_))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyPaid(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::GatewayRejected { .. } => StatusCode::BAD_GATEWAY,
            AppError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Persistence(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }

        HttpResponse::build(status).json(json!({
            "error": self.code(),
            "message": self.public_message(),
        }))
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::ItemNotFound(_) => AppError::NotFound(err.to_string()),
            OrderError::InvalidTransition { .. } => AppError::InvalidTransition(err.to_string()),
            _ => AppError::Validation(err.to_string()),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::AlreadyPaid(_) => AppError::AlreadyPaid(err.to_string()),
            PaymentError::OrderCancelled(_) | PaymentError::InvalidTransition { .. } => {
                AppError::InvalidTransition(err.to_string())
            }
            PaymentError::InitializationInProgress(_) => AppError::Conflict(err.to_string()),
            PaymentError::AmountMismatch { .. }
            | PaymentError::MissingTxRef
            | PaymentError::InvalidCurrency(_) => AppError::Validation(err.to_string()),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::MissingField(_) | GatewayError::InvalidAmount(_) => {
                AppError::Validation(err.to_string())
            }
            GatewayError::Unavailable(message) => AppError::GatewayUnavailable(message),
            GatewayError::Rejected { status, message, .. } => {
                AppError::GatewayRejected { status, message }
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(constraint) => {
                AppError::Conflict(format!("duplicate record ({constraint})"))
            }
            other => AppError::Persistence(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}
