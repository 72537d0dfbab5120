use rust_decimal::Decimal;

use crate::utils::IsTransient;

// ============================================================================
// Gateway Errors
// ============================================================================

/// Why the provider turned a request down, derived from its HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Server,
    /// 200 response whose body reports a failure
    Declined,
    Unexpected,
}

impl RejectionReason {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => RejectionReason::BadRequest,
            401 => RejectionReason::Unauthorized,
            403 => RejectionReason::Forbidden,
            404 => RejectionReason::NotFound,
            422 => RejectionReason::Validation,
            429 => RejectionReason::RateLimited,
            s if s >= 500 => RejectionReason::Server,
            _ => RejectionReason::Unexpected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::BadRequest => "bad_request",
            RejectionReason::Unauthorized => "unauthorized",
            RejectionReason::Forbidden => "forbidden",
            RejectionReason::NotFound => "not_found",
            RejectionReason::Validation => "validation",
            RejectionReason::RateLimited => "rate_limited",
            RejectionReason::Server => "server_error",
            RejectionReason::Declined => "declined",
            RejectionReason::Unexpected => "unexpected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Rejected locally, no request was sent
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    /// Timeout, connection failure or an unparseable response body
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Payment gateway rejected the request ({status}): {message}")]
    Rejected {
        status: u16,
        reason: RejectionReason,
        message: String,
    },
}

impl GatewayError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        GatewayError::Rejected {
            status,
            reason: RejectionReason::from_status(status),
            message: message.into(),
        }
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::MissingField(_) | GatewayError::InvalidAmount(_) => "invalid_request",
            GatewayError::Unavailable(_) => "unavailable",
            GatewayError::Rejected { reason, .. } => reason.as_str(),
        }
    }
}

impl IsTransient for GatewayError {
    fn is_transient(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) => true,
            GatewayError::Rejected { reason, .. } => {
                matches!(reason, RejectionReason::RateLimited | RejectionReason::Server)
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Unavailable(format!("request timed out: {err}"))
        } else if err.is_connect() {
            GatewayError::Unavailable(format!("connection failed: {err}"))
        } else if err.is_decode() {
            GatewayError::Unavailable(format!("invalid response format: {err}"))
        } else {
            GatewayError::Unavailable(format!("request failed: {err}"))
        }
    }
}
