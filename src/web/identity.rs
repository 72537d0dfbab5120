use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use crate::domain::customer::{Customer, Role};
use crate::errors::AppError;

// Identity is established by the upstream auth layer and forwarded as headers.
pub const USER_ID: &str = "X-User-Id";
pub const USER_EMAIL: &str = "X-User-Email";
pub const USER_USERNAME: &str = "X-User-Username";
pub const USER_FIRST_NAME: &str = "X-User-First-Name";
pub const USER_LAST_NAME: &str = "X-User-Last-Name";
pub const USER_PHONE: &str = "X-User-Phone";
pub const USER_ROLE: &str = "X-User-Role";

/// The caller, as forwarded by the auth layer
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Customer);

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    /// Staff-only endpoints call this first
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.0.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Staff access required".into()))
        }
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn from_headers(headers: &HeaderMap) -> Result<Customer, AppError> {
    let id = header(headers, USER_ID)
        .and_then(|raw| Uuid::parse_str(&raw).ok())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing or invalid {USER_ID} header")))?;

    let role = match header(headers, USER_ROLE) {
        Some(raw) => raw.parse::<Role>().map_err(AppError::Unauthorized)?,
        None => Role::Customer,
    };

    Ok(Customer {
        id,
        email: header(headers, USER_EMAIL).unwrap_or_default(),
        username: header(headers, USER_USERNAME).unwrap_or_default(),
        first_name: header(headers, USER_FIRST_NAME).unwrap_or_default(),
        last_name: header(headers, USER_LAST_NAME).unwrap_or_default(),
        phone_number: header(headers, USER_PHONE),
        role,
    })
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = from_headers(req.headers()).map(AuthenticatedUser);
        if let Err(e) = &result {
            tracing::debug!(error = %e, path = %req.path(), "Rejected unauthenticated request");
        }
        ready(result)
    }
}
