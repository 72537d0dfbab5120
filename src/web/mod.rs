// ============================================================================
// REST surface
// ============================================================================
//
// Handlers are thin: extract identity and input, call a service, shape the
// response. Every failure is an `AppError`, rendered by its `ResponseError`
// impl.
//
// ============================================================================

pub mod handlers;
pub mod identity;
pub mod routes;

pub use identity::AuthenticatedUser;
pub use routes::configure_app_routes;
