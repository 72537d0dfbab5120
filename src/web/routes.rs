use actix_web::web;

use crate::errors::AppError;
use crate::web::handlers::{order_handlers, payment_handlers, webhook_handlers};

/// Called from `main.rs` (and tests) to mount the REST surface
pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
    // Malformed input gets the same JSON error body as every other failure
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::NotFound(err.to_string()).into()),
    );

    cfg.service(
        web::scope("/api")
            // Customer order routes
            .service(
                web::scope("/orders")
                    .route("/", web::post().to(order_handlers::create_order_handler))
                    .route("/", web::get().to(order_handlers::list_orders_handler))
                    .route("/{order_id}/", web::get().to(order_handlers::get_order_handler))
                    .route(
                        "/{order_id}/status/",
                        web::post().to(order_handlers::customer_action_handler),
                    ),
            )
            // Staff order routes
            .service(
                web::scope("/cafe/orders")
                    .route("/", web::get().to(order_handlers::staff_list_orders_handler))
                    .route(
                        "/{order_id}/",
                        web::patch().to(order_handlers::staff_update_status_handler),
                    ),
            )
            // Payment routes; literal segments are registered before `{payment_id}`
            .service(
                web::scope("/payments")
                    .route(
                        "/initialize/",
                        web::post().to(payment_handlers::initialize_payment_handler),
                    )
                    .route(
                        "/verify/{tx_ref}/",
                        web::get().to(payment_handlers::verify_payment_handler),
                    )
                    .route("/history/", web::get().to(payment_handlers::payment_history_handler))
                    .route("/webhook/", web::post().to(webhook_handlers::payment_webhook_handler))
                    .route("/{payment_id}/", web::get().to(payment_handlers::get_payment_handler)),
            ),
    );
}
