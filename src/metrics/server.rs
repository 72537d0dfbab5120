use actix::Addr;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};

use crate::actors::{GetSystemHealth, HealthMonitorActor};

const SERVICE_NAME: &str = "food-delivery";

/// Start the metrics HTTP server (`/metrics` and `/health`)
pub async fn start_metrics_server(
    registry: Registry,
    port: u16,
    health_monitor: Addr<HealthMonitorActor>,
) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(health_monitor.clone()))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(registry: web::Data<Registry>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(health_monitor: web::Data<Addr<HealthMonitorActor>>) -> impl Responder {
    match health_monitor.send(GetSystemHealth).await {
        Ok(health) => {
            let mut response = if health.overall_status.is_unhealthy() {
                HttpResponse::ServiceUnavailable()
            } else {
                HttpResponse::Ok()
            };
            response.json(serde_json::json!({
                "service": SERVICE_NAME,
                "health": health,
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "Health monitor unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "service": SERVICE_NAME,
                "status": "unknown",
            }))
        }
    }
}
