use actix::prelude::*;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use food_delivery::actors::{CoordinatorActor, HealthMonitorActor, Shutdown};
use food_delivery::catalog::PgCatalog;
use food_delivery::config::AppConfig;
use food_delivery::domain::order::OrderService;
use food_delivery::domain::payment::PaymentService;
use food_delivery::gateway::{ChapaClient, MonitoredGateway};
use food_delivery::metrics::{self, Metrics};
use food_delivery::state::AppState;
use food_delivery::store::PgStore;
use food_delivery::{db, web::configure_app_routes};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,food_delivery=debug")),
        )
        .init();

    tracing::info!("🚀 Starting food delivery service");

    // === 1. Configuration ===
    let config = AppConfig::from_env()?;
    tracing::debug!(?config, "Loaded configuration");

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Database ===
    let pool = db::connect(&config.database_url, config.database_max_connections, &metrics).await?;
    db::ensure_schema(&pool).await?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let catalog = Arc::new(PgCatalog::new(pool.clone()));

    // === 4. Health monitor ===
    let health_monitor = HealthMonitorActor::new(metrics.clone())
        .with_database(pool)
        .start();

    // === 5. Payment gateway ===
    let chapa = Arc::new(ChapaClient::new(config.chapa())?.with_metrics(metrics.clone()));
    let gateway = Arc::new(MonitoredGateway::new(chapa, health_monitor.clone()));

    // === 6. Services ===
    let orders = Arc::new(OrderService::new(store.clone(), catalog, metrics.clone()));
    let payments = Arc::new(PaymentService::new(
        store.clone(),
        store.clone(),
        store,
        gateway,
        metrics.clone(),
        config.payment_settings(),
    ));

    // === 7. Background actors ===
    let coordinator = CoordinatorActor::new(
        payments.clone(),
        config.sweep_policy(),
        config.sweep_interval,
        health_monitor.clone(),
    )
    .start();

    // === 8. HTTP servers ===
    let app_state = AppState { orders, payments };
    tracing::info!(
        "🌐 Starting API server on http://{}:{}",
        config.server_host,
        config.server_port
    );
    let api_server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(app_state.clone()))
            .configure(configure_app_routes)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run();

    let metrics_server = metrics::start_metrics_server(
        metrics.registry().clone(),
        config.metrics_port,
        health_monitor,
    );

    let result = futures_util::future::try_join(api_server, metrics_server).await;

    tracing::info!("🛑 HTTP servers stopped, shutting down background actors");
    if let Err(e) = coordinator.send(Shutdown).await {
        tracing::warn!(error = %e, "Coordinator already stopped");
    }

    result?;
    Ok(())
}
