use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use marketplace_orders::api::{self, AppState};
use marketplace_orders::config::AppConfig;
use marketplace_orders::metrics::{self, Metrics};
use marketplace_orders::store::{InMemoryStore, PgStore, Store};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,marketplace_orders=debug"))
        )
        .init();

    tracing::info!("🚀 Starting marketplace order service");

    let config = AppConfig::from_env()?;

    // === 1. Storage backend ===
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL...");
            let store = PgStore::connect(url, config.max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store (data is lost on exit)");
            let store = InMemoryStore::new();
            if config.seed_demo_data {
                let demo = store.seed_demo().await;
                tracing::info!(
                    consumer = %demo.consumer.id,
                    seller = %demo.seller.id,
                    admin = %demo.admin.id,
                    address = %demo.address.id,
                    payment_method = %demo.payment_method.id,
                    "🌱 Demo data loaded; send one of these ids as X-User-Id"
                );
                for product in &demo.products {
                    tracing::info!(product_id = %product.id, name = %product.name, stock = product.stock, "Demo product");
                }
            }
            Arc::new(store)
        }
    };

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. HTTP server ===
    let state = web::Data::new(AppState::new(store, metrics.clone()));
    let metrics_data = web::Data::from(metrics);

    tracing::info!("🌐 Listening on http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(metrics_data.clone())
            .configure(api::configure)
            .configure(metrics::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    tracing::info!("👋 Server stopped");

    Ok(())
}
