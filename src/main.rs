//! Flower shop point of sale and storefront API

use anyhow::Result;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use flower_shop::api::{router, AppState};
use flower_shop::config::AppConfig;
use flower_shop::feed::HistoryFeed;
use flower_shop::publisher::EventPublisher;
use flower_shop::store::{MemoryStore, PgStore, ShopStore};
use flower_shop::{telemetry, ShopService};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let store: Arc<dyn ShopStore> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, 10).await?;
            pg.migrate().await?;
            tracing::info!("using postgres store");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::default())
        }
    };
    let publisher = match &config.nats_url {
        Some(url) => EventPublisher::connect(url).await,
        None => EventPublisher::disabled(),
    };

    let rules = config.shop.tier_rules()?;
    let service = ShopService::new(store, config.shop.clone(), rules, publisher, HistoryFeed::default());
    let app = router(AppState { service: Arc::new(service) })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.server.socket_addr()?;
    tracing::info!("🌸 Flower shop listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
