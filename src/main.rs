use anyhow::Context;
use axum::http::HeaderValue;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use casevault::blob::{self, BlobClient};
use casevault::persistence;
use casevault::service::{AppContext, router};
use casevault::settings::Settings;

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return Ok(cors.allow_origin(Any));
    }
    let origins = origins
        .iter()
        .map(|o| o.parse().with_context(|| format!("Invalid CORS origin `{o}`")))
        .collect::<anyhow::Result<Vec<HeaderValue>>>()?;
    Ok(cors.allow_origin(AllowOrigin::list(origins)))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {err}");
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load()?;

    let records = persistence::connect(&settings.database).await?;
    records
        .ping()
        .await
        .context("Record store is not reachable")?;

    let blob_store = blob::connect(&settings.blob_store).await?;
    let blobs = BlobClient::new(blob_store, &settings.blob_store);
    blobs.ping().await.context("Blob store is not reachable")?;

    let address = settings.server.address.clone();
    let cors = cors_layer(&settings.server.cors_origins)?;
    let app = router(AppContext::new(settings, records, blobs))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("casevault listening on {address}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
