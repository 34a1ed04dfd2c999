use std::sync::Arc;

use anyhow::anyhow;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

mod analysis;
mod catalog;
mod config;
mod db;
mod error;
mod handlers;
mod llm;
mod prompts;
mod router;
mod state;
mod utils;

use config::{ImageProvider, CONFIG};
use db::database::Database;
use llm::{AdviceModel, GeminiClient, GeminiImageClient, ImageGenerator, ReplicateClient};
use router::build_router;
use state::{AppState, RequestSettings};
use utils::logging::{init_logging, LogSettings};

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging(&LogSettings::from_config(&CONFIG));

    let missing = CONFIG.missing_required_keys();
    if !missing.is_empty() {
        return Err(anyhow!(
            "Missing required configuration: {}",
            missing.join(", ")
        ));
    }

    info!("Starting StyleSynth backend");

    let db = Database::init(&CONFIG.database_url).await?;

    let advice: Arc<dyn AdviceModel> = Arc::new(GeminiClient::from_config(&CONFIG));
    let images: Arc<dyn ImageGenerator> = match CONFIG.image_provider {
        ImageProvider::Replicate => Arc::new(ReplicateClient::from_config(&CONFIG)),
        ImageProvider::Gemini => Arc::new(GeminiImageClient::from_config(&CONFIG)),
    };
    info!(
        "Advice model: {}, image provider: {} ({})",
        advice.name(),
        CONFIG.image_provider.as_str(),
        images.name()
    );

    let state = AppState::new(
        db.clone(),
        advice,
        images,
        RequestSettings::from_config(&CONFIG),
    );

    let static_dir = if CONFIG.static_dir.is_dir() {
        Some(CONFIG.static_dir.clone())
    } else {
        warn!(
            "Static directory {} not found, frontend will not be served",
            CONFIG.static_dir.display()
        );
        None
    };
    let app = build_router(state, static_dir);

    let listener = TcpListener::bind(CONFIG.bind_address).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("StyleSynth backend stopped");
    Ok(())
}
