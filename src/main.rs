use anyhow::anyhow;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use parakeet_server::{AppState, ServerConfig, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    let address = config.address();

    // Load model assets and build application state
    let app_state = AppState::new(config)
        .await
        .map_err(|e| anyhow!("Failed to initialize transcriber: {e}"))?;

    let app: Router = routes::api::create_api_router().with_state(app_state);

    // Create listener
    let listener = TcpListener::bind(&address).await?;

    info!("Server listening on {address}");
    info!("POST /v1/audio/transcriptions - OpenAI-compatible transcription endpoint");
    info!("GET  /v1/models - List available models");

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
