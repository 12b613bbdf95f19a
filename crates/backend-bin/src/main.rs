use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use backend_lib::{config::Settings, ws_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize configuration
    let settings = Settings::load()?;
    let bind_addr = settings.bind_addr;

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    // Create application state
    let state = Arc::new(AppState::new(settings));

    // Create the signaling router
    let app = ws_router::create_router(state);

    // Start the server
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
