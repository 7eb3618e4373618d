use tracing::info;
use tracing_subscriber::EnvFilter;
use tutor_server::{AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::load()?;
    let state = AppState::from_config(config)?;
    state.workspace().ensure().await?;

    let address = state.config().bind;
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(%address, data_dir = %state.config().data_dir.display(), "tutor server listening");
    axum::serve(listener, tutor_server::app(state)).await?;
    Ok(())
}
