use pushti::{AiClient, AppState, Config, FileBackend, KvStore, ProfileStore, router};
use std::net::SocketAddr;
use tokio::fs;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env()?;
    fs::create_dir_all(&config.data_path).await?;

    let store = KvStore::new(FileBackend::open(config.data_path.clone())?);
    let profiles = ProfileStore::open(store);
    info!(
        profiles = profiles.profiles().len(),
        data_path = %config.data_path.display(),
        "profile store loaded"
    );

    let ai = AiClient::new(
        config.ai_gateway_url.clone(),
        config.ai_api_key.clone(),
        config.ai_timeout,
    )?;
    let app = router(AppState::new(profiles, ai, config.locale));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
