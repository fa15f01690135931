use anyhow::Context as _;
use chatrelay_server::{AppState, config, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init();
    chatrelay_core::observability::init_observability();

    let server_config = config::ServerConfig::from_env()?;
    let relay = server_config.build_relay()?;
    let app = router(AppState { relay });

    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind_addr))?;
    tracing::info!(addr = %server_config.bind_addr, "chatrelay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
