use anyhow::Context;
use qr_core::config::RouterConfig;
use qr_server::{app_with_state, build_router, state::AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RouterConfig::from_env().context("loading router config")?;
    let router = build_router(&config).context("building router")?;
    let app = app_with_state(AppState::new(router));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        addr = %addr,
        tiers = config.tiers.len(),
        remote = config.server.remote_endpoint.as_deref().unwrap_or("none"),
        "qr-server listening"
    );
    axum::serve(listener, app).await.context("serving http")?;
    Ok(())
}
