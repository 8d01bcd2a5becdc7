use mock_server::{app_with, Settings, DEFAULT_SECRET, DEFAULT_TOKEN_TTL_SECS};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let settings = Settings {
        jwt_secret: std::env::var("MOCK_JWT_SECRET").unwrap_or_else(|_| DEFAULT_SECRET.to_string()),
        token_ttl_secs: std::env::var("MOCK_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS),
    };

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app_with(settings)).await?;
    Ok(())
}
