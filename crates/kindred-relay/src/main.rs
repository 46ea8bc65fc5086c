use std::net::SocketAddr;

use tracing::info;

use kindred_relay::Rooms;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kindred_relay=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let host = std::env::var("KINDRED_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("KINDRED_RELAY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let app = kindred_relay::router(Rooms::new());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Kindred relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
