use syncbeat_server::{BeatServer, ServerConfig};

#[tokio::main]
async fn main() -> syncbeat_server::Result<()> {
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!("Loading config from {}", path);
            ServerConfig::load(path)?
        }
        None => ServerConfig::default(),
    };

    let server = BeatServer::bind(config).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}
