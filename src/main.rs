use anyhow::Result;
use std::path::Path;
use tokio::sync::watch;
use tracing::info;

use ws_tunnel::config::load_config;
use ws_tunnel::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config(Path::new("config.toml"))?;
    info!(
        listen_ip = %config.listen.ip,
        listen_port = config.listen.port,
        default_host = %config.tunnel.default_host,
        secret_configured = !config.tunnel.secret.is_empty(),
        "Configuration loaded"
    );

    let server = Server::bind(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    server.run(shutdown_rx).await
}
