//! opswatch daemon
//!
//! ```bash
//! opswatch --port 3001 --watch-config ./settings.json --log-dir ./logs
//! opswatch --config ./opswatch.json
//! ```

use opswatch::{Cli, DashboardServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("opswatch=info".parse()?),
        )
        .init();

    let config = Cli::parse_args().into_config()?;
    let server = DashboardServer::new(config)?;
    let addr = server.start().await?;
    tracing::info!("Connect a WebSocket client to ws://{} to start", addr);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    server.stop().await;
    Ok(())
}
