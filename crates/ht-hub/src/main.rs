//! ht-hub: broadcast hub binary

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ht_hub::{HubArgs, HubServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = HubArgs::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ht-hub");

    let config = ServerConfig::load(&args)?;
    let server = HubServer::new(config);
    let listener = server.bind().await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = server.run(listener, shutdown).await {
        error!("Hub error: {}", e);
        return Err(e.into());
    }

    info!("ht-hub stopped");
    Ok(())
}
