use klodd::{config::ControllerConfig, telemetry, Klodd};
use kube::Client;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    info!("Starting klodd");
    let config = ControllerConfig::load()?;
    info!(domain = %config.challenge_domain, "Configuration loaded");
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let klodd = Klodd::start(config, client).await;
    info!("Ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    klodd.shutdown();

    Ok(())
}
