mod settings;
mod transport;
mod verifier;

use std::sync::Arc;

use anyhow::Context;
use settings::Settings;
use source_fetcher::SourceFetcher;
use transport::HttpSourceTransport;
use verifier::HttpDownstreamVerifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::load().context("failed to read config")?;
    tracing::info!(chains = settings.chains.len(), "starting contract-watch");

    let transport = HttpSourceTransport::new("https://ipfs.io/ipfs", "https://gateway.ethswarm.org/bzz");
    let fetcher = SourceFetcher::new(Arc::new(transport));
    let verifier: Arc<dyn chain_monitor::DownstreamVerifier> =
        Arc::new(HttpDownstreamVerifier::new(settings.downstream_verifier_url.clone()));

    let supervisor = monitor_supervisor::MonitorSupervisor::start(
        settings.chains,
        settings.pacing,
        verifier,
        fetcher,
    )
    .await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received, stopping chain monitors");
    supervisor.stop();
    supervisor
        .await_stopped(std::time::Duration::from_secs(10))
        .await;

    Ok(())
}
