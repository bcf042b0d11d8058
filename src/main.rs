use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use visaplex_gateway::config::RuntimeConfig;
use visaplex_gateway::{Config, Gateway, http::start_http_server, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // .env first, so a RUST_LOG kept there reaches the filter
    Config::load_env_file();
    init_tracing(&RuntimeConfig::load_from_env().log_level);

    let config = Config::load()?;
    info!(
        "Starting VisaPlex gateway (policy {}, topic {})",
        config.policy.version, config.policy.default_topic
    );

    let gateway = Arc::new(Gateway::from_config(&config)?);
    start_http_server(&config, gateway).await?;

    Ok(())
}
