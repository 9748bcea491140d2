use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs when SIMPLECM_LOG_JSON=1, human-readable otherwise
    let json_logs = std::env::var("SIMPLECM_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("simplecm_server=info".parse()?)
        .add_directive("simplecm=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let config = simplecm_server::config::ServerConfig::parse();
    tracing::info!("Starting simplecm control server on {}", config.listen_addr);

    let server = simplecm_server::server::Server::new(config);
    server.run().await
}
