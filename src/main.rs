use anyhow::Context;
use clap::Parser;
use search_service::SearchPipeline;
use std::path::PathBuf;
use threadscout_core::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

const DEFAULT_LOG_FILTER: &str =
    "threadscout=info,reddit_client=info,llm_interface=info,embedding_engine=info,search_service=info,web_api=info,tower_http=info";

#[derive(Debug, Parser)]
#[command(name = "threadscout", about = "Reddit search and summarization server")]
struct Cli {
    /// Host to bind the server to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the server to
    #[arg(long)]
    port: Option<u16>,

    /// Listen on all interfaces
    #[arg(long)]
    public: bool,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Command-line flags win over the configured address.
    fn bind_addr(&self, configured: &str) -> String {
        let (configured_host, configured_port) = configured
            .rsplit_once(':')
            .unwrap_or((configured, "8000"));

        let host = if self.public {
            "0.0.0.0".to_string()
        } else {
            self.host
                .clone()
                .unwrap_or_else(|| configured_host.to_string())
        };
        let port = self
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| configured_port.to_string());
        format!("{}:{}", host, port)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    if cli.public {
        tracing::warn!("Running in public mode. The API will be accessible to anyone on your network.");
        tracing::warn!("Consider a reverse proxy with authentication for production use.");
    }

    let pipeline = SearchPipeline::from_config(&config).context("failed to build search pipeline")?;
    let app = router(AppState::new(pipeline));

    let bind_addr = cli.bind_addr(&config.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Starting threadscout on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("threadscout").chain(args.iter().copied()))
    }

    #[test]
    fn test_bind_addr_defaults_to_config() {
        assert_eq!(cli(&[]).bind_addr("127.0.0.1:8000"), "127.0.0.1:8000");
    }

    #[test]
    fn test_bind_addr_flags() {
        assert_eq!(
            cli(&["--host", "10.0.0.2", "--port", "9000"]).bind_addr("127.0.0.1:8000"),
            "10.0.0.2:9000"
        );
        assert_eq!(
            cli(&["--public", "--host", "10.0.0.2"]).bind_addr("127.0.0.1:8000"),
            "0.0.0.0:8000"
        );
    }
}
