#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod api;
mod config;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use api::state::{AgentFactory, AppContext};
use config::AppConfig;
use registry::AgentRegistry;

#[derive(Debug, Parser)]
#[command(name = "deepresearch-server", version, about = "Deep research agent HTTP API")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "DEEPRESEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,deepresearch_server=debug,deepresearch_ai=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    tracing::info!("Starting DeepResearch server");

    let factory = AgentFactory::from_config(&config).await?;
    let registry = AgentRegistry::new().with_retention(config.agent_retention());
    let app = api::router(Arc::new(AppContext::new(registry, factory)));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!("DeepResearch API running on http://{addr}");

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")
}
