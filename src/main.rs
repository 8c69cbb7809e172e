use anyhow::{Context, Result};
use clap::Parser;
use database::Database;
use llm_interface::OpenAiProvider;
use monitor_service::{MonitorController, MonitorService, MonitorSettings};
use reddit_client::RedditClient;
use replybot_core::AppConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "replybot=info,monitor_service=info,reddit_client=info,web=info";

/// Watches a subreddit for keyword matches and answers them with generated replies.
#[derive(Parser, Debug)]
#[command(name = "replybot")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Override database URL from config
    #[arg(long, value_name = "URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    config.validate().context("validating configuration")?;

    tracing::info!("Starting replybot {}", env!("CARGO_PKG_VERSION"));

    let database = Database::connect(&config.database.url).await?;
    database.run_migrations().await?;
    let database = Arc::new(database);

    let reddit = RedditClient::from_config(&config.reddit)?;
    let openai = OpenAiProvider::from_config(&config.openai)?;
    tracing::info!("Using model {}", openai.model());

    let controller = MonitorController::new(
        Arc::new(reddit),
        Arc::new(openai),
        database.clone(),
        MonitorSettings::from(&config.monitor),
    );
    let service = Arc::new(MonitorService::new(Arc::new(controller)));

    let app = web::router(service.clone(), config.server.static_dir.as_deref());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("parsing listen address")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    service.shutdown().await;
    database.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
