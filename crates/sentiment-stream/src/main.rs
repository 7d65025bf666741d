//! Sentiment stream client - Entry Point

use anyhow::Result;
use clap::Parser;
use sentiment_stream::{AppConfig, Application};
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Resilient client for the real-time sentiment event stream
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SENTIMENT_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the stream URL from the config file
    #[arg(short, long)]
    url: Option<String>,

    /// Ask the server to start its simulation once connected
    #[arg(long)]
    start_simulation: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // CLI arg > SENTIMENT_CONFIG env var > bundled default (if present)
    let explicit_path = args
        .config
        .clone()
        .or_else(|| std::env::var("SENTIMENT_CONFIG").ok());

    let mut config = match &explicit_path {
        Some(path) => AppConfig::from_file(path)?,
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            AppConfig::from_file(DEFAULT_CONFIG_PATH)?
        }
        None => AppConfig::default(),
    };

    if let Some(url) = args.url {
        config.client.url = url;
    }
    config.start_simulation |= args.start_simulation;

    sentiment_telemetry::init_logging_with(
        Some(&config.logging.filter),
        config.logging.format.as_json_flag(),
    )?;

    info!("Starting sentiment-stream v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = explicit_path.as_deref().unwrap_or(DEFAULT_CONFIG_PATH),
        url = %config.client.url,
        start_simulation = config.start_simulation,
        "Configuration loaded"
    );

    let app = Application::new(config)?;
    app.run().await?;

    Ok(())
}
