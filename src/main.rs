use bedrock_gateway::{build_router, AppState, GatewayConfig, KeyStore, SharedLogger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "bedrock-gateway",
    about = "Anthropic-compatible API gateway for AWS Bedrock",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// AWS region for the Bedrock Runtime endpoint (overrides config)
    #[arg(long)]
    region: Option<String>,

    /// Request log file path
    #[arg(long, default_value = "bedrock-gateway.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bedrock_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = GatewayConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(region) = cli.region {
        config.backend.region = region;
    }

    // Validate credentials eagerly so misconfiguration fails at startup,
    // not on the first request.
    let _credential = config.resolve_credential()?;
    let admin_key = config.resolve_admin_key().unwrap_or_else(|e| {
        tracing::warn!("{e}; key management endpoints disabled");
        String::new()
    });

    let models = config.model_table();
    let keys = KeyStore::load(&config.auth.keys_file)?;
    let logger = SharedLogger::new(&cli.log_file)?;

    info!("bedrock-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("  Endpoint:  {}", config.effective_base_url());
    info!("  Port:      {}", config.port);
    info!("  Default:   {}", models.default_id());
    info!("  Keys:      {} issued", keys.list().len());
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting bedrock-gateway endpoint={} port={}",
            config.effective_base_url(),
            config.port
        ),
    );

    // No request timeout: the streaming call stays open for as long as
    // the backend keeps producing chunks.
    let client = reqwest::Client::builder().build()?;

    let port = config.port;
    let state = Arc::new(AppState {
        config,
        models,
        client,
        keys,
        admin_key,
        logger,
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
