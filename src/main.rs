use chat_bridge::config::config_search_paths;
use chat_bridge::providers::ProviderPreset;
use chat_bridge::{build_router, AppState, BridgeConfig, RemoteClient, SharedJournal};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chat-bridge",
    about = "Serve the native chat API on top of any OpenAI-compatible provider",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Provider preset name (overrides config)
    #[arg(long)]
    provider: Option<String>,

    /// Call journal file (JSONL)
    #[arg(long, default_value = "chat-bridge-calls.jsonl")]
    journal_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_bridge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = BridgeConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ref provider) = cli.provider {
        config.remote.name = provider.clone();
        if let Some(preset) = ProviderPreset::from_name(provider) {
            config.remote.base_url = Some(preset.base_url.to_string());
            config.remote.api_key_env = preset.default_api_key_env.map(str::to_string);
            config.remote.protocol = Some(preset.protocol);
        }
    }

    // Validate config eagerly
    let base_url = config.effective_base_url()?;
    let api_key = config.resolve_api_key()?;

    let journal = SharedJournal::new(&cli.journal_file)?;

    info!("chat-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("  Provider:  {}", config.remote.name);
    info!("  Base URL:  {}", base_url);
    info!("  Protocol:  {}", config.protocol());
    info!("  Auth:      {}", if api_key.is_empty() { "none" } else { "bearer" });
    info!("  Port:      {}", config.port);
    info!("  Models:    {} mapped", config.models.len());
    info!("  Journal:   {}", cli.journal_file.display());

    let state = Arc::new(AppState {
        config: config.clone(),
        client: RemoteClient::new()?,
        journal,
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  Point native clients at it, e.g. OLLAMA_HOST=http://localhost:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
