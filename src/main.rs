use alignment_interpreter::{api, AppState, VersionRegistry};
use anyhow::{Context, Result};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Alignment interpretation and diagnostics service")]
struct Args {
    /// Port to run the web server on
    #[arg(short, long, env = "PORT", default_value = "3001")]
    port: u16,

    /// Threshold version registry file
    #[arg(short, long, env = "THRESHOLD_REGISTRY", default_value = "thresholds.json")]
    registry: PathBuf,

    /// Keep version changes in memory only
    #[arg(long)]
    no_persist: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("alignment_interpreter=info".parse()?)
                .add_directive("alignment_server=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("Starting alignment interpretation server");
    info!("Port: {}", args.port);
    info!("Version registry: {:?}", args.registry);

    let registry = VersionRegistry::load(&args.registry)
        .with_context(|| format!("Failed to load version registry {:?}", args.registry))?;
    match registry.active() {
        Some(v) => info!("Active threshold version: {} ({})", v.id, v.name),
        None => info!("No active threshold version, using defaults"),
    }

    let registry_path = (!args.no_persist).then_some(args.registry);
    let state = Arc::new(AppState::new(registry, registry_path));

    let app = api::router(state).layer(CorsLayer::new().allow_origin(Any).allow_headers(Any));

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
