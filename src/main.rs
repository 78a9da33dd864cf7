use anyhow::Result;
use clap::Parser;
use flux_portrait_gateway::app::App;
use flux_portrait_gateway::models::Config;
use flux_portrait_gateway::server::{router, AppState};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "flux-portrait-gateway")]
#[command(about = "Serve prompt-enhanced Flux LoRA generation and training")]
struct CliArgs {
    /// Address to bind, overriding HOST.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding PORT.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flux_portrait_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let addr = config.bind_addr()?;
    let app = router(AppState::new(App::new(&config)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
