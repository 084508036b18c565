use std::net::SocketAddr;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chorus::api::{create_router, AppState};
use chorus::config::Config;
use chorus::providers::build_adapters;

#[derive(Parser)]
#[command(name = "chorus")]
#[command(about = "Send one prompt to several LLM providers and collect every answer")]
struct Args {
    /// Bind address, overrides CHORUS_HOST
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides CHORUS_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "chorus=info,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!(
        environment = ?config.server.environment,
        timeout_ms = config.chat.timeout_ms,
        "Loaded configuration"
    );

    let adapters = build_adapters(&config.providers, &config.chat)?;
    if adapters.is_empty() {
        tracing::warn!(
            "No provider API keys configured - /api/chat will fail until OPENAI_API_KEY, GEMINI_API_KEY, ANTHROPIC_API_KEY, DEEPSEEK_API_KEY or OPENROUTER_API_KEY is set"
        );
    }
    for provider in &config.providers {
        tracing::info!(
            provider = %provider.name,
            model = %provider.model,
            base_url = %provider.base_url,
            "Provider configured"
        );
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let cancel_token = CancellationToken::new();
    let state = AppState::new(config, adapters, cancel_token.clone());
    let app = create_router(state);

    tracing::info!("Chorus starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/health", addr);
    tracing::info!("  Chat:         POST http://{}/api/chat", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cancel_token))
    .await?;

    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling in-flight chat requests...");
    cancel_token.cancel();
}
