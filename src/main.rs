// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use forge_core::{LoggingPushDispatcher, StoreBackedWorkPlan, TurnEngine};
use forge_store::SessionStore;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = forge_config::load(cli.config.as_deref()).context("loading configuration")?;

    if cli.show_config {
        println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
        return Ok(());
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    info!(data_dir = %data_dir.display(), "session store root");

    let store = Arc::new(SessionStore::new(data_dir));

    let (tool_event_tx, tool_event_rx) = tokio::sync::mpsc::channel(256);
    let work_plan_store = Arc::new(StoreBackedWorkPlan::new(store.clone()));
    let registry = Arc::new(forge_tools::default_registry(&config.tools, work_plan_store, tool_event_tx));

    let adapter: Arc<dyn forge_model::ProviderAdapter> = Arc::from(
        forge_model::from_config(&config.model, None).context("constructing provider adapter")?,
    );

    let engine = Arc::new(TurnEngine::new(
        store.clone(),
        registry,
        adapter,
        Arc::new(LoggingPushDispatcher),
        tool_event_rx,
        std::env::consts::OS,
        os_version(),
    ));

    let app = forge_gateway::router(store, engine);

    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    info!(addr = %cli.listen, "forge-server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving HTTP")?;

    Ok(())
}

fn default_data_dir() -> std::path::PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("forge/sessions")
}

fn os_version() -> String {
    std::env::var("OS_VERSION").unwrap_or_else(|_| "unknown".to_string())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
    info!("shutdown signal received");
}
