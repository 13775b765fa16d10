use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use backend::config::Config;
use backend::notify::LogNotifier;
use backend::routes::{router, AppState};
use backend::scheduler::Scheduler;
use backend::{store, telemetry};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "taskflow-server", about = "Task management API with scheduled automation")]
struct Args {
    /// Path to a TOML config file; defaults apply when it does not exist.
    #[arg(short, long, env = "TASKFLOW_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::setup()?;
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let store = store::connect(&config.storage).await?;

    let scheduler = Scheduler::new(
        store.clone(),
        Arc::new(LogNotifier),
        config.automation.clone(),
    )
    .start();

    let state = AppState {
        store,
        automation: config.automation.clone(),
    };
    let app = router(state, &config.server);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped, waiting for scheduler");
    scheduler.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
    }
}
