mod cli;
mod routes;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use cli::Cli;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let service = Arc::new(cli.build_service()?);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        bind = %cli.bind,
        model = %cli.model,
        embedder = ?cli.embedder,
        vector_store = ?cli.vector_store,
        upload_dir = %cli.upload_dir.display(),
        "pdf-qa-server boot"
    );

    let app = routes::router(service, cli.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
