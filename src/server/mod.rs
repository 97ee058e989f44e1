//! HTTP, WebSocket and SSE surfaces over the job scheduler.

mod context;
pub mod error;
mod router;
pub mod routes;

pub use context::AppContext;
pub use error::AppError;
pub use router::{build_router, ApiDoc};

use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use vid2audio_av::{ToolInfo, TranscodeEngine};

use crate::config::Config;
use crate::jobs::start_reaper;

/// Create the storage directories, then serve until SIGINT/SIGTERM.
pub async fn start_server(
    config: Config,
    engine: Arc<dyn TranscodeEngine>,
    tools: Vec<ToolInfo>,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    prepare_storage(&config).await?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("WebSocket push on ws://{}{}", addr, config.server.push_path);

    let ctx = AppContext::new(config, engine, tools);
    serve(listener, ctx, shutdown_signal()).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Serve `ctx` on an already bound listener until `shutdown` resolves.
///
/// The reaper runs for as long as the server does. A conversion still in
/// flight at shutdown is not waited for.
pub async fn serve(
    listener: TcpListener,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let reaper = start_reaper(
        Arc::clone(&ctx.scheduler),
        ctx.config.queue.reap_interval(),
        cancel.clone(),
    );

    let app = build_router(ctx);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    cancel.cancel();
    if let Err(e) = reaper.await {
        tracing::warn!("Reaper task ended abnormally: {}", e);
    }

    result.context("HTTP server error")
}

/// Create the upload and output directories if needed.
pub async fn prepare_storage(config: &Config) -> Result<()> {
    for dir in [&config.storage.upload_dir, &config.storage.output_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
