#![forbid(unsafe_code)]

//! OBPO daemon: accepts analysis tasks over HTTP and runs them through the pipeline.

use anyhow::Context;
use clap::Parser;
use obpo_core::Pipeline;
use obpo_daemon::{cli::Args, http};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = args.pipeline_config()?;
    info!(
        versions_root = %config.versions_root.display(),
        script = %config.script_path.display(),
        timeout_secs = config.timeout.as_secs(),
        diagnostics = ?config.diagnostics_dir,
        "starting daemon"
    );

    let pipeline = Pipeline::new(config);
    if let Some(archive) = pipeline.diagnostics() {
        archive.ensure_dir().await;
    }

    let app = http::router(pipeline, args.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("bind {}", args.listen))?;
    info!("listening on http://{}", args.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
