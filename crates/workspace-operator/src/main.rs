mod client;
mod config;
mod error;
mod gateway;
mod metrics;
mod reconcile;
mod server;
mod shared_mount;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use client::Client;
use config::Config;
use metrics::Metrics;
use reconcile::Context;
use server::Server;
use shared_mount::SharedMountState;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    if let Err(err) = runtime.block_on(run()) {
        error!(%err, "workspace-operator exited with error");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load_from_env()?;
    let client = Client::try_default().await?;

    if config.auto_create_namespace {
        client.ensure_namespace(&config.namespace).await?;
    }

    let metrics = Metrics::new();
    let shutdown = CancellationToken::new();

    let ctx = Arc::new(Context {
        client: client.clone(),
        config: config.clone(),
        metrics,
    });

    let server = Server::new(config.clone(), client);
    let shared_mount_state = SharedMountState::new(&config.shared_mount);

    let reconcile_shutdown = shutdown.clone();
    let reconcile_handle = tokio::spawn(async move {
        if let Err(err) = reconcile::run(ctx, reconcile_shutdown).await {
            error!(%err, "reconcile loop exited with error");
        }
    });

    let ssh_shutdown = shutdown.clone();
    let ssh_server = server.clone();
    let ssh_handle = tokio::spawn(async move {
        if let Err(err) = gateway::ssh::run(ssh_server, ssh_shutdown).await {
            error!(%err, "ssh gateway exited with error");
        }
    });

    let bind = server.config.server.bind;
    let app = server::router(server, shared_mount_state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "workspace-operator http server listening");

    let http_shutdown = shutdown.clone();
    let http_handle = tokio::spawn(async move {
        let result = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await;
        if let Err(err) = result {
            error!(%err, "http server exited with error");
        }
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining in-flight work");
    shutdown.cancel();

    let _ = tokio::join!(reconcile_handle, ssh_handle, http_handle);
    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let ctrl_c = tokio::signal::ctrl_c();

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = ctrl_c => {}
    }
}
