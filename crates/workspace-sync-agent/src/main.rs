mod client;
mod init;
mod layout;
mod poll;
mod publish;
mod watcher;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use workspace_types::{MountMode, SharedMountSpec, SyncMode};

use client::ControlPlaneClient;

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
        error!(%err, "workspace-sync-agent exited with error");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let mounts_json = std::env::var("SHARED_MOUNTS").unwrap_or_else(|_| "[]".to_string());
    let mounts: Vec<SharedMountSpec> = serde_json::from_str(&mounts_json)?;
    if mounts.is_empty() {
        info!("no shared mounts configured, exiting");
        return Ok(());
    }

    let api_url = std::env::var("API_URL")?;
    let owner = std::env::var("OWNER_ID")?;
    let token = std::env::var("TOKEN").unwrap_or_default();
    let client = ControlPlaneClient::new(api_url, owner, token)?;

    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();

    for mount in mounts {
        let mount_path = PathBuf::from(&mount.mount_path);
        init::init_mount(&client, &mount.name, &mount_path).await?;

        if mount.sync_mode == SyncMode::Poll {
            let handle = tokio::spawn(poll::run_poll_loop(
                client.clone(),
                mount.name.clone(),
                mount_path.clone(),
                Duration::from_secs(mount.poll_seconds as u64),
                shutdown.clone(),
            ));
            handles.push(handle);
        }

        if mount.mode == MountMode::Snapshot {
            let (tx, rx) = mpsc::channel(16);
            let watch_root = layout::live_path(&mount_path);
            match watcher::spawn_watcher(watch_root, Duration::from_secs(1), tx) {
                Ok(watcher) => {
                    // Leak the watcher into the publish task's lifetime by
                    // moving it into a holder task that outlives the loop;
                    // dropping it would stop delivering events.
                    let watcher_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        watcher_shutdown.cancelled().await;
                        drop(watcher);
                    });
                }
                Err(err) => error!(mount = %mount.name, %err, "failed to start filesystem watcher"),
            }

            let handle = tokio::spawn(publish::run_publish_loop(
                client.clone(),
                mount.name.clone(),
                mount_path,
                Duration::from_secs(mount.publish_seconds as u64),
                rx,
                shutdown.clone(),
            ));
            handles.push(handle);
        }
    }

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining sync loops");
    shutdown.cancel();

    for handle in handles {
        let _ = handle.await;
    }
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
