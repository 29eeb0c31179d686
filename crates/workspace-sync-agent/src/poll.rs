use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use workspace_types::LatestManifest;

use crate::client::{ControlPlaneClient, LatestResult};
use crate::layout::{content_dir, resolved_live_revision, staging_dir, swap_live};

/// One iteration of the poll-mode sync loop for a single mount: asks the
/// control plane for the latest manifest (long-polling up to `wait` if the
/// caller already has a revision to compare against), and if it differs
/// from what's live, fetches and extracts it.
pub async fn sync_once(
    client: &ControlPlaneClient,
    mount_name: &str,
    mount_path: &Path,
    wait: Duration,
) -> anyhow::Result<Option<LatestManifest>> {
    let current_revision = resolved_live_revision(mount_path);
    let wait_seconds = if current_revision.is_some() { wait.as_secs() } else { 0 };

    let result = client
        .get_latest(mount_name, Some(wait_seconds), current_revision.as_deref())
        .await?;

    match result {
        LatestResult::Unchanged => Ok(None),
        LatestResult::NotFound => Ok(None),
        LatestResult::Found(manifest) => {
            if Some(manifest.revision.as_str()) == current_revision.as_deref() {
                return Ok(None);
            }
            apply_revision(client, mount_name, mount_path, &manifest).await?;
            Ok(Some(manifest))
        }
    }
}

async fn apply_revision(
    client: &ControlPlaneClient,
    mount_name: &str,
    mount_path: &Path,
    manifest: &LatestManifest,
) -> anyhow::Result<()> {
    let bytes = client.get_revision(mount_name, &manifest.revision).await?;

    let staging = staging_dir(mount_path, &uuid::Uuid::new_v4().simple().to_string());
    std::fs::create_dir_all(&staging)?;
    workspace_types::bundle::extract(&bytes, &staging)?;

    let target = content_dir(mount_path, &manifest.revision);
    if target.exists() {
        std::fs::remove_dir_all(&target)?;
    }
    std::fs::rename(&staging, &target)?;

    let previous = std::fs::read_link(crate::layout::live_path(mount_path)).ok();
    swap_live(mount_path, &target)?;

    if let Some(previous) = previous {
        if previous != target {
            let _ = std::fs::remove_dir_all(&previous);
        }
    }

    info!(mount = mount_name, revision = %manifest.revision, "synced shared mount to new revision");
    Ok(())
}

/// Runs the poll loop for one mount until `shutdown` fires. Each iteration
/// long-polls for up to `poll_interval`; transient failures are logged and
/// retried after a short backoff rather than tearing down the whole agent.
pub async fn run_poll_loop(
    client: ControlPlaneClient,
    mount_name: String,
    mount_path: std::path::PathBuf,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        tokio::select! {
            result = sync_once(&client, &mount_name, &mount_path, poll_interval) => {
                if let Err(err) = result {
                    warn!(mount = %mount_name, %err, "poll iteration failed, backing off");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
            _ = shutdown.cancelled() => return,
        }
    }
}
