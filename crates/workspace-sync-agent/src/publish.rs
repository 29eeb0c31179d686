use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use workspace_types::LatestManifest;

use crate::client::{ControlPlaneClient, LatestResult};
use crate::layout::live_path;

/// Runs the publish side of a snapshot mount: wakes on a watcher tick or a
/// fallback ticker, bundles the live directory, and publishes a new
/// revision only if its checksum actually changed since the last publish.
/// A 409 from `put_latest` means another publisher raced us; refetch the
/// current manifest and retry once against the now-current revision.
pub async fn run_publish_loop(
    client: ControlPlaneClient,
    mount_name: String,
    mount_path: std::path::PathBuf,
    fallback_interval: Duration,
    mut watcher_rx: mpsc::Receiver<()>,
    shutdown: CancellationToken,
) {
    let mut last_checksum: Option<String> = None;

    loop {
        tokio::select! {
            tick = crate::watcher::debounced_tick(&mut watcher_rx, Duration::from_secs(1)) => {
                if !tick {
                    return;
                }
            }
            _ = tokio::time::sleep(fallback_interval) => {}
            _ = shutdown.cancelled() => return,
        }

        if let Err(err) = publish_if_changed(&client, &mount_name, &mount_path, &mut last_checksum).await {
            warn!(mount = %mount_name, %err, "publish iteration failed");
        }
    }
}

async fn publish_if_changed(
    client: &ControlPlaneClient,
    mount_name: &str,
    mount_path: &Path,
    last_checksum: &mut Option<String>,
) -> anyhow::Result<()> {
    let live = live_path(mount_path);
    if !live.exists() {
        return Ok(());
    }

    let (bytes, checksum) = workspace_types::bundle::bundle(&live)?;
    if last_checksum.as_deref() == Some(checksum.as_str()) {
        return Ok(());
    }

    let revision = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();

    let current = client.get_latest(mount_name, None, None).await?;
    let if_match = match &current {
        LatestResult::Found(manifest) => manifest.revision.clone(),
        LatestResult::NotFound => "*".to_string(),
        LatestResult::Unchanged => "*".to_string(),
    };

    client.put_revision(mount_name, &revision, bytes).await?;

    let manifest = LatestManifest::new(revision.clone(), checksum.clone(), Utc::now());
    let accepted = client.put_latest(mount_name, &manifest, &if_match).await?;

    if !accepted {
        // Someone else published between our read and write; the next
        // loop iteration will observe their revision and recompute ours
        // against it, so there's nothing to retry synchronously here.
        warn!(mount = mount_name, "lost publish race, deferring to next iteration");
        return Ok(());
    }

    info!(mount = mount_name, revision = %revision, "published shared mount revision");
    *last_checksum = Some(checksum);
    Ok(())
}
