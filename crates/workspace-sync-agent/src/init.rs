use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::client::ControlPlaneClient;
use crate::layout::{content_dir, ensure_mount_root, hoist_legacy_layout, live_path, swap_live};
use crate::poll::sync_once;

/// Brings one mount's directory to a consistent, usable state before the
/// steady-state poll/publish loops start: creates the mount root with the
/// right permissions, hoists any pre-`live`-symlink layout left behind by
/// an older agent image, and (for mounts with existing published content)
/// performs the initial fetch so the workspace container never observes an
/// empty `live` directory when content already exists upstream.
pub async fn init_mount(client: &ControlPlaneClient, mount_name: &str, mount_path: &Path) -> anyhow::Result<()> {
    ensure_mount_root(mount_path)?;
    hoist_legacy_layout(mount_path)?;

    if live_path(mount_path).symlink_metadata().is_ok() {
        info!(mount = mount_name, "shared mount already has live content");
        return Ok(());
    }

    match sync_once(client, mount_name, mount_path, Duration::from_secs(0)).await {
        Ok(Some(manifest)) => {
            info!(mount = mount_name, revision = %manifest.revision, "initial sync fetched published content");
        }
        Ok(None) => {
            // Nothing published yet: start from an empty, writable tree so
            // the workspace container has somewhere to write if this mount
            // is the one it's expected to seed.
            let empty = content_dir(mount_path, "empty");
            std::fs::create_dir_all(&empty)?;
            swap_live(mount_path, &empty)?;
            info!(mount = mount_name, "no published content yet, starting from empty mount");
        }
        Err(err) => return Err(err),
    }
    Ok(())
}
