use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

pub const LIVE_LINK: &str = "live";
pub const LEGACY_CURRENT: &str = "current";

pub fn live_path(mount_path: &Path) -> PathBuf {
    mount_path.join(LIVE_LINK)
}

pub fn content_dir(mount_path: &Path, revision: &str) -> PathBuf {
    mount_path.join(format!(".content-{}", sanitize(revision)))
}

pub fn staging_dir(mount_path: &Path, token: &str) -> PathBuf {
    mount_path.join(format!(".incoming-{}", sanitize(token)))
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Atomically points `mount_path/live` at `target`, replacing whatever it
/// pointed at before. Uses a temp symlink plus rename so readers following
/// `live` never observe a half-written link.
pub fn swap_live(mount_path: &Path, target: &Path) -> std::io::Result<()> {
    let tmp = mount_path.join(".live.tmp");
    let _ = fs::remove_file(&tmp);
    symlink(target, &tmp)?;
    fs::rename(&tmp, live_path(mount_path))
}

/// Ensures `mount_path` itself exists with group-writable, setgid
/// permissions so every container sharing the mount's group can write into
/// it regardless of which container's init wins the race to create it.
pub fn ensure_mount_root(mount_path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::create_dir_all(mount_path)?;
    let mut perms = fs::metadata(mount_path)?.permissions();
    perms.set_mode(0o2775);
    fs::set_permissions(mount_path, perms)
}

/// Migrates the pre-`live`-symlink layout (a single `current` directory
/// owning the mount's content directly) into the current layout: if
/// `current` exists and `live` does not, adopt `current` as the first
/// content directory and remove the legacy name.
pub fn hoist_legacy_layout(mount_path: &Path) -> std::io::Result<()> {
    let legacy = mount_path.join(LEGACY_CURRENT);
    let live = live_path(mount_path);
    if !legacy.exists() || live.exists() || live.symlink_metadata().is_ok() {
        return Ok(());
    }
    let hoisted = content_dir(mount_path, "legacy");
    fs::rename(&legacy, &hoisted)?;
    swap_live(mount_path, &hoisted)
}

pub fn resolved_live_revision(mount_path: &Path) -> Option<String> {
    let target = fs::read_link(live_path(mount_path)).ok()?;
    let name = target.file_name()?.to_string_lossy();
    name.strip_prefix(".content-").map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn swap_live_points_at_new_target() {
        let mount = tempdir().unwrap();
        let target_a = content_dir(mount.path(), "rev-a");
        let target_b = content_dir(mount.path(), "rev-b");
        fs::create_dir_all(&target_a).unwrap();
        fs::create_dir_all(&target_b).unwrap();

        swap_live(mount.path(), &target_a).unwrap();
        assert_eq!(fs::read_link(live_path(mount.path())).unwrap(), target_a);

        swap_live(mount.path(), &target_b).unwrap();
        assert_eq!(fs::read_link(live_path(mount.path())).unwrap(), target_b);
    }

    #[test]
    fn hoist_legacy_layout_adopts_current_directory() {
        let mount = tempdir().unwrap();
        fs::create_dir_all(mount.path().join(LEGACY_CURRENT)).unwrap();
        fs::write(mount.path().join(LEGACY_CURRENT).join("f.txt"), b"x").unwrap();

        hoist_legacy_layout(mount.path()).unwrap();

        assert!(!mount.path().join(LEGACY_CURRENT).exists());
        let live_target = fs::read_link(live_path(mount.path())).unwrap();
        assert!(fs::read(live_target.join("f.txt")).unwrap() == b"x");
    }

    #[test]
    fn hoist_legacy_layout_is_noop_when_live_already_present() {
        let mount = tempdir().unwrap();
        let target = content_dir(mount.path(), "rev-a");
        fs::create_dir_all(&target).unwrap();
        swap_live(mount.path(), &target).unwrap();
        fs::create_dir_all(mount.path().join(LEGACY_CURRENT)).unwrap();

        hoist_legacy_layout(mount.path()).unwrap();
        assert!(mount.path().join(LEGACY_CURRENT).exists());
    }

    #[test]
    fn resolved_live_revision_reads_back_content_suffix() {
        let mount = tempdir().unwrap();
        let target = content_dir(mount.path(), "rev-123");
        fs::create_dir_all(&target).unwrap();
        swap_live(mount.path(), &target).unwrap();
        assert_eq!(resolved_live_revision(mount.path()), Some("rev-123".to_string()));
    }
}
