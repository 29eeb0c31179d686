use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;
use workspace_types::bundle::is_control_entry;

/// Watches `root` recursively and sends a debounced "something changed"
/// signal on `tx`. Events touching a top-level control entry (staging
/// directories, the legacy layout names) never trigger a signal, since
/// those are the sync agent's own scratch space rather than user content.
pub fn spawn_watcher(root: PathBuf, debounce: Duration, tx: mpsc::Sender<()>) -> anyhow::Result<notify::RecommendedWatcher> {
    let watch_root = root.clone();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(%err, "filesystem watch error");
                return;
            }
        };
        if event.paths.iter().any(|p| is_relevant(&watch_root, p)) {
            let _ = tx.try_send(());
        }
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

fn is_relevant(root: &Path, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else { return true };
    match rel.components().next() {
        Some(std::path::Component::Normal(name)) => !is_control_entry(&name.to_string_lossy()),
        _ => true,
    }
}

/// Drains a burst of change notifications into a single tick, so a large
/// checkout or multi-file save only triggers one publish rather than one
/// per file event.
pub async fn debounced_tick(rx: &mut mpsc::Receiver<()>, window: Duration) -> bool {
    if rx.recv().await.is_none() {
        return false;
    }
    loop {
        tokio::select! {
            more = rx.recv() => {
                if more.is_none() {
                    return true;
                }
            }
            _ = tokio::time::sleep(window) => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_entries_are_not_relevant() {
        let root = Path::new("/mnt/shared");
        assert!(!is_relevant(root, &root.join(".incoming-abc/file.txt")));
        assert!(!is_relevant(root, &root.join("live")));
        assert!(is_relevant(root, &root.join("src/main.rs")));
    }
}
