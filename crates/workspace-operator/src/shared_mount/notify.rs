use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use workspace_types::LatestManifest;

const MAX_WAIT: Duration = Duration::from_secs(120);

type Key = (String, String);

/// Per-`(owner, mount)` wakeup fan-out for the `latest` long-poll endpoint.
///
/// Subscribers register before re-checking the manifest, so a publish that
/// lands between "I read the manifest" and "I started waiting" is never
/// lost: `subscribe` returns a receiver immediately, and the caller only
/// awaits it after confirming the manifest it already has is still current.
#[derive(Default)]
pub struct Notifier {
    waiters: Mutex<HashMap<Key, Vec<oneshot::Sender<()>>>>,
}

impl Notifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Notifier::default())
    }

    pub async fn subscribe(&self, owner: &str, mount: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock().await;
        waiters
            .entry((owner.to_string(), mount.to_string()))
            .or_default()
            .push(tx);
        rx
    }

    /// Wakes every current subscriber for `(owner, mount)` and clears the
    /// waiter list; anyone who subscribes after this call gets a fresh
    /// channel that fires on the next publish, not this one.
    pub async fn notify(&self, owner: &str, mount: &str) {
        let key = (owner.to_string(), mount.to_string());
        let mut waiters = self.waiters.lock().await;
        if let Some(senders) = waiters.remove(&key) {
            for sender in senders {
                let _ = sender.send(());
            }
        }
    }
}

/// Outcome of a long-poll wait against the `latest` endpoint.
pub enum WaitOutcome {
    Updated(LatestManifest),
    Unchanged,
    NotFound,
}

/// Long-polls `latest` for `(owner, mount)`: if the manifest already
/// differs from `if_none_match_revision` (or none was supplied while a
/// manifest exists), returns immediately; otherwise waits up to
/// `wait_seconds` (capped at [`MAX_WAIT`]) for a publish notification and
/// re-fetches once.
pub async fn long_poll<F, Fut>(
    notifier: &Notifier,
    owner: &str,
    mount: &str,
    if_none_match_revision: Option<&str>,
    wait_seconds: u64,
    fetch: F,
) -> WaitOutcome
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Option<LatestManifest>>,
{
    let current = fetch().await;
    if differs(&current, if_none_match_revision) {
        return match current {
            Some(manifest) => WaitOutcome::Updated(manifest),
            None => WaitOutcome::NotFound,
        };
    }

    let rx = notifier.subscribe(owner, mount).await;
    let wait = Duration::from_secs(wait_seconds).min(MAX_WAIT);

    match tokio::time::timeout(wait, rx).await {
        Ok(Ok(())) => match fetch().await {
            Some(manifest) => WaitOutcome::Updated(manifest),
            None => WaitOutcome::NotFound,
        },
        _ => match current {
            Some(_) => WaitOutcome::Unchanged,
            None => WaitOutcome::NotFound,
        },
    }
}

fn differs(current: &Option<LatestManifest>, if_none_match: Option<&str>) -> bool {
    match (current, if_none_match) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(manifest), Some(expected)) => manifest.revision != expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn notify_wakes_current_subscribers_only() {
        let notifier = Notifier::new();
        let rx1 = notifier.subscribe("owner-a", "mount-a").await;
        notifier.notify("owner-a", "mount-a").await;
        let rx2 = notifier.subscribe("owner-a", "mount-a").await;

        assert!(rx1.await.is_ok());
        assert!(tokio::time::timeout(Duration::from_millis(50), rx2).await.is_err());
    }

    #[tokio::test]
    async fn long_poll_returns_immediately_when_revision_differs() {
        let notifier = Notifier::new();
        let manifest = LatestManifest::new("r2", "sha256:abc", Utc::now());
        let outcome = long_poll(&notifier, "owner-a", "mount-a", Some("r1"), 5, || {
            let manifest = manifest.clone();
            async move { Some(manifest) }
        })
        .await;
        assert!(matches!(outcome, WaitOutcome::Updated(m) if m.revision == "r2"));
    }

    #[tokio::test]
    async fn long_poll_returns_not_found_when_absent_and_deadline_elapses() {
        let notifier = Notifier::new();
        let outcome = long_poll(&notifier, "owner-a", "mount-a", None, 0, || async { None }).await;
        assert!(matches!(outcome, WaitOutcome::NotFound));
    }
}
