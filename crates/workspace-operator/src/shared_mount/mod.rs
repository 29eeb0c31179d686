pub mod notify;
pub mod routes;
pub mod storage;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::config::SharedMountConfig;
use notify::Notifier;
use storage::{FilesystemObjectStore, ObjectStore};

/// Shared state for the shared-mount control-plane endpoints: the
/// object-store backend and the process-wide long-poll notifier.
pub struct SharedMountState {
    pub store: Arc<dyn ObjectStore>,
    pub notifier: Arc<Notifier>,
    pub max_bundle_bytes: u64,
}

impl SharedMountState {
    pub fn new(config: &SharedMountConfig) -> Arc<Self> {
        Arc::new(SharedMountState {
            store: Arc::new(FilesystemObjectStore::new(config.object_store_path.clone())),
            notifier: Notifier::new(),
            max_bundle_bytes: config.max_bundle_bytes,
        })
    }
}

pub fn router(state: Arc<SharedMountState>) -> Router {
    Router::new()
        .route("/owner/:owner/:mount/latest", get(routes::get_latest).put(routes::put_latest))
        .route(
            "/owner/:owner/:mount/revisions/:revision",
            get(routes::get_revision).put(routes::put_revision),
        )
        .with_state(state)
}
