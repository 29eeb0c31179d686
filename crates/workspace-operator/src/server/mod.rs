pub mod api;
pub mod auth;
pub mod internal_auth;
pub mod jsend;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, patch, post};
use axum::{BoxError, Router};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use workspace_types::Workspace;

pub use auth::Principal;

use crate::client::Client;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::gateway::ratelimit::RateLimiter;
use crate::metrics::Metrics;
use crate::shared_mount::SharedMountState;

/// Shared application state, cheaply cloned (everything behind an `Arc`)
/// and handed to every handler via axum's `State` extractor. Analogous to
/// the original operator's `Server { operator }` wrapper, generalized to
/// carry the whole control-plane surface instead of one `Operator` handle.
#[derive(Clone)]
pub struct Server(Arc<Inner>);

pub(crate) struct Inner {
    pub config: Config,
    pub client: Client,
    pub metrics: Metrics,
    pub rate_limiter: RateLimiter,
    pub mount_membership: MountMembershipCache,
}

impl std::ops::Deref for Server {
    type Target = Inner;
    fn deref(&self) -> &Inner {
        &self.0
    }
}

impl Server {
    pub fn new(config: Config, client: Client) -> Self {
        let rate_limiter = RateLimiter::new(config.ssh.rate_limit.clone());
        Server(Arc::new(Inner {
            config,
            client,
            metrics: Metrics::new(),
            rate_limiter,
            mount_membership: MountMembershipCache::new(),
        }))
    }

    /// Whether `(owner, mount)` is a shared mount the caller may read or
    /// write: either an admin-provisioned static mount, or referenced by at
    /// least one Workspace owned by `owner`.
    pub async fn shared_mount_is_authorized(&self, owner: &str, mount: &str) -> ApiResult<bool> {
        if self
            .config
            .shared_mount
            .static_mounts
            .iter()
            .any(|m| m.owner == owner && m.name == mount)
        {
            return Ok(true);
        }
        self.mount_membership.contains(&self.client, &self.config.namespace, owner, mount).await
    }

    pub async fn get_workspace(&self, namespace: &str, name: &str) -> ApiResult<Workspace> {
        let api: Api<Workspace> = Api::namespaced(self.client.kube.clone(), namespace);
        self.client
            .get_opt(&api, name)
            .await
            .map_err(ApiError::Upstream)?
            .ok_or_else(|| workspace_types::Error::not_found(format!("workspace {namespace}/{name} not found")).into())
    }

    pub async fn authorize_owner(&self, principal: &Principal, namespace: &str, name: &str) -> ApiResult<Workspace> {
        let workspace = self.get_workspace(namespace, name).await?;
        if principal.is_admin || workspace.spec.owner.id == principal.id {
            Ok(workspace)
        } else {
            Err(ApiError::Forbidden("caller does not own this workspace".to_string()))
        }
    }

    pub async fn resolve_pod_name(&self, namespace: &str, name: &str) -> ApiResult<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.kube.clone(), namespace);
        let list_params = ListParams::default().labels(&format!("workspaces.orchestrator.dev/name={name}"));
        let list = pods.list(&list_params).await.map_err(|e| ApiError::Upstream(e.into()))?;
        list.items
            .into_iter()
            .find(|p| {
                p.status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .map(|phase| phase == "Running")
                    .unwrap_or(false)
            })
            .and_then(|p| p.metadata.name)
            .ok_or_else(|| workspace_types::Error::not_found(format!("no running pod for workspace {namespace}/{name}")).into())
    }
}

const MOUNT_MEMBERSHIP_TTL: Duration = Duration::from_secs(5);

/// Caches the `owner -> {mount names}` relation derived from listing
/// Workspaces, refreshed on a short TTL so the admission check on every
/// shared-mount request doesn't hit the apiserver directly.
#[derive(Clone)]
struct MountMembershipCache(Arc<Mutex<MountMembershipState>>);

#[derive(Default)]
struct MountMembershipState {
    fetched_at: Option<Instant>,
    by_owner: HashMap<String, HashSet<String>>,
}

impl MountMembershipCache {
    fn new() -> Self {
        MountMembershipCache(Arc::new(Mutex::new(MountMembershipState::default())))
    }

    async fn contains(&self, client: &Client, namespace: &str, owner: &str, mount: &str) -> ApiResult<bool> {
        let mut state = self.0.lock().await;
        let stale = state.fetched_at.map(|at| at.elapsed() > MOUNT_MEMBERSHIP_TTL).unwrap_or(true);
        if stale {
            let api: Api<Workspace> = Api::namespaced(client.kube.clone(), namespace);
            let list = api.list(&ListParams::default()).await.map_err(|e| ApiError::Upstream(e.into()))?;
            let mut by_owner: HashMap<String, HashSet<String>> = HashMap::new();
            for workspace in list.items {
                let mounts = by_owner.entry(workspace.spec.owner.id).or_default();
                mounts.extend(workspace.spec.shared_mounts.into_iter().map(|m| m.name));
            }
            state.by_owner = by_owner;
            state.fetched_at = Some(Instant::now());
        }
        Ok(state.by_owner.get(owner).map(|mounts| mounts.contains(mount)).unwrap_or(false))
    }
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(axum::extract::State(server): axum::extract::State<Server>) -> ApiResult<String> {
    server.metrics.encode().map_err(ApiError::Upstream)
}

async fn handle_middleware_error(error: BoxError) -> (StatusCode, String) {
    if error.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request has timed out".to_string())
    } else if error.is::<tower::load_shed::error::Overloaded>() {
        (StatusCode::SERVICE_UNAVAILABLE, "api is overloaded".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled internal error: {error}"))
    }
}

pub fn router(server: Server, shared_mount_state: Arc<SharedMountState>) -> Router {
    let cors = if server.config.cors.allowed_origins.is_empty() {
        CorsLayer::new()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(
                server
                    .config
                    .cors
                    .allowed_origins
                    .iter()
                    .filter_map(|o| o.parse().ok()),
            ))
            .allow_credentials(server.config.cors.allow_credentials)
    };

    let public = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .route("/workspaces", get(api::list_workspaces).post(api::create_workspace))
        .route(
            "/workspaces/:name",
            get(api::get_workspace).delete(api::delete_workspace),
        )
        .route("/workspaces/:name/user-config", patch(api::patch_user_config))
        .route("/workspaces/:name/ssh", post(crate::gateway::mint_ssh_cert))
        .route("/workspaces/:name/terminal", get(crate::gateway::ws_pty::terminal_upgrade))
        .route(
            "/workspaces/:name/terminal/sessions",
            get(crate::gateway::terminal_sessions),
        )
        .with_state(server.clone());

    let internal = crate::shared_mount::router(shared_mount_state)
        .route_layer(middleware::from_fn_with_state(server.clone(), internal_auth::require_internal_token));

    Router::new()
        .nest("/", public)
        .nest("/internal/v1/shared-mounts", internal)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .buffer(512)
                .rate_limit(100, Duration::from_secs(1))
                .load_shed()
                .timeout(Duration::from_secs(30))
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}
