pub mod gateway_api;
pub mod repo_auth;
pub mod workspace;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::Controller;
use kube::Api;
use tracing::{error, warn};
use workspace_types::Workspace;

use crate::client::Client;
use crate::config::Config;
use crate::metrics::Metrics;

/// Context threaded through every reconcile call, analogous to the
/// original operator's `Arc<State>` but shared across two controllers
/// (workspace lifecycle, repo-auth) instead of one poll loop.
pub struct Context {
    pub client: Client,
    pub config: Config,
    pub metrics: Metrics,
}

pub fn error_policy_workspace(
    _workspace: Arc<Workspace>,
    error: &workspace::ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    ctx.metrics.reconcile_errors_total.inc();
    error!(%error, "workspace reconcile failed");
    Action::requeue(Duration::from_secs(15))
}

pub fn error_policy_repo_auth(
    _workspace: Arc<Workspace>,
    error: &repo_auth::RepoAuthError,
    ctx: Arc<Context>,
) -> Action {
    ctx.metrics.repo_auth_errors_total.inc();
    warn!(%error, "repo-auth reconcile failed");
    Action::requeue(Duration::from_secs(30))
}

/// Runs both controllers to completion (i.e. forever, until shutdown).
pub async fn run(ctx: Arc<Context>, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
    let workspaces: Api<Workspace> = Api::namespaced(ctx.client.kube.clone(), &ctx.config.namespace);

    let workspace_controller = Controller::new(workspaces.clone(), Default::default())
        .shutdown_on_signal()
        .run(workspace::reconcile, error_policy_workspace, ctx.clone())
        .for_each(|res| async move {
            if let Err(err) = res {
                warn!(%err, "workspace controller stream error");
            }
        });

    let repo_auth_controller = Controller::new(workspaces, Default::default())
        .shutdown_on_signal()
        .run(repo_auth::reconcile, error_policy_repo_auth, ctx.clone())
        .for_each(|res| async move {
            if let Err(err) = res {
                warn!(%err, "repo-auth controller stream error");
            }
        });

    tokio::select! {
        _ = futures::future::join(workspace_controller, repo_auth_controller) => {},
        _ = shutdown.cancelled() => {},
    }
    Ok(())
}
