use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ObjectMeta, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, instrument};
use workspace_types::Workspace;

use crate::client::FIELD_MANAGER;
use crate::reconcile::Context;

#[derive(Debug, Error)]
pub enum RepoAuthError {
    #[error("repo url {0} has no parseable host")]
    UnparseableHost(String),
    #[error("host {0} is not in the allowed list")]
    HostNotAllowed(String),
    #[error(transparent)]
    Kube(#[from] kube::Error),
    #[error(transparent)]
    Minter(#[from] anyhow::Error),
}

/// Mints a short-lived credential for a repo host. Production deployments
/// back this with a GitHub App installation token exchange, a Vault
/// dynamic-secret lease, or similar; this reconciler only depends on the
/// trait so it can be tested against a fake.
#[async_trait]
pub trait InstallationTokenMinter: Send + Sync {
    async fn mint(&self, host: &str, repo_url: &str) -> anyhow::Result<MintedToken>;
}

#[derive(Debug, Clone)]
pub struct MintedToken {
    pub username: String,
    pub password: String,
    pub expires_in: Duration,
}

/// A minter that never actually calls out: useful as a config-driven
/// fallback when every repo in a namespace uses a long-lived PAT stored
/// directly in the `RepoAuth` secret reference rather than token exchange.
pub struct NullMinter;

#[async_trait]
impl InstallationTokenMinter for NullMinter {
    async fn mint(&self, host: &str, _repo_url: &str) -> anyhow::Result<MintedToken> {
        Err(anyhow::anyhow!("no installation token minter configured for host {host}"))
    }
}

#[instrument(skip_all, fields(name = %workspace.name_any()))]
pub async fn reconcile(workspace: Arc<Workspace>, ctx: Arc<Context>) -> Result<Action, RepoAuthError> {
    let annotation_key = &ctx.config.repo_auth.annotation_key;
    let managed = workspace
        .meta()
        .annotations
        .as_ref()
        .map(|a| a.contains_key(annotation_key))
        .unwrap_or(false);

    if !managed {
        return Ok(Action::await_change());
    }

    let namespace = workspace.namespace().unwrap_or_else(|| ctx.config.namespace.clone());
    let repos = workspace_types::validate::resolve_repos(&workspace.spec)
        .map_err(|e| RepoAuthError::Minter(anyhow::anyhow!(e)))?;

    let minter = NullMinter;
    let mut min_requeue = Duration::from_secs(ctx.config.repo_auth.refresh_lead.as_secs().max(60));

    for (repo, _dir) in &repos {
        let Some(auth) = &repo.auth else { continue };
        let host = host_of(&repo.url).ok_or_else(|| RepoAuthError::UnparseableHost(repo.url.clone()))?;
        if !ctx.config.repo_auth.allowed_hosts.iter().any(|h| h == &host) {
            return Err(RepoAuthError::HostNotAllowed(host));
        }

        let secret_name = deterministic_secret_name(&ctx.config.repo_auth.secret_name_prefix, &workspace.name_any(), &host);
        if secret_name != auth.secret_name {
            // The workspace references a secret we don't manage (e.g. a
            // hand-provisioned PAT); leave it untouched.
            continue;
        }

        let secrets: Api<Secret> = Api::namespaced(ctx.client.kube.clone(), &namespace);
        if let Some(existing) = ctx.client.get_opt(&secrets, &secret_name).await.map_err(RepoAuthError::Minter)? {
            if !is_managed(&existing) {
                continue;
            }
        }

        let token = minter.mint(&host, &repo.url).await.map_err(RepoAuthError::Minter)?;
        let netrc = netrc_contents(&host, &token.username, &token.password);

        let mut data = BTreeMap::new();
        data.insert("netrc".to_string(), k8s_openapi::ByteString(netrc.into_bytes()));

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret_name.clone()),
                namespace: Some(namespace.clone()),
                labels: Some(BTreeMap::from([(
                    "workspaces.orchestrator.dev/managed-by".to_string(),
                    "repo-auth".to_string(),
                )])),
                owner_references: Some(vec![owner_reference(&workspace)]),
                ..Default::default()
            },
            data: Some(data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };

        secrets
            .patch(&secret_name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&secret))
            .await?;

        info!(host = %host, secret = %secret_name, "minted repo-auth credential");

        let lead = ctx.config.repo_auth.refresh_lead;
        let refresh_in = token.expires_in.saturating_sub(lead).max(Duration::from_secs(30));
        min_requeue = min_requeue.min(refresh_in);
    }

    Ok(Action::requeue(min_requeue))
}

fn host_of(url: &str) -> Option<String> {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let after_at = without_scheme.rsplit('@').next().unwrap_or(without_scheme);
    let host = after_at.split(['/', ':']).next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

fn deterministic_secret_name(prefix: &str, workspace_name: &str, host: &str) -> String {
    let digest = Sha256::digest(format!("{workspace_name}:{host}").as_bytes());
    format!("{prefix}-{}", hex::encode(&digest[..8]))
}

fn is_managed(secret: &Secret) -> bool {
    secret
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get("workspaces.orchestrator.dev/managed-by"))
        .map(|v| v == "repo-auth")
        .unwrap_or(false)
}

fn netrc_contents(host: &str, username: &str, password: &str) -> String {
    format!("machine {host}\nlogin {username}\npassword {password}\n")
}

fn owner_reference(workspace: &Workspace) -> k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
    k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
        api_version: "workspaces.orchestrator.dev/v1".to_string(),
        kind: "Workspace".to_string(),
        name: workspace.name_any(),
        uid: workspace.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_of_parses_https_url() {
        assert_eq!(host_of("https://github.com/org/repo.git"), Some("github.com".to_string()));
    }

    #[test]
    fn host_of_parses_scp_like_url() {
        assert_eq!(host_of("git@github.com:org/repo.git"), Some("github.com".to_string()));
    }

    #[test]
    fn deterministic_secret_name_is_stable() {
        let a = deterministic_secret_name("prefix", "ws-1", "github.com");
        let b = deterministic_secret_name("prefix", "ws-1", "github.com");
        assert_eq!(a, b);
        assert_ne!(a, deterministic_secret_name("prefix", "ws-2", "github.com"));
    }

    #[test]
    fn netrc_contents_includes_all_fields() {
        let contents = netrc_contents("github.com", "x-access-token", "secret");
        assert!(contents.contains("machine github.com"));
        assert!(contents.contains("login x-access-token"));
        assert!(contents.contains("password secret"));
    }
}
