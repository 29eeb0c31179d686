pub mod cert;
pub mod ratelimit;
pub mod ssh;
pub mod ws_pty;
pub mod zmx;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::server::{Principal, Server};

#[derive(Deserialize)]
pub struct MintCertRequest {
    pub public_key: String,
}

#[derive(Serialize)]
pub struct MintCertResponse {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub cert: String,
    pub known_hosts: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

pub async fn mint_ssh_cert(
    State(server): State<Server>,
    principal: Principal,
    Path((namespace, name)): Path<(String, String)>,
    Json(request): Json<MintCertRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    server.authorize_owner(&principal, &namespace, &name).await?;

    let workspace = server.get_workspace(&namespace, &name).await?;
    let ssh_enabled = workspace.spec.ssh.as_ref().map(|s| s.enabled).unwrap_or(false);
    if !ssh_enabled {
        return Err(ApiError::Forbidden("workspace does not have ssh enabled".to_string()));
    }

    if !server
        .rate_limiter
        .try_acquire(&principal.id, &namespace, &name)
        .await
    {
        return Err(ApiError::RateLimited);
    }

    let user_public_key = ssh_key::PublicKey::from_openssh(&request.public_key)
        .map_err(|e| workspace_types::Error::validation(format!("invalid public key: {e}")))?;

    let ca_key_path = server
        .config
        .ssh
        .ca_key_path
        .as_ref()
        .ok_or_else(|| ApiError::Upstream(anyhow::anyhow!("ssh.ca_key_path not configured")))?;
    let ca_key = ssh_key::PrivateKey::read_openssh_file(ca_key_path)
        .map_err(|e| ApiError::Upstream(anyhow::anyhow!("failed to load ssh CA key: {e}")))?;

    let principal_str = cert::principal_string(&server.config.ssh.principal_prefix, &namespace, &name);
    let key_id = format!("{}:{}", server.config.ssh.principal_prefix, principal.id);

    let certificate = cert::mint_user_certificate(
        &ca_key,
        &user_public_key,
        &principal_str,
        &key_id,
        server.config.ssh.cert_ttl,
    )
    .map_err(ApiError::Upstream)?;

    let host_key_path = server
        .config
        .ssh
        .host_key_path
        .as_ref()
        .ok_or_else(|| ApiError::Upstream(anyhow::anyhow!("ssh.host_key_path not configured")))?;
    let host_key = ssh_key::PrivateKey::read_openssh_file(host_key_path)
        .map_err(|e| ApiError::Upstream(anyhow::anyhow!("failed to load ssh host key: {e}")))?;
    let known_hosts = cert::known_hosts_line(
        &server.config.ssh.public_host,
        server.config.ssh.public_port,
        host_key.public_key(),
    )
    .map_err(ApiError::Upstream)?;

    let expires_at = chrono::Utc::now()
        + chrono::Duration::from_std(server.config.ssh.cert_ttl).unwrap_or_else(|_| chrono::Duration::minutes(15));

    let response = MintCertResponse {
        host: server.config.ssh.public_host.clone(),
        port: server.config.ssh.public_port,
        user: principal_str,
        cert: certificate.to_openssh().map_err(|e| ApiError::Upstream(e.into()))?,
        known_hosts,
        expires_at,
    };

    Ok(Json(serde_json::json!({ "status": "success", "data": response })))
}

pub async fn terminal_sessions(
    State(server): State<Server>,
    principal: Principal,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    server.authorize_owner(&principal, &namespace, &name).await?;
    let pod_name = server.resolve_pod_name(&namespace, &name).await?;
    let info = zmx::sessions_info(&server.client, &namespace, &pod_name, server.config.shell.session_mode).await;
    Ok(Json(serde_json::json!({ "status": "success", "data": info })))
}

pub type SharedGatewayState = Arc<ratelimit::RateLimiter>;
