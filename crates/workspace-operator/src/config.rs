use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CONFIG_ENV_VAR: &str = "WORKSPACE_ORCHESTRATOR_CONFIG";

/// Top-level operator configuration, loaded once at startup from the JSON
/// file named by [`CONFIG_ENV_VAR`]. Every field has a default so a minimal
/// file only needs to set `namespace` and the pieces it actually uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub namespace: String,
    pub auto_create_namespace: bool,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    #[serde(with = "humantime_serde")]
    pub ttl_grace: Duration,
    pub shared_mount: SharedMountConfig,
    pub owner_pvc: OwnerPvcConfig,
    pub shell: ShellConfig,
    pub ssh: SshConfig,
    pub ingress: IngressDefaults,
    pub repo_auth: RepoAuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            namespace: "workspaces".to_string(),
            auto_create_namespace: true,
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            ttl_grace: Duration::from_secs(5 * 60),
            shared_mount: SharedMountConfig::default(),
            owner_pvc: OwnerPvcConfig::default(),
            shell: ShellConfig::default(),
            ssh: SshConfig::default(),
            ingress: IngressDefaults::default(),
            repo_auth: RepoAuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:8080".parse().unwrap(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    None,
    Header,
    Bearer,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub header_id: String,
    pub header_email: String,
    pub header_teams: String,
    pub bearer_tokens: HashMap<String, String>,
    pub jwks: Option<JwksConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            mode: AuthMode::Header,
            header_id: "X-Principal-Id".to_string(),
            header_email: "X-Principal-Email".to_string(),
            header_teams: "X-Principal-Teams".to_string(),
            bearer_tokens: HashMap::new(),
            jwks: None,
        }
    }
}

/// Parsed but not actively fetched: JWKS retrieval and validation is an
/// external collaborator this spec only describes the shape of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksConfig {
    pub url: String,
    pub audiences: Vec<String>,
    pub issuer: String,
    #[serde(default = "default_jwt_algos")]
    pub algorithms: Vec<String>,
    #[serde(default = "default_jwks_leeway", with = "humantime_serde")]
    pub leeway: Duration,
    #[serde(default = "default_jwks_refresh", with = "humantime_serde")]
    pub refresh_interval: Duration,
}

fn default_jwt_algos() -> Vec<String> {
    vec!["RS256".to_string()]
}

fn default_jwks_leeway() -> Duration {
    Duration::from_secs(60)
}

fn default_jwks_refresh() -> Duration {
    Duration::from_secs(15 * 60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allowed_origins: vec![],
            allowed_methods: vec!["GET".into(), "POST".into(), "PATCH".into(), "DELETE".into()],
            allowed_headers: vec!["authorization".into(), "content-type".into()],
            allow_credentials: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedMountConfig {
    pub api_url: String,
    pub internal_token: String,
    pub syncer_image: String,
    pub syncer_pull_policy: String,
    pub max_bundle_bytes: u64,
    pub object_store_path: PathBuf,
    /// Mounts an admin has provisioned ahead of any Workspace referencing
    /// them. Membership here bypasses the Workspace back-reference check.
    pub static_mounts: Vec<StaticSharedMount>,
}

impl Default for SharedMountConfig {
    fn default() -> Self {
        SharedMountConfig {
            api_url: "http://workspace-operator.workspaces.svc:8080/internal/v1/shared-mounts".to_string(),
            internal_token: String::new(),
            syncer_image: "ghcr.io/workspace-orchestrator/sync-agent:latest".to_string(),
            syncer_pull_policy: "IfNotPresent".to_string(),
            max_bundle_bytes: 512 * 1024 * 1024,
            object_store_path: PathBuf::from("/var/lib/workspace-orchestrator/shared-mounts"),
            static_mounts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticSharedMount {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerPvcConfig {
    pub name_prefix: String,
    pub home_size: String,
    pub shared_config_size: String,
    pub access_modes: Vec<String>,
    pub storage_class: Option<String>,
}

impl Default for OwnerPvcConfig {
    fn default() -> Self {
        OwnerPvcConfig {
            name_prefix: "workspace".to_string(),
            home_size: "10Gi".to_string(),
            shared_config_size: "1Gi".to_string(),
            access_modes: vec!["ReadWriteOnce".to_string()],
            storage_class: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub command: Vec<String>,
    pub session_mode: TerminalSessionMode,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            command: vec!["/bin/bash".to_string(), "-l".to_string()],
            session_mode: TerminalSessionMode::Plain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalSessionMode {
    Plain,
    Zmx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub ca_key_path: Option<PathBuf>,
    pub host_key_path: Option<PathBuf>,
    pub listen: SocketAddr,
    pub public_host: String,
    pub public_port: u16,
    pub principal_prefix: String,
    #[serde(with = "humantime_serde")]
    pub cert_ttl: Duration,
    pub rate_limit: RateLimitConfig,
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            ca_key_path: None,
            host_key_path: None,
            listen: "0.0.0.0:2222".parse().unwrap(),
            public_host: "ssh.workspaces.example.com".to_string(),
            public_port: 2222,
            principal_prefix: "ws".to_string(),
            cert_ttl: Duration::from_secs(15 * 60),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub limit: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub burst: u32,
    #[serde(with = "humantime_serde")]
    pub idle_bucket_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            limit: 5,
            window: Duration::from_secs(60),
            burst: 2,
            idle_bucket_ttl: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressDefaults {
    pub class: Option<String>,
    pub annotations: HashMap<String, String>,
    pub gateway_ref: Option<String>,
}

impl Default for IngressDefaults {
    fn default() -> Self {
        IngressDefaults {
            class: None,
            annotations: HashMap::new(),
            gateway_ref: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoAuthConfig {
    pub annotation_key: String,
    pub allowed_hosts: Vec<String>,
    pub secret_name_prefix: String,
    #[serde(with = "humantime_serde")]
    pub refresh_lead: Duration,
}

impl Default for RepoAuthConfig {
    fn default() -> Self {
        RepoAuthConfig {
            annotation_key: "workspaces.orchestrator.dev/repo-auth".to_string(),
            allowed_hosts: vec!["github.com".to_string()],
            secret_name_prefix: "workspace-repo-auth".to_string(),
            refresh_lead: Duration::from_secs(15 * 60),
        }
    }
}

impl Config {
    /// Reads the path named by `WORKSPACE_ORCHESTRATOR_CONFIG` and parses
    /// it as JSON. A missing env var or unparseable file is a fatal startup
    /// error, matching how the rest of the process treats config problems.
    pub fn load_from_env() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV_VAR)
            .map_err(|_| anyhow::anyhow!("{CONFIG_ENV_VAR} is not set"))?;
        let bytes = std::fs::read(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        let config: Config = serde_json::from_slice(&bytes)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {path}: {e}"))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = Config::default();
        let encoded = serde_json::to_vec(&config).unwrap();
        let decoded: Config = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded.namespace, config.namespace);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let decoded: Config = serde_json::from_str(r#"{"namespace": "custom"}"#).unwrap();
        assert_eq!(decoded.namespace, "custom");
        assert_eq!(decoded.ttl_grace, Duration::from_secs(5 * 60));
    }
}
