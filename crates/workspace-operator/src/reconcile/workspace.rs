use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PodSpec, PodTemplateSpec, ResourceRequirements,
    SecretKeySelector, SecretVolumeSource, Service, ServicePort, ServiceSpec,
    Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend, IngressSpec,
    ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Resource, ResourceExt};
use thiserror::Error;
use tracing::{info, instrument};
use workspace_types::{IngressMode, SshMode, Workspace, WorkspacePhase, WorkspaceStatus};

use crate::client::FIELD_MANAGER;
use crate::reconcile::gateway_api::{BackendRef, HttpPathMatch, HTTPRoute, HttpRouteFilter, HttpRouteMatch, HttpRouteRule, HttpRouteSpec, ParentRef, UrlRewrite};
use crate::reconcile::Context;

pub const FINALIZER: &str = "workspaces.orchestrator.dev/cleanup";
const LABEL_NAME: &str = "workspaces.orchestrator.dev/name";
const LABEL_OWNER: &str = "workspaces.orchestrator.dev/owner-hash";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Kube(#[from] kube::Error),
    #[error(transparent)]
    Types(#[from] workspace_types::Error),
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

#[instrument(skip_all, fields(name = %workspace.name_any(), namespace = %workspace.namespace().unwrap_or_default()))]
pub async fn reconcile(workspace: Arc<Workspace>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = workspace.namespace().unwrap_or_else(|| ctx.config.namespace.clone());
    let api: Api<Workspace> = Api::namespaced(ctx.client.kube.clone(), &namespace);

    let outcome = finalizer(&api, FINALIZER, workspace.clone(), |event| async {
        match event {
            FinalizerEvent::Apply(ws) => apply(ws, &ctx, &namespace).await,
            FinalizerEvent::Cleanup(ws) => cleanup(ws, &ctx, &namespace).await,
        }
    })
    .await;

    match outcome {
        Ok(action) => Ok(action),
        Err(kube::runtime::finalizer::Error::ApplyFailed(err)) => Err(err),
        Err(kube::runtime::finalizer::Error::CleanupFailed(err)) => Err(err),
        Err(other) => Err(ReconcileError::Upstream(anyhow::anyhow!(other))),
    }
}

async fn apply(workspace: Arc<Workspace>, ctx: &Context, namespace: &str) -> Result<Action, ReconcileError> {
    let name = workspace.name_any();

    if let Err(validation_err) = validate(&workspace) {
        set_status_error(&ctx.client.kube, namespace, &name, &validation_err).await?;
        ctx.metrics.configuration_errors.inc();
        return Ok(Action::requeue(Duration::from_secs(60)));
    }

    if let Some(ttl) = workspace.spec.ttl {
        let created_at = workspace
            .meta()
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .unwrap_or_else(Utc::now);
        let expiry = created_at + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let grace = chrono::Duration::from_std(ctx.config.ttl_grace).unwrap_or_else(|_| chrono::Duration::minutes(5));
        let now = Utc::now();

        if now > expiry + grace {
            let api: Api<Workspace> = Api::namespaced(ctx.client.kube.clone(), namespace);
            api.delete(&name, &DeleteParams::default()).await?;
            return Ok(Action::await_change());
        } else if now > expiry {
            set_status_phase(&ctx.client.kube, namespace, &name, WorkspacePhase::Expiring, Some(expiry + grace)).await?;
            let remaining = (expiry + grace - now).to_std().unwrap_or(Duration::from_secs(1));
            return Ok(Action::requeue(remaining));
        }
    }

    let owner_hash = owner_hash(&workspace.spec.owner.id);
    let labels = BTreeMap::from([
        (LABEL_NAME.to_string(), name.clone()),
        (LABEL_OWNER.to_string(), owner_hash.clone()),
    ]);

    ensure_owner_pvcs(ctx, namespace, &owner_hash).await?;

    let resolved_repos = workspace_types::validate::resolve_repos(&workspace.spec)?;
    let deployment = build_deployment(ctx, &workspace, &name, &labels, &owner_hash, &resolved_repos)?;
    let deployment_api: Api<Deployment> = Api::namespaced(ctx.client.kube.clone(), namespace);
    deployment_api
        .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&deployment))
        .await?;

    let service_api: Api<Service> = Api::namespaced(ctx.client.kube.clone(), namespace);
    let wants_service = workspace.spec.web_enabled
        || !workspace.spec.ports.is_empty()
        || matches!(workspace.spec.ssh.as_ref(), Some(s) if s.enabled && s.mode == SshMode::Service);
    if wants_service {
        let service = build_service(&workspace, &name, &labels);
        service_api
            .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&service))
            .await?;
    } else {
        let _ = service_api.delete(&name, &DeleteParams::default()).await;
    }

    let ingress_api: Api<Ingress> = Api::namespaced(ctx.client.kube.clone(), namespace);
    let route_api: Api<HTTPRoute> = Api::namespaced(ctx.client.kube.clone(), namespace);
    match workspace.spec.ingress.as_ref().map(|i| i.mode) {
        Some(IngressMode::Ingress) => {
            let ingress = build_ingress(ctx, &workspace, &name, &labels)?;
            ingress_api
                .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&ingress))
                .await?;
            let _ = route_api.delete(&name, &DeleteParams::default()).await;
        }
        Some(IngressMode::Gateway) => {
            let route = build_http_route(ctx, &workspace, &name)?;
            route_api
                .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&route))
                .await?;
            let _ = ingress_api.delete(&name, &DeleteParams::default()).await;
        }
        None => {
            let _ = ingress_api.delete(&name, &DeleteParams::default()).await;
            let _ = route_api.delete(&name, &DeleteParams::default()).await;
        }
    }

    let observed = ctx.client.get_opt(&deployment_api, &name).await.ok().flatten();
    let available = observed
        .as_ref()
        .and_then(|d| d.status.as_ref())
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);

    let phase = if available > 0 { WorkspacePhase::Ready } else { WorkspacePhase::Provisioning };
    if phase == WorkspacePhase::Ready {
        ctx.metrics.workspace_ready_count.inc();
    } else {
        ctx.metrics.workspace_unready_count.inc();
    }

    let expires_at = workspace.spec.ttl.map(|ttl| {
        let created_at = workspace.meta().creation_timestamp.as_ref().map(|t| t.0).unwrap_or_else(Utc::now);
        created_at + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero())
    });
    set_status_phase(&ctx.client.kube, namespace, &name, phase, expires_at).await?;

    info!(phase = ?phase, "reconciled workspace");

    Ok(match workspace.spec.ttl {
        Some(ttl) => Action::requeue(ttl.min(Duration::from_secs(300))),
        None => Action::requeue(Duration::from_secs(300)),
    })
}

async fn cleanup(workspace: Arc<Workspace>, ctx: &Context, namespace: &str) -> Result<Action, ReconcileError> {
    let name = workspace.name_any();
    set_status_phase(&ctx.client.kube, namespace, &name, WorkspacePhase::Terminating, None).await.ok();
    info!("workspace finalized");
    Ok(Action::await_change())
}

fn validate(workspace: &Workspace) -> Result<(), String> {
    workspace_types::validate::resolve_repos(&workspace.spec).map_err(|e| e.to_string())?;
    workspace_types::validate::validate_mounts(&workspace.spec.shared_mounts).map_err(|e| e.to_string())?;
    if workspace.spec.owner.id.is_empty() {
        return Err("owner.id must not be empty".to_string());
    }
    if let Some(ttl) = workspace.spec.ttl {
        if ttl.is_zero() {
            return Err("ttl must be a positive duration".to_string());
        }
    }
    Ok(())
}

fn owner_hash(owner_id: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(owner_id.as_bytes()))
}

async fn ensure_owner_pvcs(ctx: &Context, namespace: &str, owner_hash: &str) -> Result<(), ReconcileError> {
    let api: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.kube.clone(), namespace);
    let prefix = &ctx.config.owner_pvc.name_prefix;

    for (purpose, size) in [
        ("home", ctx.config.owner_pvc.home_size.clone()),
        ("shared-config", ctx.config.owner_pvc.shared_config_size.clone()),
    ] {
        let pvc_name = format!("{prefix}-owner-{owner_hash}-{purpose}");
        if ctx.client.get_opt(&api, &pvc_name).await?.is_some() {
            continue;
        }
        let mut requests = BTreeMap::new();
        requests.insert("storage".to_string(), k8s_openapi::apimachinery::pkg::api::resource::Quantity(size));

        let pvc = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(pvc_name.clone()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(ctx.config.owner_pvc.access_modes.clone()),
                storage_class_name: ctx.config.owner_pvc.storage_class.clone(),
                resources: Some(ResourceRequirements {
                    requests: Some(requests),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        api.create(&kube::api::PostParams::default(), &pvc).await?;
    }
    Ok(())
}

fn build_deployment(
    ctx: &Context,
    workspace: &Workspace,
    name: &str,
    labels: &BTreeMap<String, String>,
    owner_hash: &str,
    repos: &[(workspace_types::Repo, String)],
) -> Result<Deployment, ReconcileError> {
    let mut volumes = Vec::new();
    let mut volume_mounts = Vec::new();
    let mut init_containers = Vec::new();
    let mut needs_fsgroup = false;

    if !workspace.spec.shared_mounts.is_empty() {
        needs_fsgroup = true;
    }

    for mount in &workspace.spec.shared_mounts {
        let volume_name = workspace_types::validate::mount_volume_name(&mount.name);
        volumes.push(Volume {
            name: volume_name.clone(),
            empty_dir: Some(Default::default()),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: volume_name,
            mount_path: mount.mount_path.clone(),
            ..Default::default()
        });
    }

    for (index, (repo, dir)) in repos.iter().enumerate() {
        needs_fsgroup = true;
        let mut env = vec![
            EnvVar { name: "WORKSPACE_REPO_URL".to_string(), value: Some(repo.url.clone()), ..Default::default() },
            EnvVar { name: "WORKSPACE_REPO_DIR".to_string(), value: Some(dir.clone()), ..Default::default() },
        ];
        if let Some(branch) = &repo.branch {
            env.push(EnvVar { name: "WORKSPACE_REPO_BRANCH".to_string(), value: Some(branch.clone()), ..Default::default() });
        }
        let mut mounts = vec![VolumeMount {
            name: "workspace-root".to_string(),
            mount_path: "/workspace".to_string(),
            ..Default::default()
        }];

        if let Some(auth) = &repo.auth {
            let volume_name = format!("repo-auth-{index}");
            volumes.push(Volume {
                name: volume_name.clone(),
                secret: Some(SecretVolumeSource { secret_name: Some(auth.secret_name.clone()), ..Default::default() }),
                ..Default::default()
            });
            mounts.push(VolumeMount {
                name: volume_name,
                mount_path: "/etc/workspace-repo-auth".to_string(),
                read_only: Some(true),
                ..Default::default()
            });
            if let (Some(username_key), Some(password_key)) = (&auth.username_key, &auth.password_key) {
                env.push(EnvVar {
                    name: "REPO_AUTH_USERNAME".to_string(),
                    value_from: Some(EnvVarSource {
                        secret_key_ref: Some(SecretKeySelector {
                            name: Some(auth.secret_name.clone()),
                            key: username_key.clone(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
                env.push(EnvVar {
                    name: "REPO_AUTH_PASSWORD".to_string(),
                    value_from: Some(EnvVarSource {
                        secret_key_ref: Some(SecretKeySelector {
                            name: Some(auth.secret_name.clone()),
                            key: password_key.clone(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                });
            } else {
                let netrc_key = auth.netrc_key.clone().unwrap_or_else(|| "netrc".to_string());
                env.push(EnvVar {
                    name: "REPO_AUTH_NETRC_PATH".to_string(),
                    value: Some(format!("/etc/workspace-repo-auth/{netrc_key}")),
                    ..Default::default()
                });
            }
        }

        init_containers.push(Container {
            name: format!("repo-init-{index}"),
            image: Some("ghcr.io/workspace-orchestrator/repo-init:latest".to_string()),
            env: Some(env),
            volume_mounts: Some(mounts),
            ..Default::default()
        });
    }

    volumes.push(Volume { name: "workspace-root".to_string(), empty_dir: Some(Default::default()), ..Default::default() });
    volume_mounts.push(VolumeMount { name: "workspace-root".to_string(), mount_path: "/workspace".to_string(), ..Default::default() });

    let mut app_env: Vec<EnvVar> = workspace
        .spec
        .env
        .iter()
        .map(|(k, v)| EnvVar { name: k.clone(), value: Some(v.clone()), ..Default::default() })
        .collect();
    for mount in &workspace.spec.shared_mounts {
        app_env.push(EnvVar {
            name: format!("WORKSPACE_SHARED_MOUNT_{}_PATH", mount.name.to_uppercase()),
            value: Some(format!("{}/live", mount.mount_path)),
            ..Default::default()
        });
    }

    let mut sidecar_containers = Vec::new();
    if !workspace.spec.shared_mounts.is_empty() {
        let mounts_json = serde_json::to_string(&workspace.spec.shared_mounts).unwrap_or_default();
        let sidecar_env = vec![
            EnvVar { name: "SHARED_MOUNTS".to_string(), value: Some(mounts_json), ..Default::default() },
            EnvVar { name: "API_URL".to_string(), value: Some(ctx.config.shared_mount.api_url.clone()), ..Default::default() },
            EnvVar { name: "OWNER_ID".to_string(), value: Some(owner_hash.to_string()), ..Default::default() },
            EnvVar {
                name: "TOKEN".to_string(),
                value: Some(ctx.config.shared_mount.internal_token.clone()),
                ..Default::default()
            },
        ];
        sidecar_containers.push(Container {
            name: "shared-mount-syncer".to_string(),
            image: Some(ctx.config.shared_mount.syncer_image.clone()),
            image_pull_policy: Some(ctx.config.shared_mount.syncer_pull_policy.clone()),
            env: Some(sidecar_env),
            volume_mounts: Some(volume_mounts.clone()),
            ..Default::default()
        });
    }

    let mut app_container = Container {
        name: "workspace".to_string(),
        image: Some(workspace.spec.image.clone()),
        env: Some(app_env),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };
    if let Some(resources) = &workspace.spec.resources {
        app_container.resources = Some(build_resource_requirements(resources));
    }

    let mut containers = vec![app_container];
    containers.extend(sidecar_containers);

    let pod_spec = PodSpec {
        containers,
        init_containers: if init_containers.is_empty() { None } else { Some(init_containers) },
        volumes: Some(volumes),
        security_context: if needs_fsgroup {
            Some(k8s_openapi::api::core::v1::PodSecurityContext { fs_group: Some(2000), ..Default::default() })
        } else {
            None
        },
        ..Default::default()
    };

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: workspace.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(workspace)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector { match_labels: Some(labels.clone()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(labels.clone()), ..Default::default() }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn build_resource_requirements(resources: &workspace_types::ResourceSpec) -> ResourceRequirements {
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();
    if let Some(cpu) = &resources.cpu_request {
        requests.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(mem) = &resources.memory_request {
        requests.insert("memory".to_string(), Quantity(mem.clone()));
    }
    if let Some(cpu) = &resources.cpu_limit {
        limits.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(mem) = &resources.memory_limit {
        limits.insert("memory".to_string(), Quantity(mem.clone()));
    }
    ResourceRequirements {
        requests: if requests.is_empty() { None } else { Some(requests) },
        limits: if limits.is_empty() { None } else { Some(limits) },
        ..Default::default()
    }
}

fn build_service(workspace: &Workspace, name: &str, labels: &BTreeMap<String, String>) -> Service {
    let mut ports: Vec<ServicePort> = workspace
        .spec
        .ports
        .iter()
        .map(|p| ServicePort {
            name: Some(format!("port-{p}")),
            port: *p as i32,
            target_port: Some(IntOrString::Int(*p as i32)),
            ..Default::default()
        })
        .collect();

    if matches!(workspace.spec.ssh.as_ref(), Some(s) if s.enabled && s.mode == SshMode::Service) {
        ports.push(ServicePort {
            name: Some("ssh".to_string()),
            port: 22,
            target_port: Some(IntOrString::Int(22)),
            ..Default::default()
        });
    }

    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: workspace.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(workspace)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels.clone()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_ingress(ctx: &Context, workspace: &Workspace, name: &str, labels: &BTreeMap<String, String>) -> Result<Ingress, ReconcileError> {
    let spec = workspace
        .spec
        .ingress
        .as_ref()
        .ok_or_else(|| ReconcileError::Validation("ingress spec missing".to_string()))?;

    let mut annotations: BTreeMap<String, String> = ctx.config.ingress.annotations.clone().into_iter().collect();
    if spec.path != "/" {
        annotations.entry("nginx.ingress.kubernetes.io/rewrite-target".to_string()).or_insert("/$2".to_string());
    }

    Ok(Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: workspace.namespace(),
            labels: Some(labels.clone()),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_reference(workspace)]),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: spec.class.clone().or_else(|| ctx.config.ingress.class.clone()),
            rules: Some(vec![IngressRule {
                host: Some(spec.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(spec.path.clone()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: name.to_string(),
                                port: Some(ServiceBackendPort { number: Some(80), ..Default::default() }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn build_http_route(ctx: &Context, workspace: &Workspace, name: &str) -> Result<HTTPRoute, ReconcileError> {
    let spec = workspace
        .spec
        .ingress
        .as_ref()
        .ok_or_else(|| ReconcileError::Validation("ingress spec missing".to_string()))?;
    let gateway_name = spec.gateway_ref.clone().or_else(|| ctx.config.ingress.gateway_ref.clone())
        .ok_or_else(|| ReconcileError::Validation("gateway mode requires a gatewayRef".to_string()))?;

    let filters = if spec.path != "/" {
        vec![HttpRouteFilter {
            type_: "URLRewrite".to_string(),
            url_rewrite: Some(UrlRewrite { path: HttpPathMatch { type_: "ReplacePrefixMatch".to_string(), value: "/".to_string() } }),
        }]
    } else {
        vec![]
    };

    Ok(HTTPRoute::new(
        name,
        HttpRouteSpec {
            parent_refs: vec![ParentRef { name: gateway_name, namespace: workspace.namespace() }],
            hostnames: vec![spec.host.clone()],
            rules: vec![HttpRouteRule {
                matches: vec![HttpRouteMatch { path: HttpPathMatch { type_: "PathPrefix".to_string(), value: spec.path.clone() } }],
                backend_refs: vec![BackendRef { name: name.to_string(), port: 80 }],
                filters,
            }],
        },
    ))
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

async fn set_status_phase(
    kube: &kube::Client,
    namespace: &str,
    name: &str,
    phase: WorkspacePhase,
    expires_at: Option<chrono::DateTime<Utc>>,
) -> Result<(), kube::Error> {
    let api: Api<Workspace> = Api::namespaced(kube.clone(), namespace);
    let status = WorkspaceStatus {
        phase: Some(phase),
        expires_at,
        ..Default::default()
    };
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&patch)).await?;
    Ok(())
}

async fn set_status_error(kube: &kube::Client, namespace: &str, name: &str, message: &str) -> Result<(), kube::Error> {
    let api: Api<Workspace> = Api::namespaced(kube.clone(), namespace);
    let status = serde_json::json!({
        "status": {
            "phase": "Error",
            "conditions": [{
                "type": "Ready",
                "status": "False",
                "reason": "ValidationFailed",
                "message": message,
            }]
        }
    });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&status)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use workspace_types::Owner;

    fn base_spec() -> workspace_types::WorkspaceSpec {
        workspace_types::WorkspaceSpec {
            image: "ghcr.io/example/dev:latest".to_string(),
            owner: Owner { id: "user-1".to_string(), email: None },
            repo: None,
            repos: vec![],
            env: Default::default(),
            shared_mounts: vec![],
            ttl: None,
            resources: None,
            web_enabled: false,
            ingress: None,
            ssh: None,
            ports: vec![],
        }
    }

    #[test]
    fn validate_rejects_empty_owner() {
        let mut spec = base_spec();
        spec.owner.id = String::new();
        let workspace = Workspace::new("test", spec);
        assert!(validate(&workspace).is_err());
    }

    #[test]
    fn validate_rejects_zero_ttl() {
        let mut spec = base_spec();
        spec.ttl = Some(Duration::from_secs(0));
        let workspace = Workspace::new("test", spec);
        assert!(validate(&workspace).is_err());
    }

    #[test]
    fn validate_accepts_minimal_spec() {
        let workspace = Workspace::new("test", base_spec());
        assert!(validate(&workspace).is_ok());
    }

    #[test]
    fn owner_hash_is_deterministic() {
        assert_eq!(owner_hash("user-1"), owner_hash("user-1"));
        assert_ne!(owner_hash("user-1"), owner_hash("user-2"));
    }
}
