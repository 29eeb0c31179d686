use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use serde::Deserialize;
use workspace_types::{Workspace, WorkspaceSpec};

use crate::client::FIELD_MANAGER;
use crate::error::{ApiError, ApiResult};
use crate::server::{Principal, Server};

const ADJECTIVES: &[&str] = &["brave", "calm", "eager", "gentle", "lucky", "quiet", "swift", "bold"];
const NOUNS: &[&str] = &["otter", "falcon", "cedar", "harbor", "comet", "maple", "ridge", "delta"];

fn random_name(rng_seed: u32, with_extra_noun: bool) -> String {
    let adjective = ADJECTIVES[rng_seed as usize % ADJECTIVES.len()];
    let noun = NOUNS[(rng_seed / 7) as usize % NOUNS.len()];
    if with_extra_noun {
        let extra = NOUNS[(rng_seed / 13) as usize % NOUNS.len()];
        format!("{adjective}-{noun}-{extra}")
    } else {
        format!("{adjective}-{noun}")
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub namespace: Option<String>,
}

pub async fn list_workspaces(
    State(server): State<Server>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let namespace = query.namespace.unwrap_or_else(|| server.config.namespace.clone());
    let api: Api<Workspace> = Api::namespaced(server.client.kube.clone(), &namespace);
    let list = api.list(&ListParams::default()).await.map_err(|e| ApiError::Upstream(e.into()))?;

    let filtered: Vec<Workspace> = list
        .items
        .into_iter()
        .filter(|w| principal.is_admin || w.spec.owner.id == principal.id)
        .collect();

    Ok(Json(serde_json::json!({ "status": "success", "data": filtered })))
}

#[derive(Deserialize)]
pub struct CreateWorkspaceRequest {
    #[serde(flatten)]
    pub spec: WorkspaceSpec,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

pub async fn create_workspace(
    State(server): State<Server>,
    principal: Principal,
    Json(mut request): Json<CreateWorkspaceRequest>,
) -> ApiResult<Response> {
    request.spec.owner.id = principal.id.clone();
    workspace_types::validate::resolve_repos(&request.spec)?;
    workspace_types::validate::validate_mounts(&request.spec.shared_mounts)?;

    let namespace = request.namespace.unwrap_or_else(|| server.config.namespace.clone());
    let api: Api<Workspace> = Api::namespaced(server.client.kube.clone(), &namespace);

    if let Some(name) = request.name {
        let workspace = Workspace::new(&name, request.spec);
        let created = api
            .create(&PostParams::default(), &workspace)
            .await
            .map_err(|e| ApiError::Upstream(e.into()))?;
        return Ok(created_response(created));
    }

    for attempt in 0..12u32 {
        let name = random_name(attempt, false);
        let workspace = Workspace::new(&name, request.spec.clone());
        match api.create(&PostParams::default(), &workspace).await {
            Ok(created) => return Ok(created_response(created)),
            Err(kube::Error::Api(e)) if e.code == 409 => continue,
            Err(e) => return Err(ApiError::Upstream(e.into())),
        }
    }
    for attempt in 0..8u32 {
        let name = random_name(attempt * 17, true);
        let workspace = Workspace::new(&name, request.spec.clone());
        match api.create(&PostParams::default(), &workspace).await {
            Ok(created) => return Ok(created_response(created)),
            Err(kube::Error::Api(e)) if e.code == 409 => continue,
            Err(e) => return Err(ApiError::Upstream(e.into())),
        }
    }

    Err(ApiError::Upstream(anyhow::anyhow!("exhausted name generation attempts")))
}

fn created_response(workspace: Workspace) -> Response {
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "status": "success", "data": workspace })),
    )
        .into_response()
}

pub async fn get_workspace(
    State(server): State<Server>,
    principal: Principal,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let workspace = server.authorize_owner(&principal, &server.config.namespace, &name).await?;
    Ok(Json(serde_json::json!({ "status": "success", "data": workspace })))
}

pub async fn delete_workspace(
    State(server): State<Server>,
    principal: Principal,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    server.authorize_owner(&principal, &server.config.namespace, &name).await?;
    let api: Api<Workspace> = Api::namespaced(server.client.kube.clone(), &server.config.namespace);
    api.delete(&name, &DeleteParams::default()).await.map_err(|e| ApiError::Upstream(e.into()))?;
    Ok(Json(serde_json::json!({ "status": "success", "data": serde_json::Value::Null })))
}

/// Fields a caller may PATCH post-creation. Anything else on the spec
/// (owner, in particular) is immutable from this endpoint.
#[derive(Deserialize)]
pub struct UserConfigPatch {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub repo: Option<workspace_types::Repo>,
    #[serde(default)]
    pub env: Option<std::collections::BTreeMap<String, String>>,
    #[serde(default, with = "humantime_serde::option")]
    pub ttl: Option<std::time::Duration>,
    #[serde(default)]
    pub resources: Option<workspace_types::ResourceSpec>,
    #[serde(default)]
    pub shared_mounts: Option<Vec<workspace_types::SharedMountSpec>>,
}

pub async fn patch_user_config(
    State(server): State<Server>,
    principal: Principal,
    Path(name): Path<String>,
    Json(patch): Json<UserConfigPatch>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut workspace = server.authorize_owner(&principal, &server.config.namespace, &name).await?;

    if let Some(image) = patch.image {
        workspace.spec.image = image;
    }
    if let Some(repo) = patch.repo {
        workspace.spec.repo = Some(repo);
    }
    if let Some(env) = patch.env {
        workspace.spec.env = env;
    }
    if let Some(ttl) = patch.ttl {
        workspace.spec.ttl = Some(ttl);
    }
    if let Some(resources) = patch.resources {
        workspace.spec.resources = Some(resources);
    }
    if let Some(mounts) = patch.shared_mounts {
        workspace_types::validate::validate_mounts(&mounts)?;
        workspace.spec.shared_mounts = mounts;
    }

    let api: Api<Workspace> = Api::namespaced(server.client.kube.clone(), &server.config.namespace);
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let updated = api
        .patch(&name, &params, &Patch::Apply(&workspace))
        .await
        .map_err(|e| ApiError::Upstream(e.into()))?;

    Ok(Json(serde_json::json!({ "status": "success", "data": updated })))
}
