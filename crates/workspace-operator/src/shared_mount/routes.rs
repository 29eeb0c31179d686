use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use workspace_types::{IfMatch, LatestManifest};

use crate::error::{ApiError, ApiResult};
use crate::server::jsend::Success;
use crate::shared_mount::notify::{long_poll, WaitOutcome};
use crate::shared_mount::SharedMountState;

#[derive(Deserialize)]
pub struct LatestQuery {
    #[serde(default)]
    pub wait_seconds: Option<u64>,
    #[serde(default)]
    pub if_none_match_revision: Option<String>,
}

pub async fn get_latest(
    State(state): State<Arc<SharedMountState>>,
    Path((owner, mount)): Path<(String, String)>,
    Query(query): Query<LatestQuery>,
) -> ApiResult<Response> {
    if let Some(wait) = query.wait_seconds {
        let outcome = long_poll(
            &state.notifier,
            &owner,
            &mount,
            query.if_none_match_revision.as_deref(),
            wait,
            || async {
                state
                    .store
                    .get_manifest(&owner, &mount)
                    .await
                    .ok()
                    .flatten()
            },
        )
        .await;
        return Ok(match outcome {
            WaitOutcome::Updated(manifest) => Success::ok(manifest).into_response(),
            WaitOutcome::Unchanged => StatusCode::NOT_MODIFIED.into_response(),
            WaitOutcome::NotFound => {
                ApiError::Types(workspace_types::Error::not_found("no manifest published yet")).into_response()
            }
        });
    }

    let manifest = state
        .store
        .get_manifest(&owner, &mount)
        .await
        .map_err(|e| ApiError::Upstream(e.into()))?;
    match manifest {
        Some(manifest) => Ok(Success::ok(manifest).into_response()),
        None => Err(ApiError::Types(workspace_types::Error::not_found("no manifest published yet"))),
    }
}

pub async fn put_latest(
    State(state): State<Arc<SharedMountState>>,
    Path((owner, mount)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let mut manifest: LatestManifest =
        serde_json::from_slice(&body).map_err(|e| workspace_types::Error::validation(e.to_string()))?;
    manifest.updated_at = Utc::now();

    let if_match = IfMatch::parse(headers.get("if-match").and_then(|v| v.to_str().ok()));
    let current = state
        .store
        .get_manifest(&owner, &mount)
        .await
        .map_err(|e| ApiError::Upstream(e.into()))?;

    if !if_match.permits(current.as_ref()) {
        return Err(ApiError::Types(workspace_types::Error::conflict(
            "latest manifest has moved since If-Match was captured",
        )));
    }

    state
        .store
        .put_manifest(&owner, &mount, &manifest)
        .await
        .map_err(|e| ApiError::Upstream(e.into()))?;
    state.notifier.notify(&owner, &mount).await;

    Ok(Success::ok(manifest).into_response())
}

pub async fn get_revision(
    State(state): State<Arc<SharedMountState>>,
    Path((owner, mount, revision)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let bytes = state
        .store
        .get_revision(&owner, &mount, &revision)
        .await
        .map_err(|_| ApiError::Types(workspace_types::Error::not_found("revision not found")))?;
    Ok(([("content-type", "application/gzip")], bytes).into_response())
}

pub async fn put_revision(
    State(state): State<Arc<SharedMountState>>,
    Path((owner, mount, revision)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult<Response> {
    if body.len() as u64 > state.max_bundle_bytes {
        return Err(workspace_types::Error::validation("bundle exceeds configured size limit").into());
    }
    state
        .store
        .put_revision(&owner, &mount, &revision, &body)
        .await
        .map_err(|e| ApiError::Upstream(e.into()))?;
    Ok(StatusCode::CREATED.into_response())
}
