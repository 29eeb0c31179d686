use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::server::Server;

/// Gates the internal shared-mount endpoints behind a single static
/// bearer token, compared in constant time so response latency doesn't
/// leak how many prefix bytes matched, and then checks that the path's
/// `(owner, mount)` is one the caller is actually allowed to touch: either
/// statically configured, or referenced by a Workspace owned by `owner`.
pub async fn require_internal_token(
    State(server): State<Server>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let expected = server.config.shared_mount.internal_token.as_str();
    let token_ok = matches!(header, Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()));
    if !token_ok {
        return Err(ApiError::Unauthenticated);
    }

    let (mut parts, body) = request.into_parts();
    let Path(params) = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &server)
        .await
        .map_err(|_| ApiError::Upstream(anyhow::anyhow!("malformed shared-mount path")))?;
    let owner = params.get("owner").map(String::as_str).unwrap_or_default();
    let mount = params.get("mount").map(String::as_str).unwrap_or_default();

    if !server.shared_mount_is_authorized(owner, mount).await? {
        return Err(ApiError::Forbidden(format!("mount '{mount}' is not registered for owner '{owner}'")));
    }

    let request = Request::from_parts(parts, body);
    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
