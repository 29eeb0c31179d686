use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, AuthMode};
use crate::error::ApiError;
use crate::server::Server;

/// Authenticated caller identity, extracted per-request by the configured
/// auth mode. Concrete JWKS validation is out of scope here: `bearer` mode
/// checks a static shared-secret table, `header` mode trusts an upstream
/// proxy to have already authenticated the caller and forwarded identity
/// headers, matching how the rest of this design treats the external auth
/// layer as a collaborator specified only by its interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[axum::async_trait]
impl FromRequestParts<Server> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Server) -> Result<Self, Self::Rejection> {
        authenticate(&state.config.auth, parts)
    }
}

fn authenticate(config: &AuthConfig, parts: &Parts) -> Result<Principal, ApiError> {
    match config.mode {
        AuthMode::None => Ok(Principal {
            id: "anonymous".to_string(),
            email: None,
            teams: vec![],
            is_admin: true,
        }),
        AuthMode::Header => {
            let id = header_str(parts, &config.header_id).ok_or(ApiError::Unauthenticated)?;
            let email = header_str(parts, &config.header_email);
            let teams = header_str(parts, &config.header_teams)
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default();
            Ok(Principal {
                id,
                email,
                teams,
                is_admin: false,
            })
        }
        AuthMode::Bearer => {
            let token = bearer_token(parts).ok_or(ApiError::Unauthenticated)?;
            let id = config
                .bearer_tokens
                .iter()
                .find(|(_, v)| v.as_str() == token)
                .map(|(k, _)| k.clone())
                .ok_or(ApiError::Unauthenticated)?;
            Ok(Principal {
                id,
                email: None,
                teams: vec![],
                is_admin: false,
            })
        }
        AuthMode::Auto => {
            if let Some(token) = bearer_token(parts) {
                let id = config
                    .bearer_tokens
                    .iter()
                    .find(|(_, v)| v.as_str() == token)
                    .map(|(k, _)| k.clone())
                    .ok_or(ApiError::Unauthenticated)?;
                Ok(Principal { id, email: None, teams: vec![], is_admin: false })
            } else {
                let id = header_str(parts, &config.header_id).ok_or(ApiError::Unauthenticated)?;
                Ok(Principal { id, email: None, teams: vec![], is_admin: false })
            }
        }
    }
}

fn header_str(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}
