use std::time::Duration;

use reqwest::StatusCode;
use workspace_types::LatestManifest;

/// Thin HTTP client for the control plane's shared-mount API, mirroring the
/// request shapes `shared_mount::routes` on the operator side expects:
/// bearer-token auth, `If-Match` compare-and-swap on publish, and a
/// `wait_seconds` long-poll query parameter on fetch.
#[derive(Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    owner: String,
    token: String,
}

#[derive(Debug)]
pub enum LatestResult {
    Found(LatestManifest),
    NotFound,
    Unchanged,
}

impl ControlPlaneClient {
    pub fn new(base_url: String, owner: String, token: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(150)).build()?;
        Ok(ControlPlaneClient { http, base_url, owner, token })
    }

    fn mount_url(&self, mount: &str, suffix: &str) -> String {
        format!("{}/owner/{}/{}{}", self.base_url.trim_end_matches('/'), self.owner, mount, suffix)
    }

    pub async fn get_latest(
        &self,
        mount: &str,
        wait_seconds: Option<u64>,
        if_none_match_revision: Option<&str>,
    ) -> anyhow::Result<LatestResult> {
        let mut url = self.mount_url(mount, "/latest");
        let mut query = Vec::new();
        if let Some(wait) = wait_seconds {
            query.push(format!("wait_seconds={wait}"));
        }
        if let Some(rev) = if_none_match_revision {
            query.push(format!("if_none_match_revision={rev}"));
        }
        if !query.is_empty() {
            url = format!("{url}?{}", query.join("&"));
        }

        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        match response.status() {
            StatusCode::OK => {
                let body: serde_json::Value = response.json().await?;
                let manifest: LatestManifest = serde_json::from_value(body["data"].clone())?;
                Ok(LatestResult::Found(manifest))
            }
            StatusCode::NOT_MODIFIED => Ok(LatestResult::Unchanged),
            StatusCode::NOT_FOUND => Ok(LatestResult::NotFound),
            other => Err(anyhow::anyhow!("unexpected status {other} fetching latest for mount {mount}")),
        }
    }

    pub async fn put_latest(&self, mount: &str, manifest: &LatestManifest, if_match: &str) -> anyhow::Result<bool> {
        let url = self.mount_url(mount, "/latest");
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .header("if-match", if_match)
            .json(manifest)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            other => Err(anyhow::anyhow!("unexpected status {other} publishing latest for mount {mount}")),
        }
    }

    pub async fn get_revision(&self, mount: &str, revision: &str) -> anyhow::Result<Vec<u8>> {
        let url = self.mount_url(mount, &format!("/revisions/{revision}"));
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        if response.status() != StatusCode::OK {
            return Err(anyhow::anyhow!("unexpected status {} fetching revision {revision}", response.status()));
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn put_revision(&self, mount: &str, revision: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        let url = self.mount_url(mount, &format!("/revisions/{revision}"));
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .header("content-type", "application/gzip")
            .body(bytes)
            .send()
            .await?;
        if response.status() != StatusCode::CREATED {
            return Err(anyhow::anyhow!("unexpected status {} publishing revision {revision}", response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_url_joins_base_and_suffix() {
        let client = ControlPlaneClient::new(
            "http://example.com/internal/v1/shared-mounts/".to_string(),
            "owner-1".to_string(),
            "token".to_string(),
        )
        .unwrap();
        assert_eq!(
            client.mount_url("configs", "/latest"),
            "http://example.com/internal/v1/shared-mounts/owner/owner-1/configs/latest"
        );
    }
}
