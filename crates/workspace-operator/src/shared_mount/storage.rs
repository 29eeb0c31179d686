use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use workspace_types::LatestManifest;

/// Object-store adapter for shared-mount bundles and manifests. Trait-seamed
/// the way the registry blob store is, so a future S3-compatible backend
/// can be swapped in without touching the control-plane routes.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_manifest(&self, owner: &str, mount: &str) -> Result<Option<LatestManifest>, Error>;
    async fn put_manifest(&self, owner: &str, mount: &str, manifest: &LatestManifest) -> Result<(), Error>;
    async fn get_revision(&self, owner: &str, mount: &str, revision: &str) -> Result<Vec<u8>, Error>;
    async fn put_revision(&self, owner: &str, mount: &str, revision: &str, bytes: &[u8]) -> Result<(), Error>;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("manifest not found for {0}/{1}")]
    ManifestNotFound(String, String),
    #[error("revision not found: {0}/{1}/{2}")]
    RevisionNotFound(String, String, String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Filesystem-backed store laid out as
/// `<root>/owner/<owner>/<mount>/{latest.json,revisions/<revision>.tar.gz}`.
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FilesystemObjectStore { root: root.into() }
    }

    fn mount_dir(&self, owner: &str, mount: &str) -> PathBuf {
        self.root.join("owner").join(owner).join(mount)
    }

    fn manifest_path(&self, owner: &str, mount: &str) -> PathBuf {
        self.mount_dir(owner, mount).join("latest.json")
    }

    fn revision_path(&self, owner: &str, mount: &str, revision: &str) -> PathBuf {
        self.mount_dir(owner, mount)
            .join("revisions")
            .join(format!("{revision}.tar.gz"))
    }
}

#[async_trait::async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn get_manifest(&self, owner: &str, mount: &str) -> Result<Option<LatestManifest>, Error> {
        let path = self.manifest_path(owner, mount);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_manifest(&self, owner: &str, mount: &str, manifest: &LatestManifest) -> Result<(), Error> {
        let dir = self.mount_dir(owner, mount);
        tokio::fs::create_dir_all(&dir).await?;
        let path = self.manifest_path(owner, mount);
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(manifest)?;
        write_atomic(&tmp_path, &path, &bytes).await?;
        Ok(())
    }

    async fn get_revision(&self, owner: &str, mount: &str, revision: &str) -> Result<Vec<u8>, Error> {
        let path = self.revision_path(owner, mount, revision);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::RevisionNotFound(owner.to_string(), mount.to_string(), revision.to_string())
            } else {
                Error::Io(e)
            }
        })
    }

    async fn put_revision(&self, owner: &str, mount: &str, revision: &str, bytes: &[u8]) -> Result<(), Error> {
        let dir = self.mount_dir(owner, mount).join("revisions");
        tokio::fs::create_dir_all(&dir).await?;
        let path = self.revision_path(owner, mount, revision);
        let tmp_path = path.with_extension("tar.gz.tmp");
        write_atomic(&tmp_path, &path, bytes).await?;
        Ok(())
    }
}

async fn write_atomic(tmp_path: &Path, final_path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    tokio::fs::rename(tmp_path, final_path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn manifest_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemObjectStore::new(dir.path());
        assert!(store.get_manifest("owner-a", "mount-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn manifest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemObjectStore::new(dir.path());
        let manifest = LatestManifest::new("r1", "sha256:abc", Utc::now());
        store.put_manifest("owner-a", "mount-a", &manifest).await.unwrap();
        let fetched = store.get_manifest("owner-a", "mount-a").await.unwrap().unwrap();
        assert_eq!(fetched.revision, "r1");
    }

    #[tokio::test]
    async fn revision_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemObjectStore::new(dir.path());
        store.put_revision("owner-a", "mount-a", "r1", b"bundle-bytes").await.unwrap();
        let fetched = store.get_revision("owner-a", "mount-a", "r1").await.unwrap();
        assert_eq!(fetched, b"bundle-bytes");
    }

    #[tokio::test]
    async fn missing_revision_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemObjectStore::new(dir.path());
        assert!(store.get_revision("owner-a", "mount-a", "missing").await.is_err());
    }
}
