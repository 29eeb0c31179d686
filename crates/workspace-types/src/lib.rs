pub mod bundle;
pub mod crd;
pub mod error;
pub mod manifest;
pub mod validate;

pub use crd::{
    Condition, IngressMode, IngressSpec, MountMode, MountScope, Owner, Repo, RepoAuth,
    ResourceSpec, SharedMountSpec, SshMode, SshSpec, SyncMode, Workspace, WorkspacePhase,
    WorkspaceSpec, WorkspaceStatus,
};
pub use error::{Error, Result};
pub use manifest::{IfMatch, LatestManifest};
