use std::path::{Component, Path, PathBuf};

use crate::crd::{Repo, SharedMountSpec, WorkspaceSpec};
use crate::error::{Error, Result};

pub const WORKSPACE_ROOT: &str = "/workspace";

/// Lexically normalizes a path (no filesystem access), collapsing `.` and
/// resolving `..` against the components seen so far. A leading `..` that
/// would escape the root is an error, which callers use to reject escapes.
fn normalize(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return Err(Error::validation("path escapes root via '..'"));
                }
            }
            Component::Normal(part) => out.push(part),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::Prefix(_) => return Err(Error::validation("unsupported path prefix")),
        }
    }
    Ok(out)
}

/// Derives the basename a repo would check out to, from its URL, stripping
/// a trailing `.git`, query string, and fragment, and handling the
/// `user@host:path` scp-like form in addition to plain URLs.
fn repo_basename(url: &str) -> Result<String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);

    let path_part = if let Some(idx) = without_query.find("://") {
        &without_query[idx + 3..]
    } else if let Some(idx) = without_query.find(':') {
        // scp-like form, e.g. git@host:org/repo.git
        if without_query[..idx].contains('/') {
            without_query
        } else {
            &without_query[idx + 1..]
        }
    } else {
        without_query
    };

    let last = path_part
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    let stripped = last.strip_suffix(".git").unwrap_or(last);

    if stripped.is_empty() {
        return Err(Error::validation(format!("cannot derive directory name from repo url {url}")));
    }
    Ok(stripped.to_string())
}

/// Resolves the absolute checkout directory for one repo in a workspace
/// spec's repo list. Invariant: the result is always absolute, normalized,
/// and rooted under `/workspace`.
pub fn resolve_repo_dir(repo: &Repo, index: usize, total: usize) -> Result<String> {
    let requested = match &repo.dir {
        Some(dir) => dir.clone(),
        None if total == 1 => repo_basename(&repo.url)?,
        None => format!("repo-{}", index + 1),
    };

    let candidate = if requested.starts_with('/') {
        PathBuf::from(&requested)
    } else {
        Path::new(WORKSPACE_ROOT).join(&requested)
    };

    let normalized = normalize(&candidate)?;
    if !normalized.starts_with(WORKSPACE_ROOT) {
        return Err(Error::validation(format!(
            "repo dir {requested} resolves outside of {WORKSPACE_ROOT}"
        )));
    }
    Ok(normalized.to_string_lossy().into_owned())
}

/// Validates the mutual-exclusivity and per-workspace invariants of the
/// spec's repo fields and returns the effective, fully-resolved repo list.
pub fn resolve_repos(spec: &WorkspaceSpec) -> Result<Vec<(Repo, String)>> {
    if spec.repo.is_some() && !spec.repos.is_empty() {
        return Err(Error::validation("'repo' and 'repos' are mutually exclusive"));
    }

    let repos: Vec<Repo> = if let Some(single) = &spec.repo {
        vec![single.clone()]
    } else {
        spec.repos.clone()
    };

    let total = repos.len();
    repos
        .into_iter()
        .enumerate()
        .map(|(i, repo)| {
            let dir = resolve_repo_dir(&repo, i, total)?;
            Ok((repo, dir))
        })
        .collect()
}

/// Rejects shared-mount sets with duplicate names or pairwise path overlap
/// (one mount path being a path-component prefix of another).
pub fn validate_mounts(mounts: &[SharedMountSpec]) -> Result<()> {
    let mut seen_names = std::collections::HashSet::new();
    for mount in mounts {
        if mount.name.contains('/') {
            return Err(Error::validation(format!("mount name {} must not contain '/'", mount.name)));
        }
        if !seen_names.insert(mount.name.as_str()) {
            return Err(Error::validation(format!("duplicate shared mount name {}", mount.name)));
        }
        if !mount.mount_path.starts_with('/') || mount.mount_path == "/" {
            return Err(Error::validation(format!(
                "mount path {} must be absolute and non-root",
                mount.mount_path
            )));
        }
        if mount.scope != crate::crd::MountScope::Owner {
            return Err(Error::validation(format!(
                "shared mount scope {:?} is not yet supported",
                mount.scope
            )));
        }
    }

    for (i, a) in mounts.iter().enumerate() {
        for b in mounts.iter().skip(i + 1) {
            if path_prefix_overlap(&a.mount_path, &b.mount_path) {
                return Err(Error::validation(format!(
                    "shared mount paths overlap: {} and {}",
                    a.mount_path, b.mount_path
                )));
            }
        }
    }
    Ok(())
}

fn path_prefix_overlap(a: &str, b: &str) -> bool {
    let a_comp: Vec<_> = Path::new(a).components().collect();
    let b_comp: Vec<_> = Path::new(b).components().collect();
    let len = a_comp.len().min(b_comp.len());
    a_comp[..len] == b_comp[..len]
}

/// Stable 12-hex-character identifier for a mount, used as a volume name
/// suffix so renaming a mount's path never collides with another's volume.
pub fn mount_volume_name(mount_name: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(mount_name.as_bytes());
    format!("shared-mount-{}", hex::encode(&digest[..3]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{MountMode, MountScope, SyncMode};

    fn mount(name: &str, path: &str) -> SharedMountSpec {
        SharedMountSpec {
            name: name.to_string(),
            scope: MountScope::Owner,
            mount_path: path.to_string(),
            mode: MountMode::ReadOnly,
            sync_mode: SyncMode::Poll,
            poll_seconds: 5,
            publish_seconds: 10,
        }
    }

    #[test]
    fn single_repo_infers_basename() {
        let repo = Repo {
            url: "https://example.com/org/name.git".into(),
            dir: None,
            branch: None,
            revision: None,
            depth: None,
            submodules: false,
            auth: None,
        };
        assert_eq!(resolve_repo_dir(&repo, 0, 1).unwrap(), "/workspace/name");
    }

    #[test]
    fn scp_like_url_infers_basename() {
        let repo = Repo {
            url: "git@example.com:org/name.git".into(),
            dir: None,
            branch: None,
            revision: None,
            depth: None,
            submodules: false,
            auth: None,
        };
        assert_eq!(resolve_repo_dir(&repo, 0, 1).unwrap(), "/workspace/name");
    }

    #[test]
    fn multiple_repos_without_dir_get_indexed_names() {
        let repo = Repo {
            url: "https://example.com/org/name.git".into(),
            dir: None,
            branch: None,
            revision: None,
            depth: None,
            submodules: false,
            auth: None,
        };
        assert_eq!(resolve_repo_dir(&repo, 1, 2).unwrap(), "/workspace/repo-2");
    }

    #[test]
    fn repo_dir_rejects_escape() {
        let repo = Repo {
            url: "https://example.com/org/name.git".into(),
            dir: Some("../../etc".into()),
            branch: None,
            revision: None,
            depth: None,
            submodules: false,
            auth: None,
        };
        assert!(resolve_repo_dir(&repo, 0, 1).is_err());
    }

    #[test]
    fn overlapping_mounts_rejected() {
        let mounts = vec![mount("a", "/mnt/shared"), mount("b", "/mnt/shared/sub")];
        assert!(validate_mounts(&mounts).is_err());
    }

    #[test]
    fn disjoint_mounts_accepted() {
        let mounts = vec![mount("a", "/mnt/shared-a"), mount("b", "/mnt/shared-b")];
        assert!(validate_mounts(&mounts).is_ok());
    }

    #[test]
    fn duplicate_names_rejected() {
        let mounts = vec![mount("a", "/mnt/one"), mount("a", "/mnt/two")];
        assert!(validate_mounts(&mounts).is_err());
    }
}
