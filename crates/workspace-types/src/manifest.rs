use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pointer to the current revision of one shared mount. Persisted verbatim
/// as `latest.json` in the object store; field names and shape are
/// load-bearing since the sync agent and control plane exchange it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestManifest {
    pub revision: String,
    pub checksum: String,
    pub updated_at: DateTime<Utc>,
}

impl LatestManifest {
    pub fn new(revision: impl Into<String>, checksum: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            revision: revision.into(),
            checksum: checksum.into(),
            updated_at,
        }
    }
}

/// Compare-and-swap precondition carried by a `PUT latest` request's
/// `If-Match` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfMatch {
    /// No header was supplied: only create, never overwrite.
    Absent,
    /// `If-Match: *`: same "only create" rule as absent, spelled explicitly.
    Any,
    /// `If-Match: <revision>`: overwrite iff the current revision matches.
    Revision(String),
}

impl IfMatch {
    pub fn parse(header: Option<&str>) -> Self {
        match header {
            None => IfMatch::Absent,
            Some("") | Some("*") => IfMatch::Any,
            Some(rev) => IfMatch::Revision(rev.to_string()),
        }
    }

    /// Whether a write is permitted given the current manifest, if any.
    pub fn permits(&self, current: Option<&LatestManifest>) -> bool {
        match self {
            IfMatch::Absent | IfMatch::Any => current.is_none(),
            IfMatch::Revision(expected) => current.map(|m| &m.revision == expected).unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(revision: &str) -> LatestManifest {
        LatestManifest::new(revision, "sha256:deadbeef", Utc::now())
    }

    #[test]
    fn absent_if_match_permits_only_when_none_exists() {
        assert!(IfMatch::parse(None).permits(None));
        assert!(!IfMatch::parse(None).permits(Some(&manifest("r1"))));
    }

    #[test]
    fn star_if_match_behaves_like_absent() {
        assert!(IfMatch::parse(Some("*")).permits(None));
        assert!(!IfMatch::parse(Some("*")).permits(Some(&manifest("r1"))));
    }

    #[test]
    fn empty_if_match_behaves_like_absent() {
        assert!(IfMatch::parse(Some("")).permits(None));
        assert!(!IfMatch::parse(Some("")).permits(Some(&manifest("r1"))));
    }

    #[test]
    fn revision_if_match_requires_exact_match() {
        let current = manifest("r1");
        assert!(IfMatch::parse(Some("r1")).permits(Some(&current)));
        assert!(!IfMatch::parse(Some("r2")).permits(Some(&current)));
        assert!(!IfMatch::parse(Some("r1")).permits(None));
    }
}
