//! Deterministic tar+gzip bundling and extraction for shared-mount content.
//!
//! Grounded on the same "hash while you write, verify before you commit"
//! shape used for blob uploads in the object-store adapter, adapted from a
//! single-shot upload to a whole-directory snapshot.

use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Top-level entries a bundle or sync loop must never touch: staging
/// directories and the legacy control-entry names they replaced.
pub fn is_control_entry(name: &str) -> bool {
    name.starts_with(".incoming-") || name == "current" || name == "live"
}

/// Walks `root`, tars every regular file and relative symlink it contains
/// (skipping [`is_control_entry`] top-level names), gzips the result, and
/// returns the bundle bytes alongside its `sha256:`-prefixed checksum.
///
/// Group-write bit is not part of the hashed metadata: only file contents,
/// paths, and the regular/symlink type enter the digest, so toggling the
/// group-write bit in place never changes the checksum.
pub fn bundle(root: &Path) -> Result<(Vec<u8>, String)> {
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Upstream(e.into()))?;
        let rel = entry.path().strip_prefix(root).unwrap();
        if let Some(top) = rel.components().next() {
            if let Component::Normal(name) = top {
                if is_control_entry(&name.to_string_lossy()) {
                    continue;
                }
            }
        }
        let file_type = entry.file_type();
        if file_type.is_dir() || file_type.is_file() || file_type.is_symlink() {
            entries.push(entry.path().to_path_buf());
        }
    }

    let mut hasher = Sha256::new();
    let mut hashed_bytes = Vec::new();
    {
        let mut tar_builder = tar::Builder::new(&mut hashed_bytes);
        for path in &entries {
            let rel = path.strip_prefix(root).unwrap();
            let metadata = fs::symlink_metadata(path)?;
            if metadata.file_type().is_symlink() {
                let target = fs::read_link(path)?;
                validate_symlink_target(&target)?;
                hasher.update(rel.to_string_lossy().as_bytes());
                hasher.update(b"\0symlink\0");
                hasher.update(target.to_string_lossy().as_bytes());

                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                tar_builder
                    .append_link(&mut header, rel, &target)
                    .map_err(Error::Io)?;
            } else if metadata.is_dir() {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o2775);
                header.set_size(0);
                tar_builder
                    .append_data(&mut header, rel, io::empty())
                    .map_err(Error::Io)?;
            } else {
                let mut file = fs::File::open(path)?;
                let mut contents = Vec::new();
                file.read_to_end(&mut contents)?;

                hasher.update(rel.to_string_lossy().as_bytes());
                hasher.update(b"\0file\0");
                hasher.update(&contents);

                let mut header = tar::Header::new_gnu();
                header.set_size(contents.len() as u64);
                header.set_mode(metadata.permissions().mode() & 0o777);
                header.set_mtime(metadata.mtime() as u64);
                tar_builder
                    .append_data(&mut header, rel, contents.as_slice())
                    .map_err(Error::Io)?;
            }
        }
        tar_builder.finish().map_err(Error::Io)?;
    }

    let checksum = format!("sha256:{}", hex::encode(hasher.finalize()));

    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&hashed_bytes)?;
    let compressed = gz.finish()?;

    Ok((compressed, checksum))
}

fn validate_symlink_target(target: &Path) -> Result<()> {
    if target.is_absolute() {
        return Err(Error::validation(format!(
            "refusing to bundle absolute symlink target {}",
            target.display()
        )));
    }
    let mut depth: i64 = 0;
    for component in target.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(Error::validation(format!(
                        "refusing to bundle symlink escaping root: {}",
                        target.display()
                    )));
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            _ => {
                return Err(Error::validation(format!(
                    "refusing to bundle unsupported symlink target {}",
                    target.display()
                )));
            }
        }
    }
    Ok(())
}

/// Extracts a gzip+tar bundle into `dest`, which must already exist.
/// Rejects any entry whose path normalizes outside `dest`, and any symlink
/// that is absolute or whose target escapes `dest`. On success, restores
/// file and directory mtimes by applying them in descending path-length
/// order, so later (shorter, i.e. parent-directory) mtime restorations are
/// not clobbered by extracting their children afterward.
pub fn extract(bundle_bytes: &[u8], dest: &Path) -> Result<()> {
    let decoder = GzDecoder::new(bundle_bytes);
    let mut archive = tar::Archive::new(decoder);

    let mut mtimes: Vec<(PathBuf, u64)> = Vec::new();

    for entry in archive.entries().map_err(Error::Io)? {
        let mut entry = entry.map_err(Error::Io)?;
        let rel_path = entry.path().map_err(Error::Io)?.into_owned();
        let target_path = safe_join(dest, &rel_path)?;

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs::create_dir_all(&target_path)?;
            }
            tar::EntryType::Symlink => {
                let link_name = entry
                    .link_name()
                    .map_err(Error::Io)?
                    .ok_or_else(|| Error::validation("symlink entry missing link target"))?
                    .into_owned();
                validate_symlink_target(&link_name)?;
                if target_path.exists() || target_path.symlink_metadata().is_ok() {
                    fs::remove_file(&target_path).ok();
                }
                if let Some(parent) = target_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                symlink(&link_name, &target_path)?;
            }
            tar::EntryType::Regular => {
                if let Some(parent) = target_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mtime = entry.header().mtime().unwrap_or(0);
                entry.unpack(&target_path).map_err(Error::Io)?;
                let mut perms = fs::metadata(&target_path)?.permissions();
                perms.set_mode(perms.mode() | 0o020);
                fs::set_permissions(&target_path, perms)?;
                mtimes.push((target_path, mtime));
            }
            other => {
                return Err(Error::validation(format!("unsupported tar entry type {other:?}")));
            }
        }
    }

    mtimes.sort_by_key(|(path, _)| std::cmp::Reverse(path.as_os_str().len()));
    for (path, mtime) in mtimes {
        let time = UNIX_EPOCH + Duration::from_secs(mtime);
        let _ = filetime_set(&path, time);
    }

    Ok(())
}

fn filetime_set(path: &Path, time: SystemTime) -> io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path)?;
    let accessed = fs::metadata(path)?.accessed().unwrap_or(time);
    // Only mtime affects checksum stability goals; atime is left as observed.
    let _ = accessed;
    file.set_modified(time)
}

/// Lexically joins `rel` under `dest`, refusing any component that would
/// walk the result outside of `dest`.
fn safe_join(dest: &Path, rel: &Path) -> Result<PathBuf> {
    let mut out = dest.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::validation(format!(
                    "refusing to extract entry escaping destination: {}",
                    rel.display()
                )));
            }
        }
    }
    if !out.starts_with(dest) {
        return Err(Error::validation(format!(
            "refusing to extract entry escaping destination: {}",
            rel.display()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink as unix_symlink;
    use tempfile::tempdir;

    #[test]
    fn round_trip_preserves_file_contents() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join("sub")).unwrap();
        fs::write(src.path().join("a.txt"), b"hello").unwrap();
        fs::write(src.path().join("sub/b.txt"), b"world").unwrap();

        let (bytes, checksum) = bundle(src.path()).unwrap();
        assert!(checksum.starts_with("sha256:"));

        let dest = tempdir().unwrap();
        extract(&bytes, dest.path()).unwrap();

        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(dest.path().join("sub/b.txt")).unwrap(), b"world");
    }

    #[test]
    fn checksum_is_stable_across_group_write_bit() {
        let src = tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"hello").unwrap();
        let (_, checksum_before) = bundle(src.path()).unwrap();

        let mut perms = fs::metadata(src.path().join("a.txt")).unwrap().permissions();
        perms.set_mode(perms.mode() | 0o020);
        fs::set_permissions(src.path().join("a.txt"), perms).unwrap();

        let (_, checksum_after) = bundle(src.path()).unwrap();
        assert_eq!(checksum_before, checksum_after);
    }

    #[test]
    fn bundle_refuses_absolute_symlink() {
        let src = tempdir().unwrap();
        unix_symlink("/etc/passwd", src.path().join("evil")).unwrap();
        assert!(bundle(src.path()).is_err());
    }

    #[test]
    fn bundle_refuses_escaping_relative_symlink() {
        let src = tempdir().unwrap();
        unix_symlink("../../etc/passwd", src.path().join("evil")).unwrap();
        assert!(bundle(src.path()).is_err());
    }

    #[test]
    fn control_entries_are_skipped() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join(".incoming-abc")).unwrap();
        fs::write(src.path().join(".incoming-abc/tmp.txt"), b"x").unwrap();
        fs::write(src.path().join("keep.txt"), b"y").unwrap();

        let (bytes, _) = bundle(src.path()).unwrap();
        let dest = tempdir().unwrap();
        extract(&bytes, dest.path()).unwrap();

        assert!(!dest.path().join(".incoming-abc").exists());
        assert!(dest.path().join("keep.txt").exists());
    }
}
