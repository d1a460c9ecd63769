//! Path resolution.
//!
//! Paths are absolute and `/`-delimited. They are split once into segments
//! and consumed by index, so a segment that happens to be a substring of
//! another (`/ab/a`) never confuses the walk. Nothing is normalized here:
//! `.` and `..` are ordinary names and a trailing slash is an empty final
//! segment, which never matches.

use hashfs_cas::ContentHash;

use crate::error::{VfsError, VfsResult};
use crate::objects::ObjectStore;
use crate::tree::{DirectoryEntry, Root};
use crate::types::FileType;

/// Split an absolute path into segments. `/` yields no segments.
pub fn segments(path: &str) -> VfsResult<Vec<&str>> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| VfsError::invalid_path(path))?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    Ok(rest.split('/').collect())
}

/// Split `/a/b/c` into (`/a/b`, `c`). The root has no parent.
///
/// Uses the same segmentation as [`resolve`]; any empty segment (`//a`,
/// `/a/`) is rejected so a mutation can never land somewhere a read of the
/// same path would not look.
pub fn split_parent(path: &str) -> VfsResult<(&str, &str)> {
    let segs = segments(path)?;
    let Some((&name, parents)) = segs.split_last() else {
        return Err(VfsError::invalid_path(path));
    };
    if segs.iter().any(|seg| seg.is_empty()) {
        return Err(VfsError::invalid_path(path));
    }
    if parents.is_empty() {
        return Ok(("/", name));
    }
    Ok((&path[..path.len() - name.len() - 1], name))
}

/// Join a directory path and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Locate the entry at `path` in the tree under `root`.
pub async fn resolve(
    store: &dyn ObjectStore,
    root: &Root,
    path: &str,
) -> VfsResult<DirectoryEntry> {
    if path == "/" {
        return Ok(root.as_entry());
    }
    let segs = segments(path)?;
    resolve_from(store, root.entry, &segs, path).await
}

/// Descend from the directory `start` through `segs`.
///
/// `path` is only used for error messages.
pub async fn resolve_from(
    store: &dyn ObjectStore,
    start: ContentHash,
    segs: &[&str],
    path: &str,
) -> VfsResult<DirectoryEntry> {
    let Some(last) = segs.len().checked_sub(1) else {
        return Err(VfsError::invalid_path(path));
    };

    let mut current = start;
    for (idx, seg) in segs.iter().enumerate() {
        let dir = store.get_directory(&current, path).await?;
        let entry = *dir.get(seg).ok_or_else(|| VfsError::not_found(path))?;
        if idx == last {
            return Ok(entry);
        }
        match entry.kind()? {
            FileType::Directory => current = entry.content,
            // files and symlinks have no children
            FileType::File | FileType::Symlink => return Err(VfsError::not_found(path)),
        }
    }
    Err(VfsError::not_found(path))
}
