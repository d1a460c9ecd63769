//! Copy-on-write propagation.
//!
//! A mutation edits exactly one directory. The directory and every ancestor
//! up to the root are re-stored as new objects; siblings are untouched and
//! stay shared with every earlier root. A change at depth `d` therefore
//! stores `d + 1` directories.
//!
//! The change closure runs before anything is stored, so a rejected change
//! leaves the store as it was.

use hashfs_cas::ContentHash;
use tracing::debug;

use crate::error::{VfsError, VfsResult};
use crate::objects::ObjectStore;
use crate::resolve::segments;
use crate::tree::{Directory, Root, TreeObject};
use crate::types::FileType;

/// Apply `change` to the directory at `parent` and return the new root.
///
/// Fails `NotFound` if `parent` does not resolve and `NotADirectory` if it
/// resolves to a file or symlink.
pub async fn mutate<F>(
    store: &dyn ObjectStore,
    root: &Root,
    parent: &str,
    change: F,
) -> VfsResult<Root>
where
    F: FnOnce(&mut Directory) -> VfsResult<()> + Send,
{
    let segs = segments(parent)?;

    // Load the chain root -> parent. chain[i] is the directory holding segs[i].
    let mut chain: Vec<Directory> = Vec::with_capacity(segs.len() + 1);
    chain.push(store.get_directory(&root.entry, "/").await?);
    for seg in &segs {
        let Some(dir) = chain.last() else {
            return Err(VfsError::not_found(parent));
        };
        let entry = *dir.get(seg).ok_or_else(|| VfsError::not_found(parent))?;
        if entry.kind()? != FileType::Directory {
            return Err(VfsError::not_a_directory(parent));
        }
        chain.push(store.get_directory(&entry.content, parent).await?);
    }

    let Some(mut target) = chain.pop() else {
        return Err(VfsError::not_found(parent));
    };
    change(&mut target)?;

    let mut hash = store.put(&TreeObject::Directory(target)).await?;
    debug!(path = parent, hash = %hash.short(), "rewrote directory");

    for (dir, seg) in chain.into_iter().zip(&segs).rev() {
        hash = relink(store, dir, seg, hash, parent).await?;
    }

    debug!(entry = %hash.short(), "new root");
    Ok(Root::new(root.mode, hash))
}

/// Point `name` in `dir` at `child` (mode unchanged) and store the result.
async fn relink(
    store: &dyn ObjectStore,
    mut dir: Directory,
    name: &str,
    child: ContentHash,
    path: &str,
) -> VfsResult<ContentHash> {
    let mut entry = *dir.get(name).ok_or_else(|| VfsError::not_found(path))?;
    entry.content = child;
    dir.insert(name, entry);
    let hash = store.put(&TreeObject::Directory(dir)).await?;
    debug!(name, hash = %hash.short(), "rewrote ancestor");
    Ok(hash)
}
