//! VFS operations trait.
//!
//! The filesystem contract shared by every backend and by the mount table.
//! Paths are absolute (`/`-rooted) strings relative to the backend's own
//! root; the [`MountTable`](crate::MountTable) translates before delegating.

use async_trait::async_trait;
use hashfs_cas::ContentHash;

use super::types::{DirEntry, Stat};
use super::{VfsError, VfsResult};

/// Core VFS operations trait.
///
/// Structural mutations (`create_dir`, `create_file`, `chmod`, `rename`,
/// `rmdir`, `unlink`, `symlink`) are serialized per backend. Reads never
/// wait on them.
#[async_trait]
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Mode and size of the entry at `path`.
    async fn stat(&self, path: &str) -> VfsResult<Stat>;

    /// Entries of the directory at `path`, in name order.
    async fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    /// Whole contents of the file at `path`.
    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// Target of the symlink at `path`.
    async fn readlink(&self, path: &str) -> VfsResult<String>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create a directory. Fails if anything already exists at `path`.
    async fn create_dir(&self, path: &str, mode: u32) -> VfsResult<()>;

    /// Create `name` in directory `dir` referencing the BLOB `blob`.
    ///
    /// `mode` must carry a file or symlink type tag. An existing file of the
    /// same name is replaced if its owner-write bit allows it.
    async fn create_file(
        &self,
        dir: &str,
        blob: &ContentHash,
        name: &str,
        mode: u32,
    ) -> VfsResult<()>;

    /// Replace the permission digits of the entry at `path`.
    async fn chmod(&self, path: &str, mode: u32) -> VfsResult<()>;

    /// Move an entry.
    async fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Remove an empty directory.
    async fn rmdir(&self, path: &str) -> VfsResult<()>;

    /// Remove a file or symlink.
    async fn unlink(&self, path: &str) -> VfsResult<()>;

    /// Create a symlink at `path` pointing to `target`.
    async fn symlink(&self, target: &str, path: &str) -> VfsResult<()>;

    /// Create a hard link at `path` to the entry at `existing`.
    ///
    /// Backends without hard links keep this default.
    async fn link(&self, existing: &str, path: &str) -> VfsResult<()> {
        let _ = existing;
        Err(VfsError::unimplemented(format!("link {path}")))
    }

    // ========================================================================
    // Capabilities
    // ========================================================================

    /// Whether partial reads can be served.
    fn supports_chunked_reading(&self) -> bool;

    /// Whether mutations leave earlier versions intact.
    fn copy_on_write(&self) -> bool {
        false
    }

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Read `length` bytes starting at `offset`.
    ///
    /// Returns fewer bytes if the end of the file is reached.
    async fn read_file_in_chunks(&self, path: &str, length: u64, offset: u64) -> VfsResult<Vec<u8>> {
        if !self.supports_chunked_reading() {
            return Err(VfsError::ChunkedReadUnsupported(path.to_string()));
        }
        let data = self.read_file(path).await?;
        Ok(slice_chunk(&data, length, offset).to_vec())
    }
}

/// `data[offset..offset + length]`, clamped to the data.
pub(crate) fn slice_chunk(data: &[u8], length: u64, offset: u64) -> &[u8] {
    let len = data.len() as u64;
    let start = offset.min(len);
    let end = offset.saturating_add(length).min(len);
    &data[start as usize..end as usize]
}
