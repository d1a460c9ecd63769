//! VFS mount table with longest-prefix routing.
//!
//! Routes filesystem operations to the backend mounted over the path,
//! translating the path to one relative to the mount point. Mount points
//! never nest, so at most one mount covers any path.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use hashfs_cas::ContentHash;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{VfsError, VfsResult};
use crate::ops::VfsOps;
use crate::types::{DirEntry, Stat};

/// Mode reported for directories the table synthesizes above mount points.
pub const SYNTHETIC_DIR_MODE: u32 = 0o040555;

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// The mount path (e.g., "/mnt/project").
    pub path: String,
    /// Whether the mounted backend keeps old versions on mutation.
    pub copy_on_write: bool,
}

/// Routes filesystem operations to mounted backends.
pub struct MountTable {
    /// Mount points, keyed by normalized path.
    mounts: RwLock<BTreeMap<String, Arc<dyn VfsOps>>>,
}

impl std::fmt::Debug for MountTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &"<locked>")
            .finish()
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

/// True if `path` is `mount` or lies below it.
fn covers(mount: &str, path: &str) -> bool {
    mount == "/" || path == mount || path.strip_prefix(mount).is_some_and(|rest| rest.starts_with('/'))
}

impl MountTable {
    /// Create a new empty mount table.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mount a filesystem at the given path.
    ///
    /// Fails `MountConflict` if `path` is already mounted, or lies inside
    /// or above an existing mount point.
    pub async fn mount(&self, path: &str, fs: impl VfsOps + 'static) -> VfsResult<()> {
        self.mount_arc(path, Arc::new(fs)).await
    }

    /// Mount a filesystem (already wrapped in Arc) at the given path.
    pub async fn mount_arc(&self, path: &str, fs: Arc<dyn VfsOps>) -> VfsResult<()> {
        let path = Self::normalize_mount_path(path);
        let mut mounts = self.mounts.write().await;

        if let Some(existing) = mounts
            .keys()
            .find(|existing| covers(existing, &path) || covers(&path, existing))
        {
            return Err(VfsError::MountConflict {
                existing: existing.clone(),
                requested: path,
            });
        }

        info!(path = %path, copy_on_write = fs.copy_on_write(), "mounted");
        mounts.insert(path, fs);
        Ok(())
    }

    /// Unmount the filesystem at the given path.
    ///
    /// Returns `true` if a mount was removed, `false` if nothing was mounted there.
    pub async fn unmount(&self, path: &str) -> bool {
        let path = Self::normalize_mount_path(path);
        let mut mounts = self.mounts.write().await;
        let removed = mounts.remove(&path).is_some();
        if removed {
            info!(path = %path, "unmounted");
        }
        removed
    }

    /// List all current mounts.
    pub async fn list_mounts(&self) -> Vec<MountInfo> {
        let mounts = self.mounts.read().await;
        mounts
            .iter()
            .map(|(path, fs)| MountInfo {
                path: path.clone(),
                copy_on_write: fs.copy_on_write(),
            })
            .collect()
    }

    /// Normalize a mount path: ensure it starts with `/` and has no trailing slash.
    fn normalize_mount_path(path: &str) -> String {
        let s = path.trim_end_matches('/');
        if s.is_empty() {
            "/".to_string()
        } else if !s.starts_with('/') {
            format!("/{s}")
        } else {
            s.to_string()
        }
    }

    /// Find the mount point for a given path.
    ///
    /// Returns the mount and the path relative to that mount (always
    /// absolute; the mount point itself becomes `/`).
    async fn find_mount(&self, path: &str) -> VfsResult<(Arc<dyn VfsOps>, String)> {
        let mounts = self.mounts.read().await;

        let best = mounts
            .iter()
            .filter(|(mount, _)| covers(mount, path))
            .max_by_key(|(mount, _)| mount.len());

        let Some((mount, fs)) = best else {
            return Err(VfsError::no_mount_point(path));
        };

        let relative = if mount == "/" {
            path.to_string()
        } else {
            match &path[mount.len()..] {
                "" => "/".to_string(),
                rest => rest.to_string(),
            }
        };
        debug!(path, mount = %mount, relative = %relative, "routed");
        Ok((Arc::clone(fs), relative))
    }

    /// Next path segment of every mount point strictly below `path`.
    async fn synthetic_children(&self, path: &str) -> BTreeSet<String> {
        let mounts = self.mounts.read().await;
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };

        mounts
            .keys()
            .filter_map(|mount| mount.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl VfsOps for MountTable {
    async fn stat(&self, path: &str) -> VfsResult<Stat> {
        match self.find_mount(path).await {
            Ok((fs, relative)) => fs.stat(&relative).await,
            Err(VfsError::NoMountPoint(_)) => {
                if path != "/" && self.synthetic_children(path).await.is_empty() {
                    return Err(VfsError::no_mount_point(path));
                }
                Ok(Stat::directory(SYNTHETIC_DIR_MODE))
            }
            Err(e) => Err(e),
        }
    }

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        match self.find_mount(path).await {
            Ok((fs, relative)) => fs.read_dir(&relative).await,
            Err(VfsError::NoMountPoint(_)) => {
                let children = self.synthetic_children(path).await;
                if children.is_empty() && path != "/" {
                    return Err(VfsError::no_mount_point(path));
                }
                Ok(children
                    .into_iter()
                    .map(|name| DirEntry::directory(name, SYNTHETIC_DIR_MODE))
                    .collect())
            }
            Err(e) => Err(e),
        }
    }

    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let (fs, relative) = self.find_mount(path).await?;
        fs.read_file(&relative).await
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        let (fs, relative) = self.find_mount(path).await?;
        fs.readlink(&relative).await
    }

    async fn create_dir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(path).await?;
        fs.create_dir(&relative, mode).await
    }

    async fn create_file(
        &self,
        dir: &str,
        blob: &ContentHash,
        name: &str,
        mode: u32,
    ) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(dir).await?;
        fs.create_file(&relative, blob, name, mode).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(path).await?;
        fs.chmod(&relative, mode).await
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        // Both paths must be in the same mount
        let (from_fs, from_relative) = self.find_mount(from).await?;
        let (to_fs, to_relative) = self.find_mount(to).await?;

        if !Arc::ptr_eq(&from_fs, &to_fs) {
            return Err(VfsError::CrossDevice {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        from_fs.rename(&from_relative, &to_relative).await
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(path).await?;
        fs.rmdir(&relative).await
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(path).await?;
        fs.unlink(&relative).await
    }

    async fn symlink(&self, target: &str, path: &str) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(path).await?;
        fs.symlink(target, &relative).await
    }

    async fn link(&self, existing: &str, path: &str) -> VfsResult<()> {
        let (fs, relative) = self.find_mount(path).await?;
        let (existing_fs, existing_relative) = self.find_mount(existing).await?;
        if !Arc::ptr_eq(&fs, &existing_fs) {
            return Err(VfsError::CrossDevice {
                from: existing.to_string(),
                to: path.to_string(),
            });
        }
        fs.link(&existing_relative, &relative).await
    }

    /// The table itself can always route; each backend decides.
    fn supports_chunked_reading(&self) -> bool {
        true
    }

    async fn read_file_in_chunks(&self, path: &str, length: u64, offset: u64) -> VfsResult<Vec<u8>> {
        let (fs, relative) = self.find_mount(path).await?;
        fs.read_file_in_chunks(&relative, length, offset).await
    }
}
