//! Copy-on-write filesystem over an object store.
//!
//! [`TreeFs`] keeps one piece of mutable state: the current [`Root`]. Every
//! structural mutation takes the `mutations` lock, reads the current root,
//! rewrites the affected ancestor chain through [`cow::mutate`], and only
//! then swaps the new root in and tells the [`RootObserver`]. Readers copy
//! the root at the start of an operation and never take the lock; the
//! objects reachable from that root are immutable, so a read always sees
//! one consistent version.

use std::sync::Arc;

use async_trait::async_trait;
use hashfs_cas::ContentHash;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::TreeFsConfig;
use crate::cow::mutate;
use crate::error::{VfsError, VfsResult};
use crate::mode::{apply_umask, kind_of, with_permissions_of, SYMLINK_MODE};
use crate::objects::ObjectStore;
use crate::ops::VfsOps;
use crate::resolve::{join, resolve, split_parent};
use crate::tree::{validate_name, Directory, DirectoryEntry, File, Root, TreeObject};
use crate::types::{DirEntry, FileType, Stat};

/// Receives each new root after a mutation completes.
///
/// Called exactly once per successful mutation, after the whole ancestor
/// chain is stored. Persisting or versioning the root is up to the observer.
pub trait RootObserver: Send + Sync {
    fn on_root_update(&self, root: &Root);
}

impl<F> RootObserver for F
where
    F: Fn(&Root) + Send + Sync,
{
    fn on_root_update(&self, root: &Root) {
        self(root)
    }
}

/// Content-addressed, copy-on-write filesystem.
pub struct TreeFs {
    store: Arc<dyn ObjectStore>,
    config: TreeFsConfig,
    root: RwLock<Root>,
    /// Serializes structural mutations.
    mutations: Mutex<()>,
    observer: Option<Arc<dyn RootObserver>>,
}

impl std::fmt::Debug for TreeFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeFs")
            .field("root", &*self.root.read())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TreeFs {
    /// Open a filesystem at `root`, or at a fresh empty root if `None`.
    pub async fn open(
        store: Arc<dyn ObjectStore>,
        config: TreeFsConfig,
        root: Option<Root>,
    ) -> VfsResult<Self> {
        let root = match root {
            Some(root) => root,
            None => {
                if kind_of(config.root_mode)? != FileType::Directory {
                    return Err(VfsError::MalformedMode {
                        mode: config.root_mode,
                    });
                }
                let entry = store.put(&TreeObject::Directory(Directory::new())).await?;
                info!(entry = %entry.short(), "created empty root");
                Root::new(config.root_mode, entry)
            }
        };

        Ok(Self {
            store,
            config,
            root: RwLock::new(root),
            mutations: Mutex::new(()),
            observer: None,
        })
    }

    /// Attach the root-update callback.
    pub fn with_observer(mut self, observer: impl RootObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The current root.
    pub fn snapshot(&self) -> Root {
        *self.root.read()
    }

    /// A view of the same store at another (typically older) root.
    ///
    /// The view has no observer; mutating it forks silently.
    pub fn at(&self, root: Root) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            root: RwLock::new(root),
            mutations: Mutex::new(()),
            observer: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn config(&self) -> &TreeFsConfig {
        &self.config
    }

    /// Store `data` as a BLOB and create a file for it at `path`.
    pub async fn write_file(&self, path: &str, data: &[u8], mode: u32) -> VfsResult<ContentHash> {
        let (dir, name) = split_parent(path)?;
        let blob = self.store.put_blob(data).await?;
        self.create_file(dir, &blob, name, mode).await?;
        Ok(blob)
    }

    fn publish(&self, root: Root) {
        *self.root.write() = root;
        info!(entry = %root.entry.short(), "root updated");
        if let Some(observer) = &self.observer {
            observer.on_root_update(&root);
        }
    }

    /// Resolve `path` and load it as a directory.
    async fn dir_at(&self, root: &Root, path: &str) -> VfsResult<(DirectoryEntry, Directory)> {
        let entry = resolve(self.store.as_ref(), root, path).await?;
        if entry.kind()? != FileType::Directory {
            return Err(VfsError::not_a_directory(path));
        }
        let dir = self.store.get_directory(&entry.content, path).await?;
        Ok((entry, dir))
    }

    /// [`dir_at`](Self::dir_at), also requiring the owner-write bit.
    async fn writable_dir(&self, root: &Root, path: &str) -> VfsResult<Directory> {
        let (entry, dir) = self.dir_at(root, path).await?;
        if !entry.decoded()?.owner_can_write() {
            return Err(VfsError::write_denied(path));
        }
        Ok(dir)
    }

    /// Length of a BLOB, reading it when the store can't say.
    async fn blob_len(&self, hash: &ContentHash) -> VfsResult<u64> {
        if let Some(size) = self.store.blob_size(hash).await? {
            return Ok(size);
        }
        warn!(blob = %hash.short(), "store has no size capability, reading blob to measure");
        Ok(self.store.get_blob(hash).await?.len() as u64)
    }

    /// Shared body of `rmdir` and `unlink`.
    async fn remove(&self, path: &str, want_dir: bool) -> VfsResult<()> {
        let _guard = self.mutations.lock().await;
        let root = self.snapshot();

        let (parent, name) = split_parent(path)?;
        let parent_dir = self.writable_dir(&root, parent).await?;
        let entry = *parent_dir
            .get(name)
            .ok_or_else(|| VfsError::not_found(path))?;

        match (entry.kind()?, want_dir) {
            (FileType::Directory, true) => {
                let child = self.store.get_directory(&entry.content, path).await?;
                if !child.is_empty() {
                    return Err(VfsError::directory_not_empty(path));
                }
            }
            (FileType::File | FileType::Symlink, false) => {}
            (_, true) => return Err(VfsError::not_a_directory(path)),
            (_, false) => return Err(VfsError::not_a_file(path)),
        }

        let next = mutate(self.store.as_ref(), &root, parent, |dir| {
            dir.remove(name);
            Ok(())
        })
        .await?;
        debug!(path, "removed");
        self.publish(next);
        Ok(())
    }
}

/// New mode for `chmod`: permission digits from `requested`, type from
/// `current`. A requested mode carrying a different type tag is malformed.
fn chmod_mode(current: u32, requested: u32) -> VfsResult<u32> {
    if requested > 0o777 && kind_of(requested)? != kind_of(current)? {
        return Err(VfsError::MalformedMode { mode: requested });
    }
    Ok(with_permissions_of(current, requested))
}

#[async_trait]
impl VfsOps for TreeFs {
    async fn stat(&self, path: &str) -> VfsResult<Stat> {
        let root = self.snapshot();
        let entry = resolve(self.store.as_ref(), &root, path).await?;

        let size = match entry.kind()? {
            FileType::Directory => 0,
            FileType::File => {
                let file = self.store.get_file(&entry.content, path).await?;
                self.blob_len(&file.content).await?
            }
            FileType::Symlink => self.blob_len(&entry.content).await?,
        };
        Ok(Stat {
            mode: entry.mode,
            size,
        })
    }

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let root = self.snapshot();
        let (entry, dir) = self.dir_at(&root, path).await?;
        if !entry.decoded()?.owner_can_read() {
            return Err(VfsError::read_denied(path));
        }
        dir.entries()
            .map(|(name, child)| -> VfsResult<DirEntry> {
                Ok(DirEntry::new(name, child.kind()?, child.mode))
            })
            .collect()
    }

    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let root = self.snapshot();
        let entry = resolve(self.store.as_ref(), &root, path).await?;
        let mode = entry.decoded()?;
        if mode.kind != FileType::File {
            return Err(VfsError::not_a_file(path));
        }
        if !mode.owner_can_read() {
            return Err(VfsError::read_denied(path));
        }
        let file = self.store.get_file(&entry.content, path).await?;
        self.store.get_blob(&file.content).await
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        let root = self.snapshot();
        let entry = resolve(self.store.as_ref(), &root, path).await?;
        if entry.kind()? != FileType::Symlink {
            return Err(VfsError::NotASymlink(path.to_string()));
        }
        let bytes = self.store.get_blob(&entry.content).await?;
        String::from_utf8(bytes)
            .map_err(|_| VfsError::corrupt(entry.content, "symlink target is not UTF-8"))
    }

    async fn create_dir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let _guard = self.mutations.lock().await;
        let root = self.snapshot();

        if kind_of(mode)? != FileType::Directory {
            return Err(VfsError::MalformedMode { mode });
        }
        let (parent, name) = split_parent(path)?;
        validate_name(name)?;

        let parent_dir = self.writable_dir(&root, parent).await?;
        if parent_dir.contains(name) {
            return Err(VfsError::already_exists(path));
        }

        let empty = self
            .store
            .put(&TreeObject::Directory(Directory::new()))
            .await?;
        let entry = DirectoryEntry::new(apply_umask(mode, self.config.umask), empty);

        let next = mutate(self.store.as_ref(), &root, parent, |dir| {
            dir.insert(name, entry);
            Ok(())
        })
        .await?;
        debug!(path, mode = %format!("{:o}", entry.mode), "created directory");
        self.publish(next);
        Ok(())
    }

    async fn create_file(
        &self,
        dir: &str,
        blob: &ContentHash,
        name: &str,
        mode: u32,
    ) -> VfsResult<()> {
        let _guard = self.mutations.lock().await;
        let root = self.snapshot();

        let kind = kind_of(mode)?;
        if kind == FileType::Directory {
            return Err(VfsError::MalformedMode { mode });
        }
        validate_name(name)?;
        let path = join(dir, name);

        let parent_dir = self.writable_dir(&root, dir).await?;
        if let Some(existing) = parent_dir.get(name) {
            let existing = existing.decoded()?;
            if existing.is_dir() {
                return Err(VfsError::already_exists(&path));
            }
            if !existing.owner_can_write() {
                return Err(VfsError::write_denied(&path));
            }
        }

        let entry = match kind {
            FileType::Symlink => DirectoryEntry::new(mode, *blob),
            _ => {
                let file = self
                    .store
                    .put(&TreeObject::File(File { content: *blob }))
                    .await?;
                DirectoryEntry::new(apply_umask(mode, self.config.umask), file)
            }
        };

        let next = mutate(self.store.as_ref(), &root, dir, |d| {
            d.insert(name, entry);
            Ok(())
        })
        .await?;
        debug!(path = %path, blob = %blob.short(), "created file");
        self.publish(next);
        Ok(())
    }

    async fn chmod(&self, path: &str, mode: u32) -> VfsResult<()> {
        let _guard = self.mutations.lock().await;
        let root = self.snapshot();

        if path == "/" {
            let next = Root::new(chmod_mode(root.mode, mode)?, root.entry);
            self.publish(next);
            return Ok(());
        }

        let (parent, name) = split_parent(path)?;
        let next = mutate(self.store.as_ref(), &root, parent, |dir| {
            let mut entry = *dir.get(name).ok_or_else(|| VfsError::not_found(path))?;
            entry.mode = chmod_mode(entry.mode, mode)?;
            dir.insert(name, entry);
            Ok(())
        })
        .await?;
        debug!(path, mode = %format!("{mode:o}"), "chmod");
        self.publish(next);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let _guard = self.mutations.lock().await;
        let root = self.snapshot();

        let (src_parent, src_name) = split_parent(from)?;
        let (dst_parent, dst_name) = split_parent(to)?;
        validate_name(dst_name)?;
        if to.starts_with(&format!("{from}/")) {
            return Err(VfsError::invalid_path(to));
        }

        let (_, src_dir) = self.dir_at(&root, src_parent).await?;
        let moved = *src_dir
            .get(src_name)
            .ok_or_else(|| VfsError::not_found(from))?;
        if from == to {
            return Ok(());
        }
        if !moved.decoded()?.owner_can_write() {
            return Err(VfsError::write_denied(from));
        }

        let dst_dir = self.writable_dir(&root, dst_parent).await?;
        if dst_dir.contains(dst_name) {
            return Err(VfsError::already_exists(to));
        }

        let store = self.store.as_ref();
        let next = if src_parent == dst_parent {
            mutate(store, &root, src_parent, |dir| {
                dir.remove(src_name);
                dir.insert(dst_name, moved);
                Ok(())
            })
            .await?
        } else {
            // Two passes; only the final root is published.
            let detached = mutate(store, &root, src_parent, |dir| {
                dir.remove(src_name);
                Ok(())
            })
            .await?;
            mutate(store, &detached, dst_parent, |dir| {
                dir.insert(dst_name, moved);
                Ok(())
            })
            .await?
        };
        debug!(from, to, "renamed");
        self.publish(next);
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        self.remove(path, true).await
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        self.remove(path, false).await
    }

    async fn symlink(&self, target: &str, path: &str) -> VfsResult<()> {
        let (dir, name) = split_parent(path)?;
        let blob = self.store.put_blob(target.as_bytes()).await?;
        self.create_file(dir, &blob, name, SYMLINK_MODE).await
    }

    fn supports_chunked_reading(&self) -> bool {
        self.config.chunked_reads
    }

    fn copy_on_write(&self) -> bool {
        true
    }
}
