//! In-memory filesystem backend.
//!
//! Mutable and ephemeral: entries are edited in place and nothing survives
//! a drop. Used for scratch mounts and as a contrast to the copy-on-write
//! tree in tests. BLOB hashes handed to `create_file` are resolved through
//! the object store once, at creation. New files and directories get the
//! same umask treatment as the copy-on-write tree, so mounting the two side
//! by side yields the same modes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hashfs_cas::ContentHash;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::TreeFsConfig;
use crate::error::{VfsError, VfsResult};
use crate::mode::{apply_umask, kind_of, with_permissions_of, Mode, SYMLINK_MODE};
use crate::objects::ObjectStore;
use crate::ops::VfsOps;
use crate::resolve::{join, split_parent};
use crate::tree::validate_name;
use crate::types::{DirEntry, FileType, Stat};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, mode: u32 },
    Directory { mode: u32 },
    Symlink { target: String, mode: u32 },
}

impl Entry {
    fn mode(&self) -> u32 {
        match self {
            Entry::File { mode, .. } | Entry::Directory { mode } | Entry::Symlink { mode, .. } => {
                *mode
            }
        }
    }

    fn set_mode(&mut self, new: u32) {
        match self {
            Entry::File { mode, .. } | Entry::Directory { mode } | Entry::Symlink { mode, .. } => {
                *mode = new
            }
        }
    }

    fn kind(&self) -> FileType {
        match self {
            Entry::File { .. } => FileType::File,
            Entry::Directory { .. } => FileType::Directory,
            Entry::Symlink { .. } => FileType::Symlink,
        }
    }

    fn decoded(&self) -> VfsResult<Mode> {
        Mode::decode(self.mode())
    }
}

/// In-memory filesystem backend.
///
/// Entries are keyed by absolute path. The root directory always exists.
pub struct MemoryBackend {
    store: Arc<dyn ObjectStore>,
    umask: u32,
    entries: RwLock<HashMap<String, Entry>>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl MemoryBackend {
    /// Create an empty filesystem whose root has mode `0o040755`.
    ///
    /// Uses the default [`TreeFsConfig`] umask.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        let mut entries = HashMap::new();
        entries.insert("/".to_string(), Entry::Directory { mode: 0o040755 });
        Self {
            store,
            umask: TreeFsConfig::default().umask,
            entries: RwLock::new(entries),
        }
    }

    /// Replace the umask applied to new files and directories.
    pub fn with_umask(mut self, umask: u32) -> Self {
        self.umask = umask;
        self
    }

    /// Check that `dir` is an owner-writable directory.
    fn check_writable_dir(entries: &HashMap<String, Entry>, dir: &str) -> VfsResult<()> {
        match entries.get(dir) {
            Some(entry @ Entry::Directory { .. }) => {
                if entry.decoded()?.owner_can_write() {
                    Ok(())
                } else {
                    Err(VfsError::write_denied(dir))
                }
            }
            Some(_) => Err(VfsError::not_a_directory(dir)),
            None => Err(VfsError::not_found(dir)),
        }
    }

    fn has_children(entries: &HashMap<String, Entry>, dir: &str) -> bool {
        entries
            .keys()
            .any(|k| k != dir && split_parent(k).is_ok_and(|(parent, _)| parent == dir))
    }

    fn insert_leaf(&self, path: String, entry: Entry) -> VfsResult<()> {
        let (dir, _) = split_parent(&path)?;
        let mut entries = self.entries.write();
        Self::check_writable_dir(&entries, dir)?;

        if let Some(existing) = entries.get(&path) {
            if existing.kind() == FileType::Directory {
                return Err(VfsError::already_exists(path));
            }
            if !existing.decoded()?.owner_can_write() {
                return Err(VfsError::write_denied(path));
            }
        }
        debug!(path = %path, "memory: created file");
        entries.insert(path, entry);
        Ok(())
    }
}

#[async_trait]
impl VfsOps for MemoryBackend {
    async fn stat(&self, path: &str) -> VfsResult<Stat> {
        let entries = self.entries.read();
        let entry = entries.get(path).ok_or_else(|| VfsError::not_found(path))?;
        let size = match entry {
            Entry::File { data, .. } => data.len() as u64,
            Entry::Directory { .. } => 0,
            Entry::Symlink { target, .. } => target.len() as u64,
        };
        Ok(Stat {
            mode: entry.mode(),
            size,
        })
    }

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let entries = self.entries.read();
        match entries.get(path) {
            Some(entry @ Entry::Directory { .. }) => {
                if !entry.decoded()?.owner_can_read() {
                    return Err(VfsError::read_denied(path));
                }
            }
            Some(_) => return Err(VfsError::not_a_directory(path)),
            None => return Err(VfsError::not_found(path)),
        }

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(key, _)| key.as_str() != path)
            .filter_map(|(key, entry)| {
                let (parent, name) = split_parent(key).ok()?;
                (parent == path).then(|| DirEntry::new(name, entry.kind(), entry.mode()))
            })
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let entries = self.entries.read();
        match entries.get(path) {
            Some(entry @ Entry::File { data, .. }) => {
                if !entry.decoded()?.owner_can_read() {
                    return Err(VfsError::read_denied(path));
                }
                Ok(data.clone())
            }
            Some(_) => Err(VfsError::not_a_file(path)),
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        let entries = self.entries.read();
        match entries.get(path) {
            Some(Entry::Symlink { target, .. }) => Ok(target.clone()),
            Some(_) => Err(VfsError::NotASymlink(path.to_string())),
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn create_dir(&self, path: &str, mode: u32) -> VfsResult<()> {
        if kind_of(mode)? != FileType::Directory {
            return Err(VfsError::MalformedMode { mode });
        }
        let (dir, name) = split_parent(path)?;
        validate_name(name)?;

        let mut entries = self.entries.write();
        Self::check_writable_dir(&entries, dir)?;
        if entries.contains_key(path) {
            return Err(VfsError::already_exists(path));
        }
        let mode = apply_umask(mode, self.umask);
        entries.insert(path.to_string(), Entry::Directory { mode });
        Ok(())
    }

    async fn create_file(
        &self,
        dir: &str,
        blob: &ContentHash,
        name: &str,
        mode: u32,
    ) -> VfsResult<()> {
        let kind = kind_of(mode)?;
        if kind == FileType::Directory {
            return Err(VfsError::MalformedMode { mode });
        }
        validate_name(name)?;

        let data = self.store.get_blob(blob).await?;
        let entry = match kind {
            FileType::Symlink => Entry::Symlink {
                target: String::from_utf8(data)
                    .map_err(|_| VfsError::corrupt(blob, "symlink target is not UTF-8"))?,
                mode,
            },
            _ => Entry::File {
                data,
                mode: apply_umask(mode, self.umask),
            },
        };
        self.insert_leaf(join(dir, name), entry)
    }

    async fn chmod(&self, path: &str, mode: u32) -> VfsResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(path)
            .ok_or_else(|| VfsError::not_found(path))?;
        let current = entry.mode();
        if mode > 0o777 && kind_of(mode)? != kind_of(current)? {
            return Err(VfsError::MalformedMode { mode });
        }
        entry.set_mode(with_permissions_of(current, mode));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        split_parent(from)?;
        let (dst_parent, dst_name) = split_parent(to)?;
        validate_name(dst_name)?;
        let subtree = format!("{from}/");
        if to.starts_with(&subtree) {
            return Err(VfsError::invalid_path(to));
        }

        let mut entries = self.entries.write();
        let moved = entries.get(from).ok_or_else(|| VfsError::not_found(from))?;
        if from == to {
            return Ok(());
        }
        if !moved.decoded()?.owner_can_write() {
            return Err(VfsError::write_denied(from));
        }
        Self::check_writable_dir(&entries, dst_parent)?;
        if entries.contains_key(to) {
            return Err(VfsError::already_exists(to));
        }

        let Some(entry) = entries.remove(from) else {
            return Err(VfsError::not_found(from));
        };

        // Carry descendants along
        if entry.kind() == FileType::Directory {
            let children: Vec<String> = entries
                .keys()
                .filter(|k| k.starts_with(&subtree))
                .cloned()
                .collect();
            for child in children {
                if let Some(child_entry) = entries.remove(&child) {
                    let relative = &child[from.len()..];
                    entries.insert(format!("{to}{relative}"), child_entry);
                }
            }
        }

        entries.insert(to.to_string(), entry);
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let (dir, _) = split_parent(path)?;
        let mut entries = self.entries.write();
        Self::check_writable_dir(&entries, dir)?;

        match entries.get(path) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory(path)),
            None => return Err(VfsError::not_found(path)),
        }
        if Self::has_children(&entries, path) {
            return Err(VfsError::directory_not_empty(path));
        }

        entries.remove(path);
        Ok(())
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let (dir, _) = split_parent(path)?;
        let mut entries = self.entries.write();
        Self::check_writable_dir(&entries, dir)?;

        match entries.get(path) {
            Some(Entry::Directory { .. }) => Err(VfsError::not_a_file(path)),
            Some(_) => {
                entries.remove(path);
                Ok(())
            }
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn symlink(&self, target: &str, path: &str) -> VfsResult<()> {
        let (_, name) = split_parent(path)?;
        validate_name(name)?;
        self.insert_leaf(
            path.to_string(),
            Entry::Symlink {
                target: target.to_string(),
                mode: SYMLINK_MODE,
            },
        )
    }

    fn supports_chunked_reading(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::CasObjects;
    use hashfs_cas::MemoryStore;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(Arc::new(CasObjects::from_store(MemoryStore::new())))
    }

    async fn write(fs: &MemoryBackend, path: &str, data: &[u8]) {
        let blob = fs.store.put_blob(data).await.unwrap();
        let (dir, name) = split_parent(path).unwrap();
        fs.create_file(dir, &blob, name, 0o100644).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let fs = backend();
        write(&fs, "/test.txt", b"hello world").await;

        assert_eq!(fs.read_file("/test.txt").await.unwrap(), b"hello world");
        assert_eq!(fs.stat("/test.txt").await.unwrap().size, 11);
        assert!(!fs.copy_on_write());
    }

    #[tokio::test]
    async fn test_partial_read() {
        let fs = backend();
        write(&fs, "/test.txt", b"hello world").await;
        let data = fs.read_file_in_chunks("/test.txt", 5, 6).await.unwrap();
        assert_eq!(data, b"world");
    }

    #[tokio::test]
    async fn test_mkdir_and_readdir() {
        let fs = backend();
        fs.create_dir("/subdir", 0o040755).await.unwrap();
        write(&fs, "/subdir/file.txt", b"x").await;
        write(&fs, "/root.txt", b"y").await;

        let names: Vec<_> = fs
            .read_dir("/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["root.txt", "subdir"]);

        let sub = fs.read_dir("/subdir").await.unwrap();
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].name, "file.txt");
    }

    #[tokio::test]
    async fn test_no_auto_parents() {
        let fs = backend();
        let blob = fs.store.put_blob(b"x").await.unwrap();
        assert!(matches!(
            fs.create_file("/a/b", &blob, "c", 0o100644).await,
            Err(VfsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unlink() {
        let fs = backend();
        write(&fs, "/test.txt", b"x").await;
        fs.unlink("/test.txt").await.unwrap();
        assert!(!fs.exists("/test.txt").await);
    }

    #[tokio::test]
    async fn test_rmdir_not_empty() {
        let fs = backend();
        fs.create_dir("/nonempty", 0o040755).await.unwrap();
        write(&fs, "/nonempty/file.txt", b"x").await;

        assert!(matches!(
            fs.rmdir("/nonempty").await,
            Err(VfsError::DirectoryNotEmpty(_))
        ));
        fs.unlink("/nonempty/file.txt").await.unwrap();
        fs.rmdir("/nonempty").await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_directory_moves_children() {
        let fs = backend();
        fs.create_dir("/old", 0o040755).await.unwrap();
        write(&fs, "/old/a.txt", b"content").await;

        fs.rename("/old", "/new").await.unwrap();

        assert!(!fs.exists("/old/a.txt").await);
        assert_eq!(fs.read_file("/new/a.txt").await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_symlink() {
        let fs = backend();
        fs.symlink("/target/path", "/link").await.unwrap();
        assert_eq!(fs.readlink("/link").await.unwrap(), "/target/path");
        assert_eq!(fs.stat("/link").await.unwrap().mode, SYMLINK_MODE);
    }

    #[tokio::test]
    async fn test_write_protection() {
        let fs = backend();
        write(&fs, "/f", b"one").await;
        fs.chmod("/f", 0o444).await.unwrap();

        let blob = fs.store.put_blob(b"two").await.unwrap();
        assert!(matches!(
            fs.create_file("/", &blob, "f", 0o100644).await,
            Err(VfsError::PermissionDenied { .. })
        ));
        assert_eq!(fs.read_file("/f").await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_umask_applied() {
        let fs = backend();
        fs.create_dir("/d", 0o040777).await.unwrap();
        let blob = fs.store.put_blob(b"x").await.unwrap();
        fs.create_file("/", &blob, "f", 0o100666).await.unwrap();
        assert_eq!(fs.stat("/d").await.unwrap().mode, 0o040755);
        assert_eq!(fs.stat("/f").await.unwrap().mode, 0o100644);

        let open = MemoryBackend::new(Arc::clone(&fs.store)).with_umask(0);
        open.create_file("/", &blob, "f", 0o100666).await.unwrap();
        assert_eq!(open.stat("/f").await.unwrap().mode, 0o100666);
    }

    #[tokio::test]
    async fn test_rename_missing_onto_itself() {
        let fs = backend();
        assert!(matches!(
            fs.rename("/nope", "/nope").await,
            Err(VfsError::NotFound(p)) if p == "/nope"
        ));
        write(&fs, "/f", b"x").await;
        fs.rename("/f", "/f").await.unwrap();
        assert_eq!(fs.read_file("/f").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_empty_segments_rejected() {
        let fs = backend();
        assert!(matches!(
            fs.create_dir("//a", 0o040755).await,
            Err(VfsError::InvalidPath(_))
        ));
        assert!(!fs.exists("/a").await);
    }

    #[tokio::test]
    async fn test_no_normalization() {
        let fs = backend();
        fs.create_dir("/a", 0o040755).await.unwrap();
        assert!(fs.stat("/a/.").await.is_err());
        assert!(fs.stat("/a/../a").await.is_err());
    }
}
