//! Async object store seam.
//!
//! The tree engine never touches bytes on disk. It asks an [`ObjectStore`]
//! for objects by hash and hands it new ones; every call is a suspension
//! point. [`CasObjects`] adapts any synchronous [`ContentStore`].

use std::sync::Arc;

use async_trait::async_trait;
use hashfs_cas::{ContentHash, ContentStore};

use crate::error::{VfsError, VfsResult};
use crate::tree::{Directory, File, TreeObject};

/// Content-addressed get/put for tree objects and raw BLOBs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch and decode a tree object.
    async fn get(&self, hash: &ContentHash) -> VfsResult<TreeObject>;

    /// Encode and store a tree object.
    async fn put(&self, object: &TreeObject) -> VfsResult<ContentHash>;

    /// Hash an object without storing it.
    async fn calculate_hash(&self, object: &TreeObject) -> VfsResult<ContentHash> {
        Ok(ContentHash::of(&object.encode()?))
    }

    /// Store raw bytes.
    async fn put_blob(&self, bytes: &[u8]) -> VfsResult<ContentHash>;

    /// Fetch raw bytes.
    async fn get_blob(&self, hash: &ContentHash) -> VfsResult<Vec<u8>>;

    /// BLOB length without reading it, when the store can tell.
    async fn blob_size(&self, hash: &ContentHash) -> VfsResult<Option<u64>> {
        let _ = hash;
        Ok(None)
    }

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Fetch an object that must be a directory. `path` is for errors.
    async fn get_directory(&self, hash: &ContentHash, path: &str) -> VfsResult<Directory> {
        match self.get(hash).await? {
            TreeObject::Directory(dir) => Ok(dir),
            TreeObject::File(_) => Err(VfsError::not_a_directory(path)),
        }
    }

    /// Fetch an object that must be a file. `path` is for errors.
    async fn get_file(&self, hash: &ContentHash, path: &str) -> VfsResult<File> {
        match self.get(hash).await? {
            TreeObject::File(file) => Ok(file),
            TreeObject::Directory(_) => Err(VfsError::not_a_file(path)),
        }
    }
}

/// [`ObjectStore`] over a [`ContentStore`].
#[derive(Clone)]
pub struct CasObjects {
    store: Arc<dyn ContentStore>,
}

impl std::fmt::Debug for CasObjects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasObjects").finish_non_exhaustive()
    }
}

impl CasObjects {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Wrap an owned store.
    pub fn from_store(store: impl ContentStore + 'static) -> Self {
        Self::new(Arc::new(store))
    }

    fn fetch(&self, hash: &ContentHash) -> VfsResult<Vec<u8>> {
        self.store
            .get(hash)?
            .ok_or_else(|| VfsError::corrupt(hash, "missing from store"))
    }
}

#[async_trait]
impl ObjectStore for CasObjects {
    async fn get(&self, hash: &ContentHash) -> VfsResult<TreeObject> {
        let bytes = self.fetch(hash)?;
        TreeObject::decode(hash, &bytes)
    }

    async fn put(&self, object: &TreeObject) -> VfsResult<ContentHash> {
        let bytes = object.encode()?;
        Ok(self.store.put(&bytes)?)
    }

    async fn put_blob(&self, bytes: &[u8]) -> VfsResult<ContentHash> {
        Ok(self.store.put(bytes)?)
    }

    async fn get_blob(&self, hash: &ContentHash) -> VfsResult<Vec<u8>> {
        self.fetch(hash)
    }

    async fn blob_size(&self, hash: &ContentHash) -> VfsResult<Option<u64>> {
        Ok(self.store.size(hash)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DirectoryEntry;
    use hashfs_cas::MemoryStore;

    #[tokio::test]
    async fn test_put_get_directory() {
        let objects = CasObjects::from_store(MemoryStore::new());
        let mut dir = Directory::new();
        dir.insert("a", DirectoryEntry::new(0o100644, ContentHash::of(b"a")));

        let obj = TreeObject::Directory(dir.clone());
        let hash = objects.put(&obj).await.unwrap();
        assert_eq!(objects.calculate_hash(&obj).await.unwrap(), hash);
        assert_eq!(objects.get_directory(&hash, "/").await.unwrap(), dir);
    }

    #[tokio::test]
    async fn test_wrong_shape() {
        let objects = CasObjects::from_store(MemoryStore::new());
        let hash = objects
            .put(&TreeObject::File(File {
                content: ContentHash::of(b"x"),
            }))
            .await
            .unwrap();
        assert!(matches!(
            objects.get_directory(&hash, "/f").await,
            Err(VfsError::NotADirectory(p)) if p == "/f"
        ));
    }

    #[tokio::test]
    async fn test_missing_object_is_corrupt() {
        let objects = CasObjects::from_store(MemoryStore::new());
        let result = objects.get(&ContentHash::of(b"nope")).await;
        assert!(matches!(result, Err(VfsError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_blob_size_capability() {
        let objects = CasObjects::from_store(MemoryStore::new());
        let hash = objects.put_blob(b"hello").await.unwrap();
        assert_eq!(objects.blob_size(&hash).await.unwrap(), Some(5));
        assert_eq!(objects.get_blob(&hash).await.unwrap(), b"hello");
    }
}
