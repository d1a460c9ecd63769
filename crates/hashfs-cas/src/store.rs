//! Content stores.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{CasError, CasResult};
use crate::hash::ContentHash;

/// Get/put-by-hash storage.
///
/// `put` is idempotent: storing bytes that are already present returns the
/// existing hash without writing a second copy.
pub trait ContentStore: Send + Sync {
    /// Store bytes, returning their hash.
    fn put(&self, bytes: &[u8]) -> CasResult<ContentHash>;

    /// Fetch bytes by hash. `None` if the hash is unknown.
    fn get(&self, hash: &ContentHash) -> CasResult<Option<Vec<u8>>>;

    /// Check whether a hash is stored.
    fn contains(&self, hash: &ContentHash) -> CasResult<bool> {
        Ok(self.get(hash)?.is_some())
    }

    /// Length of the stored bytes, if the store can answer without reading
    /// them. Stores without this capability return `None`.
    fn size(&self, hash: &ContentHash) -> CasResult<Option<u64>> {
        let _ = hash;
        Ok(None)
    }
}

/// In-memory content store. All data is lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<ContentHash, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct objects stored.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ContentStore for MemoryStore {
    fn put(&self, bytes: &[u8]) -> CasResult<ContentHash> {
        let hash = ContentHash::of(bytes);
        self.objects
            .write()
            .entry(hash)
            .or_insert_with(|| bytes.to_vec());
        Ok(hash)
    }

    fn get(&self, hash: &ContentHash) -> CasResult<Option<Vec<u8>>> {
        Ok(self.objects.read().get(hash).cloned())
    }

    fn contains(&self, hash: &ContentHash) -> CasResult<bool> {
        Ok(self.objects.read().contains_key(hash))
    }

    fn size(&self, hash: &ContentHash) -> CasResult<Option<u64>> {
        Ok(self.objects.read().get(hash).map(|b| b.len() as u64))
    }
}

/// On-disk content store.
///
/// Layout: `<root>/objects/<first 2 hex chars>/<remaining 62 hex chars>`.
/// Writes go to a temp file in `<root>/tmp` and are renamed into place, so a
/// reader never observes a partially written object.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> CasResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("tmp"))?;
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        let (shard, rest) = hex.split_at(2);
        self.root.join("objects").join(shard).join(rest)
    }
}

impl ContentStore for FileStore {
    fn put(&self, bytes: &[u8]) -> CasResult<ContentHash> {
        let hash = ContentHash::of(bytes);
        let dest = self.object_path(&hash);
        if dest.exists() {
            return Ok(hash);
        }

        if let Some(shard) = dest.parent() {
            fs::create_dir_all(shard)?;
        }

        let tmp = self.root.join("tmp").join(uuid::Uuid::new_v4().to_string());
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, &dest) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        tracing::trace!(hash = %hash.short(), len = bytes.len(), "stored object");
        Ok(hash)
    }

    fn get(&self, hash: &ContentHash) -> CasResult<Option<Vec<u8>>> {
        let bytes = match fs::read(self.object_path(hash)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if ContentHash::of(&bytes) != *hash {
            return Err(CasError::Corrupt(hash.to_hex()));
        }
        Ok(Some(bytes))
    }

    fn contains(&self, hash: &ContentHash) -> CasResult<bool> {
        Ok(self.object_path(hash).exists())
    }

    fn size(&self, hash: &ContentHash) -> CasResult<Option<u64>> {
        match fs::metadata(self.object_path(hash)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
