//! Immutable tree objects.
//!
//! A tree is made of three stored shapes:
//!
//! - [`Directory`] - children keyed by `"/name"`
//! - [`File`] - a reference to a BLOB of raw bytes
//! - BLOBs themselves, which are plain bytes and never wrapped
//!
//! Symlinks have no object of their own: their [`DirectoryEntry`] points
//! straight at a BLOB holding the link target.
//!
//! Objects are encoded with postcard. `BTreeMap` keeps child order
//! canonical, so two structurally identical directories always encode to
//! the same bytes and therefore share a hash.

use std::collections::BTreeMap;

use hashfs_cas::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};
use crate::mode::Mode;
use crate::types::FileType;

/// A named reference from a parent directory to a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Type and permissions as seen from the parent.
    pub mode: u32,
    /// Directory, File, or (for symlinks) BLOB hash.
    pub content: ContentHash,
}

impl DirectoryEntry {
    pub fn new(mode: u32, content: ContentHash) -> Self {
        Self { mode, content }
    }

    /// Decoded mode.
    pub fn decoded(&self) -> VfsResult<Mode> {
        Mode::decode(self.mode)
    }

    /// Entry type from the mode's type tag.
    pub fn kind(&self) -> VfsResult<FileType> {
        self.decoded().map(|m| m.kind)
    }
}

/// A directory: unique names mapped to entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    children: BTreeMap<String, DirectoryEntry>,
}

impl Directory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map key for a child name.
    fn key(name: &str) -> String {
        format!("/{name}")
    }

    pub fn get(&self, name: &str) -> Option<&DirectoryEntry> {
        self.children.get(&Self::key(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(&Self::key(name))
    }

    /// Insert or replace a child, returning the previous entry.
    pub fn insert(&mut self, name: &str, entry: DirectoryEntry) -> Option<DirectoryEntry> {
        self.children.insert(Self::key(name), entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<DirectoryEntry> {
        self.children.remove(&Self::key(name))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Children in name order, names without the leading separator.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DirectoryEntry)> {
        self.children
            .iter()
            .map(|(key, entry)| (key.strip_prefix('/').unwrap_or(key), entry))
    }
}

/// A file: a reference to externally stored bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub content: ContentHash,
}

/// Anything stored as a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeObject {
    Directory(Directory),
    File(File),
}

impl TreeObject {
    /// Canonical encoding; the object's hash is the hash of these bytes.
    pub fn encode(&self) -> VfsResult<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| VfsError::corrupt("<unstored>", e.to_string()))
    }

    /// Decode bytes fetched under `hash`.
    pub fn decode(hash: &ContentHash, bytes: &[u8]) -> VfsResult<Self> {
        postcard::from_bytes(bytes).map_err(|e| VfsError::corrupt(hash, e.to_string()))
    }
}

/// The single entry point of a tree.
///
/// A root is a value: the filesystem hands a new one to its observer after
/// every mutation and never edits an old one, so any retained root is a
/// complete read-only snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub mode: u32,
    /// Hash of the top-level [`Directory`].
    pub entry: ContentHash,
}

impl Root {
    pub fn new(mode: u32, entry: ContentHash) -> Self {
        Self { mode, entry }
    }

    /// The root seen as a directory entry (what resolving `/` yields).
    pub fn as_entry(&self) -> DirectoryEntry {
        DirectoryEntry::new(self.mode, self.entry)
    }
}

/// Reject names that cannot be a single path segment.
pub fn validate_name(name: &str) -> VfsResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(VfsError::invalid_path(name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mode: u32, bytes: &[u8]) -> DirectoryEntry {
        DirectoryEntry::new(mode, ContentHash::of(bytes))
    }

    #[test]
    fn test_keys_carry_separator() {
        let mut dir = Directory::new();
        dir.insert("docs", entry(0o040755, b"d"));
        assert!(dir.contains("docs"));
        assert!(dir.children.contains_key("/docs"));
        let names: Vec<_> = dir.entries().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["docs"]);
    }

    #[test]
    fn test_insert_replaces() {
        let mut dir = Directory::new();
        assert!(dir.insert("a", entry(0o100644, b"1")).is_none());
        let prev = dir.insert("a", entry(0o100644, b"2")).unwrap();
        assert_eq!(prev.content, ContentHash::of(b"1"));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_identical_directories_encode_identically() {
        let mut a = Directory::new();
        a.insert("x", entry(0o100644, b"x"));
        a.insert("y", entry(0o100644, b"y"));

        let mut b = Directory::new();
        b.insert("y", entry(0o100644, b"y"));
        b.insert("x", entry(0o100644, b"x"));

        let a = TreeObject::Directory(a).encode().unwrap();
        let b = TreeObject::Directory(b).encode().unwrap();
        assert_eq!(ContentHash::of(&a), ContentHash::of(&b));
    }

    #[test]
    fn test_decode_garbage_is_corrupt() {
        let hash = ContentHash::of(b"junk");
        assert!(matches!(
            TreeObject::decode(&hash, &[0xff, 0xff, 0xff]),
            Err(VfsError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_entry_kind() {
        assert_eq!(entry(0o120777, b"t").kind().unwrap(), FileType::Symlink);
        assert!(entry(0o777, b"t").kind().is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("readme.txt").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
