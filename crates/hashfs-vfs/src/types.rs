//! Core VFS types.
//!
//! These are what backends hand back to callers. They are path-based and
//! carry raw modes so a host can forward them unchanged.

use serde::{Deserialize, Serialize};

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// Result of `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Raw mode, type tag included (e.g. `0o100644`).
    pub mode: u32,
    /// Size in bytes. Always 0 for directories.
    pub size: u64,
}

impl Stat {
    /// Stat for a directory.
    pub fn directory(mode: u32) -> Self {
        Self { mode, size: 0 }
    }

    /// Permission digits only (e.g. `0o644`).
    pub fn perm(&self) -> u32 {
        self.mode & 0o777
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
    /// Raw mode of the entry.
    pub mode: u32,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType, mode: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            mode,
        }
    }

    /// Create a synthesized directory entry (mount table listings).
    pub fn directory(name: impl Into<String>, mode: u32) -> Self {
        Self::new(name, FileType::Directory, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
        assert!(FileType::Symlink.is_symlink());
    }

    #[test]
    fn test_stat_perm() {
        let stat = Stat {
            mode: 0o100644,
            size: 5,
        };
        assert_eq!(stat.perm(), 0o644);
        assert_eq!(Stat::directory(0o040755).size, 0);
    }
}
