//! Filesystem configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! root_mode = 0o040755
//! umask = 0o022
//! chunked_reads = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// Settings for a [`TreeFs`](crate::TreeFs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeFsConfig {
    /// Mode of the root created when a filesystem starts without one.
    pub root_mode: u32,

    /// Permission bits cleared on `create_dir`/`create_file`.
    ///
    /// Not applied by `chmod` or to symlinks.
    pub umask: u32,

    /// Whether the host can serve partial reads.
    pub chunked_reads: bool,
}

impl Default for TreeFsConfig {
    fn default() -> Self {
        Self {
            root_mode: 0o040755,
            umask: 0o022,
            chunked_reads: true,
        }
    }
}

impl TreeFsConfig {
    /// Parse from a TOML string.
    pub fn from_toml_str(s: &str) -> VfsResult<Self> {
        toml::from_str(s).map_err(|e| VfsError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> VfsResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| VfsError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn with_root_mode(mut self, mode: u32) -> Self {
        self.root_mode = mode;
        self
    }

    pub fn with_umask(mut self, umask: u32) -> Self {
        self.umask = umask;
        self
    }

    pub fn with_chunked_reads(mut self, enabled: bool) -> Self {
        self.chunked_reads = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(TreeFsConfig::from_toml_str("").unwrap(), TreeFsConfig::default());
    }

    #[test]
    fn test_parse_octal() {
        let cfg = TreeFsConfig::from_toml_str("umask = 0o077\nchunked_reads = false\n").unwrap();
        assert_eq!(cfg.umask, 0o077);
        assert!(!cfg.chunked_reads);
        assert_eq!(cfg.root_mode, 0o040755);
    }

    #[test]
    fn test_bad_toml() {
        assert!(TreeFsConfig::from_toml_str("umask = \"nope\"").is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashfs.toml");
        std::fs::write(&path, "root_mode = 0o040700\n").unwrap();
        assert_eq!(TreeFsConfig::load(&path).unwrap().root_mode, 0o040700);
        assert!(TreeFsConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_builders() {
        let cfg = TreeFsConfig::default().with_umask(0).with_chunked_reads(false);
        assert_eq!(cfg.umask, 0);
        assert!(!cfg.chunked_reads);
    }
}
