//! Root pointer persistence.
//!
//! The filesystem hands every new root to an observer; the CLI keeps the
//! latest one as JSON in `<store>/ROOT`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hashfs_vfs::Root;

const ROOT_FILE: &str = "ROOT";

/// The `ROOT` file of a store directory.
#[derive(Debug, Clone)]
pub struct RootFile {
    path: PathBuf,
}

impl RootFile {
    pub fn in_store(store_dir: &Path) -> Self {
        Self {
            path: store_dir.join(ROOT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The persisted root, or `None` if the store has none yet.
    pub fn load(&self) -> Result<Option<Root>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };
        let root = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(root))
    }

    /// Replace the persisted root.
    pub fn save(&self, root: &Root) -> Result<()> {
        let json = serde_json::to_string_pretty(root)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
