//! Content-addressed, copy-on-write virtual filesystem.
//!
//! Every directory and file is an immutable object stored under the hash of
//! its encoding. A mutation never edits an object: it stores a new version
//! of the changed directory and of each ancestor up to the root, and hands
//! the new [`Root`] to a [`RootObserver`]. Any retained root stays a
//! complete, readable snapshot.
//!
//! Key components:
//!
//! - [`TreeFs`] - the copy-on-write filesystem facade
//! - [`VfsOps`] - core trait for filesystem operations
//! - [`MountTable`] - routes operations to backends based on path
//! - [`MemoryBackend`] - mutable in-memory filesystem (scratch, testing)
//! - [`ObjectStore`] - async get/put seam over a content-addressed store
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: operations take absolute `/`-rooted paths.
//!   `.` and `..` are not interpreted.
//! - **One writer, many readers**: mutations on a [`TreeFs`] are serialized;
//!   reads work on a root snapshot and never wait.
//! - **Owner bits only**: of the three permission triples, only the owner's
//!   read and write bits are enforced.
//! - **Non-overlapping mounts**: no mount point may lie inside another.

pub mod backends;
mod config;
pub mod cow;
mod error;
mod fs;
pub mod mode;
mod mount;
mod objects;
mod ops;
pub mod resolve;
mod tree;
mod types;

pub use backends::MemoryBackend;
pub use config::TreeFsConfig;
pub use error::{Access, VfsError, VfsResult};
pub use fs::{RootObserver, TreeFs};
pub use mode::{Mode, Permission, Permissions};
pub use mount::{MountInfo, MountTable, SYNTHETIC_DIR_MODE};
pub use objects::{CasObjects, ObjectStore};
pub use ops::VfsOps;
pub use tree::{Directory, DirectoryEntry, File, Root, TreeObject};
pub use types::{DirEntry, FileType, Stat};

pub use hashfs_cas::ContentHash;
