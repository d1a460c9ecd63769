//! VFS backends other than the copy-on-write [`TreeFs`](crate::TreeFs).
//!
//! Backends implement [`VfsOps`](crate::VfsOps) and can be mounted side by
//! side in a [`MountTable`](crate::MountTable).

mod memory;

pub use memory::MemoryBackend;
