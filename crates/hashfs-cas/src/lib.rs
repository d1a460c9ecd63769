//! Content Addressable Storage for hashfs.
//!
//! Objects are opaque byte strings identified by the BLAKE3 hash of their
//! content. Storing the same bytes twice yields the same [`ContentHash`] and
//! a single stored copy.
//!
//! Two stores are provided:
//!
//! - [`MemoryStore`] - ephemeral, for tests and scratch trees
//! - [`FileStore`] - sharded on-disk layout (`objects/ab/cdef...`)

mod error;
mod hash;
mod store;

pub use error::{CasError, CasResult};
pub use hash::ContentHash;
pub use store::{ContentStore, FileStore, MemoryStore};
