//! VFS error types.

use std::fmt;
use std::io;

use hashfs_cas::CasError;
use thiserror::Error;

/// Which owner permission bit an operation needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// VFS error type.
///
/// Every variant carries the offending path (both paths for mount and
/// cross-device errors). Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file or symlink.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Owner permission bit not set.
    #[error("permission denied ({access}): {path}")]
    PermissionDenied { access: Access, path: String },

    /// Mode failed codec validation.
    #[error("malformed mode: {mode:#o}")]
    MalformedMode { mode: u32 },

    /// Operation not supported by this backend.
    #[error("operation not implemented: {0}")]
    Unimplemented(String),

    /// Mount points would overlap.
    #[error("mount conflict: {requested} overlaps {existing}")]
    MountConflict { existing: String, requested: String },

    /// Chunked reads are disabled on this platform.
    #[error("chunked reading not supported: {0}")]
    ChunkedReadUnsupported(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Rename across two different mounts.
    #[error("cross-device rename: {from} -> {to}")]
    CrossDevice { from: String, to: String },

    /// No mount point covers the path.
    #[error("no mount point for path: {0}")]
    NoMountPoint(String),

    /// Invalid path or entry name.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Not a symbolic link.
    #[error("not a symbolic link: {0}")]
    NotASymlink(String),

    /// Configuration could not be read or parsed.
    #[error("invalid config: {0}")]
    Config(String),

    /// A stored object could not be decoded or is missing.
    #[error("corrupt object {hash}: {reason}")]
    Corrupt { hash: String, reason: String },

    /// Object store failure.
    #[error("object store: {0}")]
    Store(#[from] CasError),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create a NotAFile error.
    pub fn not_a_file(path: impl Into<String>) -> Self {
        Self::NotAFile(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PermissionDenied error for a missing owner-read bit.
    pub fn read_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied {
            access: Access::Read,
            path: path.into(),
        }
    }

    /// Create a PermissionDenied error for a missing owner-write bit.
    pub fn write_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied {
            access: Access::Write,
            path: path.into(),
        }
    }

    /// Create an Unimplemented error.
    pub fn unimplemented(what: impl Into<String>) -> Self {
        Self::Unimplemented(what.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a NoMountPoint error.
    pub fn no_mount_point(path: impl Into<String>) -> Self {
        Self::NoMountPoint(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a Corrupt error.
    pub fn corrupt(hash: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            hash: hash.to_string(),
            reason: reason.into(),
        }
    }

    /// POSIX-flavored errno hint for host integration (negative values).
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::NotFound(_) | VfsError::NoMountPoint(_) => -2,
            VfsError::PermissionDenied { .. } => -13,
            VfsError::AlreadyExists(_) => -17,
            VfsError::CrossDevice { .. } => -18,
            VfsError::NotADirectory(_) => -20,
            VfsError::NotAFile(_) => -21,
            VfsError::InvalidPath(_) | VfsError::NotASymlink(_) | VfsError::Config(_) => -22,
            VfsError::Unimplemented(_) | VfsError::ChunkedReadUnsupported(_) => -38,
            VfsError::DirectoryNotEmpty(_) => -39,
            VfsError::MalformedMode { .. }
            | VfsError::MountConflict { .. }
            | VfsError::Corrupt { .. }
            | VfsError::Store(_) => -5,
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        let kind = match &e {
            VfsError::NotFound(_) | VfsError::NoMountPoint(_) => io::ErrorKind::NotFound,
            VfsError::NotADirectory(_) => io::ErrorKind::NotADirectory,
            VfsError::NotAFile(_) => io::ErrorKind::IsADirectory,
            VfsError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            VfsError::PermissionDenied { .. } => io::ErrorKind::PermissionDenied,
            VfsError::DirectoryNotEmpty(_) => io::ErrorKind::DirectoryNotEmpty,
            VfsError::CrossDevice { .. } => io::ErrorKind::CrossesDevices,
            VfsError::Unimplemented(_) | VfsError::ChunkedReadUnsupported(_) => {
                io::ErrorKind::Unsupported
            }
            VfsError::MalformedMode { .. }
            | VfsError::InvalidPath(_)
            | VfsError::NotASymlink(_)
            | VfsError::Config(_) => io::ErrorKind::InvalidInput,
            VfsError::Corrupt { .. } => io::ErrorKind::InvalidData,
            VfsError::MountConflict { .. } | VfsError::Store(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_hints() {
        assert_eq!(VfsError::not_found("/a").errno(), -2);
        assert_eq!(VfsError::write_denied("/a").errno(), -13);
        assert_eq!(VfsError::read_denied("/a").errno(), -13);
        assert_eq!(VfsError::unimplemented("link").errno(), -38);
        assert_eq!(VfsError::already_exists("/a").errno(), -17);
        assert_eq!(VfsError::no_mount_point("/x").errno(), -2);
    }

    #[test]
    fn test_permission_message_names_access() {
        let e = VfsError::write_denied("/docs");
        assert_eq!(e.to_string(), "permission denied (write): /docs");
    }

    #[test]
    fn test_io_conversion() {
        let e: io::Error = VfsError::not_found("/gone").into();
        assert_eq!(e.kind(), io::ErrorKind::NotFound);

        let e: io::Error = VfsError::write_denied("/ro").into();
        assert_eq!(e.kind(), io::ErrorKind::PermissionDenied);
    }
}
