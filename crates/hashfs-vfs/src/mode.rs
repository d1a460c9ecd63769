//! Unix-style mode codec.
//!
//! A mode is read as seven octal digits: a four-digit type tag followed by
//! one permission digit each for owner, group and public.
//!
//! | tag    | type      |
//! |--------|-----------|
//! | `0100` | file      |
//! | `0040` | directory |
//! | `0120` | symlink   |
//!
//! Permission digits go through [`PERMISSION_TABLE`] rather than bit masks,
//! so a future scheme that is not bitwise can be expressed by editing the
//! table alone. Only the owner triple is enforced by the filesystem.

use crate::error::{VfsError, VfsResult};
use crate::types::FileType;

/// Type tags, matched exactly against the first four octal digits.
const TYPE_TAGS: [(&str, FileType); 3] = [
    ("0100", FileType::File),
    ("0040", FileType::Directory),
    ("0120", FileType::Symlink),
];

/// Permission digit lookup.
pub const PERMISSION_TABLE: [(char, Permission); 8] = [
    ('0', Permission::new(false, false, false)),
    ('1', Permission::new(false, false, true)),
    ('2', Permission::new(false, true, false)),
    ('3', Permission::new(false, true, true)),
    ('4', Permission::new(true, false, false)),
    ('5', Permission::new(true, false, true)),
    ('6', Permission::new(true, true, false)),
    ('7', Permission::new(true, true, true)),
];

/// Default mode for a newly created file before the umask.
pub const DEFAULT_FILE_MODE: u32 = 0o100666;
/// Default mode for a newly created directory before the umask.
pub const DEFAULT_DIR_MODE: u32 = 0o040777;
/// Mode for symlinks. Symlink permissions are never masked.
pub const SYMLINK_MODE: u32 = 0o120777;

/// One read/write/execute triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permission {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
}

impl Permission {
    pub const fn new(read: bool, write: bool, exec: bool) -> Self {
        Self { read, write, exec }
    }

    fn from_digit(digit: char) -> Option<Self> {
        PERMISSION_TABLE
            .iter()
            .find(|(d, _)| *d == digit)
            .map(|(_, p)| *p)
    }

    fn digit(&self) -> char {
        // The table covers all eight triples.
        PERMISSION_TABLE
            .iter()
            .find(|(_, p)| p == self)
            .map_or('0', |(d, _)| *d)
    }
}

/// Owner, group and public permission triples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions {
    pub owner: Permission,
    pub group: Permission,
    pub public: Permission,
}

/// A decoded mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode {
    pub kind: FileType,
    pub permissions: Permissions,
}

impl Mode {
    /// Decode a raw mode.
    pub fn decode(mode: u32) -> VfsResult<Self> {
        let malformed = || VfsError::MalformedMode { mode };

        let digits = format!("{mode:07o}");
        if digits.len() != 7 {
            return Err(malformed());
        }
        let (tag, perms) = digits.split_at(4);

        let kind = TYPE_TAGS
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, kind)| *kind)
            .ok_or_else(malformed)?;

        let resolved: Vec<Permission> = perms.chars().filter_map(Permission::from_digit).collect();
        let [owner, group, public] = resolved.as_slice() else {
            return Err(malformed());
        };

        Ok(Self {
            kind,
            permissions: Permissions {
                owner: *owner,
                group: *group,
                public: *public,
            },
        })
    }

    /// Encode back to a raw mode.
    pub fn encode(&self) -> u32 {
        let tag = TYPE_TAGS
            .iter()
            .find(|(_, kind)| *kind == self.kind)
            .map_or("0100", |(t, _)| *t);
        let p = &self.permissions;
        let digits: String = tag
            .chars()
            .chain([p.owner.digit(), p.group.digit(), p.public.digit()])
            .collect();
        // Seven octal digits always parse.
        u32::from_str_radix(&digits, 8).unwrap_or_default()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Owner read bit.
    pub fn owner_can_read(&self) -> bool {
        self.permissions.owner.read
    }

    /// Owner write bit.
    pub fn owner_can_write(&self) -> bool {
        self.permissions.owner.write
    }
}

/// Type of a raw mode, or `MalformedMode`.
pub fn kind_of(mode: u32) -> VfsResult<FileType> {
    Mode::decode(mode).map(|m| m.kind)
}

/// Clear `umask` bits from the permission digits of `mode`.
pub fn apply_umask(mode: u32, umask: u32) -> u32 {
    mode & !(umask & 0o777)
}

/// Keep the type tag of `current`, take the permission digits of `new`.
pub fn with_permissions_of(current: u32, new: u32) -> u32 {
    (current & !0o777) | (new & 0o777)
}
