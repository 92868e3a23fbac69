// SPDX-License-Identifier: AGPL-3.0-or-later
//! File and directory metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Host-native file mode.
///
/// The low nine bits are the rwx permission bits. File type and the
/// setuid/setgid/sticky bits live in dedicated high flags, so a mode never
/// depends on the POSIX `S_IF*` encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileMode(u32);

impl FileMode {
    pub const DIR: FileMode = FileMode(1 << 31);
    pub const SYMLINK: FileMode = FileMode(1 << 27);
    pub const DEVICE: FileMode = FileMode(1 << 26);
    pub const NAMED_PIPE: FileMode = FileMode(1 << 25);
    pub const SOCKET: FileMode = FileMode(1 << 24);
    pub const SETUID: FileMode = FileMode(1 << 23);
    pub const SETGID: FileMode = FileMode(1 << 22);
    pub const CHAR_DEVICE: FileMode = FileMode(1 << 21);
    pub const STICKY: FileMode = FileMode(1 << 20);

    /// Permission bits
    pub const PERM: FileMode = FileMode(0o777);

    /// All file type flags
    pub const TYPE: FileMode = FileMode(
        Self::DIR.0 | Self::SYMLINK.0 | Self::NAMED_PIPE.0 | Self::SOCKET.0 | Self::DEVICE.0 | Self::CHAR_DEVICE.0,
    );

    pub const fn from_bits(bits: u32) -> Self {
        FileMode(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn perm(self) -> u32 {
        self.0 & Self::PERM.0
    }

    /// Only the file type flags of this mode.
    pub const fn file_type(self) -> FileMode {
        FileMode(self.0 & Self::TYPE.0)
    }

    pub const fn contains(self, other: FileMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: FileMode) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_dir(self) -> bool {
        self.intersects(Self::DIR)
    }

    pub const fn is_symlink(self) -> bool {
        self.intersects(Self::SYMLINK)
    }

    pub const fn is_regular(self) -> bool {
        !self.intersects(Self::TYPE)
    }
}

impl BitOr for FileMode {
    type Output = FileMode;

    fn bitor(self, rhs: FileMode) -> FileMode {
        FileMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for FileMode {
    fn bitor_assign(&mut self, rhs: FileMode) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FileMode {
    type Output = FileMode;

    fn bitand(self, rhs: FileMode) -> FileMode {
        FileMode(self.0 & rhs.0)
    }
}

impl fmt::Debug for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileMode({:#o}", self.perm())?;
        for (flag, name) in [
            (Self::DIR, "dir"),
            (Self::SYMLINK, "symlink"),
            (Self::DEVICE, "device"),
            (Self::CHAR_DEVICE, "char"),
            (Self::NAMED_PIPE, "pipe"),
            (Self::SOCKET, "socket"),
            (Self::SETUID, "setuid"),
            (Self::SETGID, "setgid"),
            (Self::STICKY, "sticky"),
        ] {
            if self.intersects(flag) {
                write!(f, " {name}")?;
            }
        }
        write!(f, ")")
    }
}

/// Seconds and nanoseconds since the Unix epoch, as the kernel reports them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timespec {
    pub secs: i64,
    pub nsecs: u32,
}

impl Timespec {
    pub fn new(secs: i64, nsecs: u32) -> Self {
        Self { secs, nsecs }
    }
}

impl From<DateTime<Utc>> for Timespec {
    fn from(time: DateTime<Utc>) -> Self {
        Self::new(time.timestamp(), time.timestamp_subsec_nanos())
    }
}

/// Owner, group and precise access/change times a backend may know about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedMetadata {
    pub accessed: DateTime<Utc>,
    pub changed: DateTime<Utc>,
    /// Owner as the backend names it: a numeric id or an account name
    pub owner: String,
    /// Group as the backend names it: a numeric id or a group name
    pub group: String,
}

/// Raw `stat(2)` data of the underlying host object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawStat {
    pub ino: u64,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: Timespec,
    pub ctime: Timespec,
}

#[cfg(unix)]
impl From<&std::fs::Metadata> for RawStat {
    fn from(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            ino: meta.ino(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            blksize: meta.blksize(),
            blocks: meta.blocks(),
            atime: Timespec::new(meta.atime(), meta.atime_nsec() as u32),
            ctime: Timespec::new(meta.ctime(), meta.ctime_nsec() as u32),
        }
    }
}

/// What a backend knows about a file
///
/// `extended` is set when the backend exposes [`ExtendedMetadata`]
/// directly; `raw` is the side channel carrying host `stat` data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mode: FileMode,
    pub modified: DateTime<Utc>,
    pub extended: Option<ExtendedMetadata>,
    pub raw: Option<RawStat>,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64, mode: FileMode, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            size,
            mode,
            modified,
            extended: None,
            raw: None,
        }
    }

    pub fn with_extended(mut self, extended: ExtendedMetadata) -> Self {
        self.extended = Some(extended);
        self
    }

    pub fn with_raw(mut self, raw: RawStat) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }
}
