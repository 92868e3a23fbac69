// SPDX-License-Identifier: AGPL-3.0-or-later
//! Records exchanged with the protocol engine

use chrono::{DateTime, Utc};
use fsb_core::Timespec;

use crate::mode::S_IFMT;

/// Open reply flag: keep the kernel page cache of the file
pub const FOPEN_KEEP_CACHE: u32 = 1 << 1;

/// Attributes reported to the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attr {
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
    /// `S_IF*` type bits plus permission and special bits
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
}

impl Attr {
    pub fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }
}

/// Identity the protocol engine keys a new inode on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StableAttr {
    /// `S_IF*` type bits only
    pub mode: u32,
    pub ino: u64,
}

impl From<&Attr> for StableAttr {
    fn from(attr: &Attr) -> Self {
        Self {
            mode: attr.file_type(),
            ino: attr.ino,
        }
    }
}

/// One directory entry as the kernel sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryOut {
    pub name: String,
    /// `S_IF*` type bits only
    pub mode: u32,
}

/// Attribute changes requested by the kernel; `None` means "leave alone"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetAttrIn {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<DateTime<Utc>>,
    pub mtime: Option<DateTime<Utc>>,
}
