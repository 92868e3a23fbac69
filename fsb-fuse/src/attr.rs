// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filling kernel attributes from backend metadata
//!
//! Every backend reports size, mode and modification time. On top of that a
//! [`FileInfo`] may carry [`ExtendedMetadata`] (owner and group names,
//! access and change times) and/or a [`RawStat`] from the host. The rules:
//!
//! 1. Extended metadata wins for times and ownership.
//! 2. Otherwise the raw stat fills everything it knows.
//! 3. Otherwise the backend may synthesize extended metadata.
//!
//! Inode, device and block information only exist in the raw stat, so they
//! are merged in even when extended metadata was used. Directories always
//! report at least two links.

use fsb_core::{ContextualFs, ExtendedMetadata, FileInfo, RawStat, Timespec};
use nix::unistd::{Group, User};

use crate::mode::to_fuse_mode;
use crate::protocol::Attr;

/// Block size reported when the backend does not know better
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Translate `info` into a fresh [`Attr`].
pub fn attr_of(info: &FileInfo, fs: &dyn ContextualFs) -> Attr {
    let mut out = Attr::default();
    fill_attr(info, fs, &mut out);
    out
}

/// Populate `out` from `info`. `fs` is asked to synthesize extended
/// metadata when `info` carries neither extended metadata nor a raw stat.
pub fn fill_attr(info: &FileInfo, fs: &dyn ContextualFs, out: &mut Attr) {
    out.size = info.size;
    out.mode = to_fuse_mode(info.mode);
    out.mtime = Timespec::from(info.modified);
    out.atime = out.mtime;
    out.ctime = out.mtime;
    out.blksize = DEFAULT_BLOCK_SIZE;
    out.nlink = 1;

    if let Some(extended) = &info.extended {
        fill_from_extended(extended, out);
    } else if let Some(raw) = &info.raw {
        fill_from_raw(raw, out);
    } else if let Some(extended) = fs.extend_file_info(info) {
        fill_from_extended(&extended, out);
    }

    if let (Some(_), Some(raw)) = (&info.extended, &info.raw) {
        out.ino = raw.ino;
        out.rdev = raw.rdev as u32;
        out.blksize = raw.blksize as u32;
        out.blocks = raw.blocks;
        if raw.nlink > 0 {
            out.nlink = raw.nlink as u32;
        }
    }

    // "." and the entry in the parent
    if info.is_dir() && out.nlink < 2 {
        out.nlink = 2;
    }
}

fn fill_from_extended(extended: &ExtendedMetadata, out: &mut Attr) {
    out.atime = Timespec::from(extended.accessed);
    out.ctime = Timespec::from(extended.changed);

    if let Some(uid) = resolve_owner(&extended.owner) {
        out.uid = uid;
    }
    if let Some(gid) = resolve_group(&extended.group) {
        out.gid = gid;
    }
}

fn fill_from_raw(raw: &RawStat, out: &mut Attr) {
    out.ino = raw.ino;
    out.nlink = raw.nlink as u32;
    out.uid = raw.uid;
    out.gid = raw.gid;
    out.rdev = raw.rdev as u32;
    out.blksize = raw.blksize as u32;
    out.blocks = raw.blocks;
    out.atime = raw.atime;
    out.ctime = raw.ctime;
}

/// Numeric uid for an owner string: decimal first, then the account database.
pub fn resolve_owner(owner: &str) -> Option<u32> {
    if let Ok(uid) = owner.parse::<u32>() {
        return Some(uid);
    }
    User::from_name(owner).ok().flatten().map(|user| user.uid.as_raw())
}

/// Numeric gid for a group string: decimal first, then the group database.
pub fn resolve_group(group: &str) -> Option<u32> {
    if let Ok(gid) = group.parse::<u32>() {
        return Some(gid);
    }
    Group::from_name(group).ok().flatten().map(|group| group.gid.as_raw())
}
