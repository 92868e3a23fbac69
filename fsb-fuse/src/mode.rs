// SPDX-License-Identifier: AGPL-3.0-or-later
//! Conversion between kernel mode words and [`FileMode`]
//!
//! The kernel speaks POSIX `st_mode`: a type field under `S_IFMT`, the
//! setuid/setgid/sticky bits and nine permission bits. [`FileMode`] keeps
//! type and special bits as separate flags. Both directions are exact for
//! every type and special-bit combination.

use fsb_core::FileMode;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;
pub const S_ISUID: u32 = 0o4000;
pub const S_ISGID: u32 = 0o2000;
pub const S_ISVTX: u32 = 0o1000;

const PERM_BITS: u32 = 0o777;

/// Kernel mode word to host mode.
pub fn to_file_mode(mode: u32) -> FileMode {
    let mut m = FileMode::from_bits(mode & PERM_BITS);
    match mode & S_IFMT {
        S_IFDIR => m |= FileMode::DIR,
        S_IFCHR => m |= FileMode::DEVICE | FileMode::CHAR_DEVICE,
        S_IFBLK => m |= FileMode::DEVICE,
        S_IFIFO => m |= FileMode::NAMED_PIPE,
        S_IFLNK => m |= FileMode::SYMLINK,
        S_IFSOCK => m |= FileMode::SOCKET,
        _ => {}
    }
    if mode & S_ISUID != 0 {
        m |= FileMode::SETUID;
    }
    if mode & S_ISGID != 0 {
        m |= FileMode::SETGID;
    }
    if mode & S_ISVTX != 0 {
        m |= FileMode::STICKY;
    }
    m
}

/// Host mode to kernel mode word.
pub fn to_fuse_mode(mode: FileMode) -> u32 {
    let mut m = mode.perm();
    m |= if mode.intersects(FileMode::DIR) {
        S_IFDIR
    } else if mode.intersects(FileMode::SYMLINK) {
        S_IFLNK
    } else if mode.intersects(FileMode::NAMED_PIPE) {
        S_IFIFO
    } else if mode.intersects(FileMode::SOCKET) {
        S_IFSOCK
    } else if mode.intersects(FileMode::DEVICE) {
        if mode.intersects(FileMode::CHAR_DEVICE) {
            S_IFCHR
        } else {
            S_IFBLK
        }
    } else {
        S_IFREG
    };
    if mode.intersects(FileMode::SETUID) {
        m |= S_ISUID;
    }
    if mode.intersects(FileMode::SETGID) {
        m |= S_ISGID;
    }
    if mode.intersects(FileMode::STICKY) {
        m |= S_ISVTX;
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: [(u32, FileMode); 7] = [
        (S_IFDIR, FileMode::DIR),
        (S_IFCHR, FileMode::from_bits(FileMode::DEVICE.bits() | FileMode::CHAR_DEVICE.bits())),
        (S_IFBLK, FileMode::DEVICE),
        (S_IFREG, FileMode::from_bits(0)),
        (S_IFIFO, FileMode::NAMED_PIPE),
        (S_IFLNK, FileMode::SYMLINK),
        (S_IFSOCK, FileMode::SOCKET),
    ];

    fn specials(combo: u32) -> (u32, FileMode) {
        let mut raw = 0;
        let mut flags = FileMode::default();
        if combo & 1 != 0 {
            raw |= S_ISUID;
            flags |= FileMode::SETUID;
        }
        if combo & 2 != 0 {
            raw |= S_ISGID;
            flags |= FileMode::SETGID;
        }
        if combo & 4 != 0 {
            raw |= S_ISVTX;
            flags |= FileMode::STICKY;
        }
        (raw, flags)
    }

    #[test]
    fn test_type_table() {
        for (raw_type, flags) in TYPES {
            let host = to_file_mode(raw_type | 0o644);
            assert_eq!(host, flags | FileMode::from_bits(0o644), "{raw_type:o}");
            assert_eq!(to_fuse_mode(host), raw_type | 0o644);
        }
    }

    #[test]
    fn test_round_trip_all_types_and_specials() {
        for perm in [0o644, 0o755, 0o777] {
            for (raw_type, type_flags) in TYPES {
                for combo in 0..8 {
                    let (raw_special, special_flags) = specials(combo);
                    let raw = raw_type | raw_special | perm;
                    let host = type_flags | special_flags | FileMode::from_bits(perm);

                    assert_eq!(to_fuse_mode(to_file_mode(raw)), raw, "kernel {raw:o}");
                    assert_eq!(to_file_mode(to_fuse_mode(host)), host, "host {host:?}");
                }
            }
        }
    }

    #[test]
    fn test_permission_bits_pass_through() {
        for perm in 0..=0o777 {
            assert_eq!(to_file_mode(S_IFREG | perm).perm(), perm);
            assert_eq!(to_fuse_mode(FileMode::from_bits(perm)) & 0o777, perm);
        }
    }

    #[test]
    fn test_missing_type_is_regular() {
        assert!(to_file_mode(0o600).is_regular());
        assert_eq!(to_fuse_mode(to_file_mode(0o600)) & S_IFMT, S_IFREG);
    }
}
