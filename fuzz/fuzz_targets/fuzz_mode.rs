// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for kernel/host mode translation

#![no_main]

use fsb_fuse::mode::{
    to_file_mode, to_fuse_mode, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK,
};
use libfuzzer_sys::fuzz_target;

const KNOWN_TYPES: [u32; 7] = [S_IFREG, S_IFDIR, S_IFLNK, S_IFIFO, S_IFSOCK, S_IFCHR, S_IFBLK];

fuzz_target!(|mode: u32| {
    let back = to_fuse_mode(to_file_mode(mode));

    // permission and special bits always survive
    assert_eq!(back & 0o7777, mode & 0o7777);

    let kind = mode & S_IFMT;
    if KNOWN_TYPES.contains(&kind) {
        assert_eq!(back & S_IFMT, kind);
    } else {
        assert_eq!(back & S_IFMT, S_IFREG);
    }
});
