// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation arguments

use serde::{Deserialize, Serialize};

/// Open flags as the kernel passes them (`O_RDONLY`, `O_CREAT`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenFlags(i32);

impl OpenFlags {
    pub const fn from_bits(bits: i32) -> Self {
        OpenFlags(bits)
    }

    pub const fn bits(self) -> i32 {
        self.0
    }

    pub const fn with_create(self) -> Self {
        OpenFlags(self.0 | libc::O_CREAT)
    }

    pub const fn access_mode(self) -> i32 {
        self.0 & libc::O_ACCMODE
    }

    pub const fn is_create(self) -> bool {
        self.0 & libc::O_CREAT != 0
    }

    pub const fn is_truncate(self) -> bool {
        self.0 & libc::O_TRUNC != 0
    }

    pub const fn is_append(self) -> bool {
        self.0 & libc::O_APPEND != 0
    }

    pub const fn is_exclusive(self) -> bool {
        self.0 & libc::O_EXCL != 0
    }

    pub const fn is_readable(self) -> bool {
        let mode = self.access_mode();
        mode == libc::O_RDONLY || mode == libc::O_RDWR
    }

    pub const fn is_writable(self) -> bool {
        let mode = self.access_mode();
        mode == libc::O_WRONLY || mode == libc::O_RDWR
    }
}
