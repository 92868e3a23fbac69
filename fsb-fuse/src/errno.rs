// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend failure to system error code translation

use fsb_core::{FsError, FsResult};
use libc::c_int;
use std::fmt;
use std::io;

/// Result of an operation on the kernel-facing boundary
pub type FuseResult<T> = Result<T, Errno>;

/// A system error code as the kernel expects it
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Errno(pub c_int);

impl Errno {
    pub const SUCCESS: Errno = Errno(0);
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const EPERM: Errno = Errno(libc::EPERM);
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    pub const ENOSYS: Errno = Errno(libc::ENOSYS);
    pub const EXDEV: Errno = Errno(libc::EXDEV);
    pub const EIO: Errno = Errno(libc::EIO);

    pub const fn code(self) -> c_int {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Errno({})", self.0)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_success() {
            return write!(f, "success");
        }
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

impl std::error::Error for Errno {}

impl From<&FsError> for Errno {
    fn from(err: &FsError) -> Self {
        if let Some(code) = err.raw_os_error() {
            return Errno(code);
        }
        let kind = match err {
            FsError::Io(io_err) => Some(io_err.kind()),
            _ => None,
        };
        match (err, kind) {
            (FsError::NotFound(_), _) | (_, Some(io::ErrorKind::NotFound)) => Errno::ENOENT,
            (FsError::PermissionDenied(_), _) | (_, Some(io::ErrorKind::PermissionDenied)) => Errno::EPERM,
            (FsError::InvalidArgument(_), _) | (_, Some(io::ErrorKind::InvalidInput)) => Errno::EINVAL,
            (FsError::AlreadyExists(_), _) | (_, Some(io::ErrorKind::AlreadyExists)) => Errno::EEXIST,
            _ if err.is_unsupported() => Errno::ENOSYS,
            _ => Errno::EIO,
        }
    }
}

impl From<FsError> for Errno {
    fn from(err: FsError) -> Self {
        Errno::from(&err)
    }
}

/// Translate the outcome of a backend call; success maps to [`Errno::SUCCESS`].
pub fn errno_of<T>(result: &FsResult<T>) -> Errno {
    match result {
        Ok(_) => Errno::SUCCESS,
        Err(err) => Errno::from(err),
    }
}
