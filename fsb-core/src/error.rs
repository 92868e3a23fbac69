// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for fsbridge backends

use std::io;
use thiserror::Error;

/// Result type alias
pub type FsResult<T> = Result<T, FsError>;

/// Failure reported by a backend call
#[derive(Error, Debug)]
pub enum FsError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A canonical system error code, passed through to the kernel unchanged.
    #[error("System error: errno {0}")]
    Errno(i32),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl FsError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        FsError::Unsupported(what.into())
    }

    /// The system error code this failure already carries, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            FsError::Errno(code) => Some(*code),
            FsError::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound(_) => true,
            FsError::Errno(code) => *code == libc::ENOENT,
            FsError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether the failure means "this object cannot do that at all".
    ///
    /// ENOSYS, ENOTSUP and EOPNOTSUPP count as well, so a backend that
    /// reports a raw code is treated the same as one returning
    /// [`FsError::Unsupported`].
    pub fn is_unsupported(&self) -> bool {
        if let Some(code) = self.raw_os_error() {
            return code == libc::ENOSYS || code == libc::ENOTSUP || code == libc::EOPNOTSUPP;
        }
        match self {
            FsError::Unsupported(_) => true,
            FsError::Io(err) => err.kind() == io::ErrorKind::Unsupported,
            _ => false,
        }
    }
}
