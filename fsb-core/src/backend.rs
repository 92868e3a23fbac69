// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage backend traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::SeekFrom;

use crate::{
    context::Context,
    entry::DirEntry,
    error::{FsError, FsResult},
    metadata::{ExtendedMetadata, FileInfo, FileMode},
    operations::OpenFlags,
};

/// What an open file can do beyond plain sequential `read`/`write`.
///
/// Decided once when the file is opened and never re-probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileCapabilities {
    /// `read_at`/`write_at` are implemented
    pub random_access: bool,
    /// `seek` is implemented
    pub seek: bool,
}

impl FileCapabilities {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn seekable() -> Self {
        Self { seek: true, ..Default::default() }
    }

    pub fn full() -> Self {
        Self { random_access: true, seek: true }
    }
}

/// An open backend file
///
/// A `read` that returns `Ok(0)` for a non-empty buffer means end of
/// stream. The optional methods default to [`FsError::Unsupported`]; a file
/// advertising a capability may still answer `Unsupported` for a given call.
/// `stat` takes `&self`, so implementations must be `Sync` as well.
#[async_trait]
pub trait BackendFile: Send + Sync {
    fn capabilities(&self) -> FileCapabilities;

    async fn read(&mut self, buf: &mut [u8]) -> FsResult<usize>;

    async fn write(&mut self, _buf: &[u8]) -> FsResult<usize> {
        Err(FsError::unsupported("write"))
    }

    async fn read_at(&mut self, _buf: &mut [u8], _offset: u64) -> FsResult<usize> {
        Err(FsError::unsupported("read_at"))
    }

    async fn write_at(&mut self, _buf: &[u8], _offset: u64) -> FsResult<usize> {
        Err(FsError::unsupported("write_at"))
    }

    async fn seek(&mut self, _pos: SeekFrom) -> FsResult<u64> {
        Err(FsError::unsupported("seek"))
    }

    async fn stat(&self) -> FsResult<FileInfo>;

    async fn close(&mut self) -> FsResult<()>;
}

/// Path-addressed filesystem
///
/// Paths are `/`-separated and relative to the backend root (`"."`).
/// Only `stat`, `open_file` and `read_dir` are mandatory; everything else
/// defaults to [`FsError::Unsupported`].
#[async_trait]
pub trait ContextualFs: Send + Sync {
    /// Metadata of `path`, not following a final symlink.
    async fn stat(&self, ctx: &Context, path: &str) -> FsResult<FileInfo>;

    async fn open_file(
        &self,
        ctx: &Context,
        path: &str,
        flags: OpenFlags,
        mode: FileMode,
    ) -> FsResult<Box<dyn BackendFile>>;

    /// Entries of the directory at `path`, in backend order.
    async fn read_dir(&self, ctx: &Context, path: &str) -> FsResult<Vec<DirEntry>>;

    async fn mkdir(&self, _ctx: &Context, _path: &str, _mode: FileMode) -> FsResult<()> {
        Err(FsError::unsupported("mkdir"))
    }

    /// Remove a file or an empty directory.
    async fn remove(&self, _ctx: &Context, _path: &str) -> FsResult<()> {
        Err(FsError::unsupported("remove"))
    }

    async fn symlink(&self, _ctx: &Context, _target: &str, _path: &str) -> FsResult<()> {
        Err(FsError::unsupported("symlink"))
    }

    async fn read_link(&self, _ctx: &Context, _path: &str) -> FsResult<String> {
        Err(FsError::unsupported("read_link"))
    }

    async fn rename(&self, _ctx: &Context, _old_path: &str, _new_path: &str) -> FsResult<()> {
        Err(FsError::unsupported("rename"))
    }

    async fn chmod(&self, _ctx: &Context, _path: &str, _mode: FileMode) -> FsResult<()> {
        Err(FsError::unsupported("chmod"))
    }

    /// Change owner and group together. An empty string leaves that half
    /// unchanged.
    async fn change_owner_group(&self, _ctx: &Context, _path: &str, _owner: &str, _group: &str) -> FsResult<()> {
        Err(FsError::unsupported("change_owner_group"))
    }

    async fn change_times(
        &self,
        _ctx: &Context,
        _path: &str,
        _accessed: DateTime<Utc>,
        _modified: DateTime<Utc>,
    ) -> FsResult<()> {
        Err(FsError::unsupported("change_times"))
    }

    async fn truncate(&self, _ctx: &Context, _path: &str, _size: u64) -> FsResult<()> {
        Err(FsError::unsupported("truncate"))
    }

    /// Synthesize [`ExtendedMetadata`] for a [`FileInfo`] that did not
    /// carry any, if the backend has another way to learn it.
    fn extend_file_info(&self, _info: &FileInfo) -> Option<ExtendedMetadata> {
        None
    }
}
