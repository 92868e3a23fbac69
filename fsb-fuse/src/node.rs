// SPDX-License-Identifier: AGPL-3.0-or-later
//! Path-addressed nodes
//!
//! A [`PathNode`] answers the path-level requests of the kernel for one
//! backend path. It holds no state beyond the path itself; every request is
//! one or more backend calls whose failures are logged (except not-found)
//! and translated to an [`Errno`].

use chrono::{DateTime, Utc};
use fsb_core::{path, ContextualFs, Context, FileInfo, FileMode, FsError, OpenFlags};
use std::fmt;
use std::sync::Arc;
use tracing::error;

use crate::attr::attr_of;
use crate::errno::{Errno, FuseResult};
use crate::handle::FileHandle;
use crate::logger::Logger;
use crate::mode::{to_file_mode, to_fuse_mode, S_IFMT};
use crate::protocol::{Attr, DirEntryOut, SetAttrIn, StableAttr, FOPEN_KEEP_CACHE};

/// Proxy for one backend path
#[derive(Clone)]
pub struct PathNode {
    fs: Arc<dyn ContextualFs>,
    path: String,
    logger: Logger,
}

/// A node created by lookup, create, mkdir or symlink
pub struct NewChild {
    pub node: PathNode,
    pub attr: Attr,
    pub id: StableAttr,
}

impl fmt::Debug for PathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathNode").field("path", &self.path).finish_non_exhaustive()
    }
}

impl PathNode {
    pub fn new(fs: Arc<dyn ContextualFs>, path: impl Into<String>, logger: Logger) -> Self {
        Self {
            fs,
            path: path.into(),
            logger,
        }
    }

    pub fn root(fs: Arc<dyn ContextualFs>, logger: Logger) -> Self {
        Self::new(fs, path::ROOT, logger)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn fs(&self) -> &Arc<dyn ContextualFs> {
        &self.fs
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Whether `other` is served by the same backend instance.
    pub fn same_backend(&self, other: &PathNode) -> bool {
        Arc::ptr_eq(&self.fs, &other.fs)
    }

    /// Attributes of this node, taken from the open file when one is given
    /// and it can report them.
    pub async fn getattr(&self, ctx: &Context, fh: Option<&FileHandle>) -> FuseResult<Attr> {
        if let Some(fh) = fh {
            if let Ok(info) = fh.stat().await {
                return Ok(self.attr(&info));
            }
        }
        let info = self.stat(ctx, &self.path, "getattr").await?;
        Ok(self.attr(&info))
    }

    pub async fn lookup(&self, ctx: &Context, name: &str) -> FuseResult<NewChild> {
        let child_path = path::join(&self.path, name);
        let info = self.stat(ctx, &child_path, "lookup").await?;
        Ok(self.new_child(child_path, &info))
    }

    /// Directory entries in backend order.
    pub async fn readdir(&self, ctx: &Context) -> FuseResult<Vec<DirEntryOut>> {
        let entries = self
            .fs
            .read_dir(ctx, &self.path)
            .await
            .map_err(|err| self.fail("readdir", &self.path, err))?;

        Ok(entries
            .into_iter()
            .map(|entry| DirEntryOut {
                mode: to_fuse_mode(entry.file_type) & S_IFMT,
                name: entry.name,
            })
            .collect())
    }

    /// Open the backend file; the returned flags ask the kernel to keep its
    /// page cache.
    pub async fn open(&self, ctx: &Context, flags: OpenFlags) -> FuseResult<(FileHandle, u32)> {
        let file = self
            .fs
            .open_file(ctx, &self.path, flags, FileMode::default())
            .await
            .map_err(|err| self.fail("open", &self.path, err))?;
        Ok((FileHandle::new(file, self.logger.clone()), FOPEN_KEEP_CACHE))
    }

    /// Create and open `name` with permission bits `mode`.
    pub async fn create(
        &self,
        ctx: &Context,
        name: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> FuseResult<(NewChild, FileHandle, u32)> {
        let child_path = path::join(&self.path, name);
        let mut file = self
            .fs
            .open_file(ctx, &child_path, flags.with_create(), to_file_mode(mode))
            .await
            .map_err(|err| self.fail("create", &child_path, err))?;

        let info = match file.stat().await {
            Ok(info) => info,
            Err(err) => {
                let errno = self.fail("create: stat", &child_path, err);
                let _ = file.close().await;
                return Err(errno);
            }
        };

        let child = self.new_child(child_path, &info);
        Ok((child, FileHandle::new(file, self.logger.clone()), FOPEN_KEEP_CACHE))
    }

    pub async fn mkdir(&self, ctx: &Context, name: &str, mode: u32) -> FuseResult<NewChild> {
        let child_path = path::join(&self.path, name);
        self.fs
            .mkdir(ctx, &child_path, to_file_mode(mode))
            .await
            .map_err(|err| self.fail("mkdir", &child_path, err))?;

        let info = self.stat(ctx, &child_path, "mkdir: stat").await?;
        Ok(self.new_child(child_path, &info))
    }

    pub async fn unlink(&self, ctx: &Context, name: &str) -> FuseResult<()> {
        self.remove(ctx, name, "unlink").await
    }

    pub async fn rmdir(&self, ctx: &Context, name: &str) -> FuseResult<()> {
        self.remove(ctx, name, "rmdir").await
    }

    /// Create `name` as a symbolic link pointing at `target`.
    pub async fn symlink(&self, ctx: &Context, target: &str, name: &str) -> FuseResult<NewChild> {
        let child_path = path::join(&self.path, name);
        if let Err(err) = self.fs.symlink(ctx, target, &child_path).await {
            let errno = Errno::from(&err);
            if !err.is_not_found() {
                self.logger.in_scope(|| {
                    error!(op = "symlink", path = %child_path, link_target = target, error = %err, "symlink failed")
                });
            }
            return Err(errno);
        }

        let info = self.stat(ctx, &child_path, "symlink: stat").await?;
        Ok(self.new_child(child_path, &info))
    }

    pub async fn readlink(&self, ctx: &Context) -> FuseResult<Vec<u8>> {
        self.fs
            .read_link(ctx, &self.path)
            .await
            .map(String::into_bytes)
            .map_err(|err| self.fail("readlink", &self.path, err))
    }

    /// Move `name` to `new_name` under `new_parent`.
    ///
    /// Exchange and no-replace requests (any nonzero `flags`) fail with
    /// `ENOSYS`; a destination on another backend fails with `EXDEV`.
    pub async fn rename(
        &self,
        ctx: &Context,
        name: &str,
        new_parent: &PathNode,
        new_name: &str,
        flags: u32,
    ) -> FuseResult<()> {
        if flags != 0 {
            return Err(Errno::ENOSYS);
        }
        if !self.same_backend(new_parent) {
            return Err(Errno::EXDEV);
        }

        let old_path = path::join(&self.path, name);
        let new_path = path::join(&new_parent.path, new_name);
        self.fs.rename(ctx, &old_path, &new_path).await.map_err(|err| {
            let errno = Errno::from(&err);
            if !err.is_not_found() {
                self.logger.in_scope(|| {
                    error!(op = "rename", old_path = %old_path, new_path = %new_path, error = %err, "rename failed")
                });
            }
            errno
        })
    }

    /// Apply the requested changes in the order mode, ownership, times,
    /// size, stopping at the first failure, then report fresh attributes.
    pub async fn setattr(&self, ctx: &Context, fh: Option<&FileHandle>, input: &SetAttrIn) -> FuseResult<Attr> {
        if let Some(mode) = input.mode {
            self.fs
                .chmod(ctx, &self.path, to_file_mode(mode))
                .await
                .map_err(|err| self.fail("chmod", &self.path, err))?;
        }

        if input.uid.is_some() || input.gid.is_some() {
            let owner = input.uid.map(|uid| uid.to_string()).unwrap_or_default();
            let group = input.gid.map(|gid| gid.to_string()).unwrap_or_default();
            self.fs
                .change_owner_group(ctx, &self.path, &owner, &group)
                .await
                .map_err(|err| self.fail("chown", &self.path, err))?;
        }

        if input.atime.is_some() || input.mtime.is_some() {
            self.change_times(ctx, input.atime, input.mtime).await?;
        }

        if let Some(size) = input.size {
            self.fs
                .truncate(ctx, &self.path, size)
                .await
                .map_err(|err| self.fail("truncate", &self.path, err))?;
        }

        self.getattr(ctx, fh).await
    }

    async fn change_times(
        &self,
        ctx: &Context,
        atime: Option<DateTime<Utc>>,
        mtime: Option<DateTime<Utc>>,
    ) -> FuseResult<()> {
        let (accessed, modified) = match (atime, mtime) {
            (Some(accessed), Some(modified)) => (accessed, modified),
            _ => {
                let info = self.stat(ctx, &self.path, "chtimes: stat").await?;
                let modified = mtime.unwrap_or(info.modified);
                let accessed = atime.unwrap_or_else(|| self.access_time(&info));
                (accessed, modified)
            }
        };

        self.fs
            .change_times(ctx, &self.path, accessed, modified)
            .await
            .map_err(|err| self.fail("chtimes", &self.path, err))
    }

    /// Best known access time of `info`.
    fn access_time(&self, info: &FileInfo) -> DateTime<Utc> {
        if let Some(extended) = info.extended.as_ref().cloned().or_else(|| self.fs.extend_file_info(info)) {
            return extended.accessed;
        }
        info.raw
            .and_then(|raw| DateTime::from_timestamp(raw.atime.secs, raw.atime.nsecs))
            .unwrap_or(info.modified)
    }

    async fn remove(&self, ctx: &Context, name: &str, op: &'static str) -> FuseResult<()> {
        let child_path = path::join(&self.path, name);
        self.fs
            .remove(ctx, &child_path)
            .await
            .map_err(|err| self.fail(op, &child_path, err))
    }

    async fn stat(&self, ctx: &Context, path: &str, op: &'static str) -> FuseResult<FileInfo> {
        self.fs.stat(ctx, path).await.map_err(|err| self.fail(op, path, err))
    }

    fn attr(&self, info: &FileInfo) -> Attr {
        attr_of(info, self.fs.as_ref())
    }

    fn new_child(&self, child_path: String, info: &FileInfo) -> NewChild {
        let attr = self.attr(info);
        NewChild {
            node: PathNode::new(Arc::clone(&self.fs), child_path, self.logger.clone()),
            id: StableAttr::from(&attr),
            attr,
        }
    }

    /// Log `err` unless it is a plain not-found, and translate it.
    fn fail(&self, op: &'static str, path: &str, err: FsError) -> Errno {
        let errno = Errno::from(&err);
        if !err.is_not_found() {
            self.logger.in_scope(|| error!(op, path, error = %err, "{op} failed"));
        }
        errno
    }
}
