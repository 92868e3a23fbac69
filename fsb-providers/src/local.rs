// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local filesystem backend

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fsb_core::{
    path, BackendFile, Context, ContextualFs, DirEntry, ExtendedMetadata, FileCapabilities, FileInfo, FileMode,
    FsError, FsResult, OpenFlags, RawStat,
};
use std::ffi::CString;
use std::fs::Metadata;
use std::io::SeekFrom;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

/// A host directory served as a backend
///
/// Stat results carry both extended metadata (numeric owner and group,
/// access and change times) and the raw host stat.
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a backend path; paths escaping the root are rejected.
    fn to_real_path(&self, rel: &str) -> FsResult<PathBuf> {
        let cleaned = path::clean(rel);
        if cleaned == ".." || cleaned.starts_with("../") || cleaned.starts_with('/') {
            return Err(FsError::InvalidArgument(rel.to_string()));
        }
        let mut real = self.root.clone();
        if cleaned != path::ROOT {
            for seg in cleaned.split('/') {
                real.push(seg);
            }
        }
        Ok(real)
    }
}

/// Type flags of a host file type
fn type_mode(ft: std::fs::FileType) -> FileMode {
    if ft.is_dir() {
        FileMode::DIR
    } else if ft.is_symlink() {
        FileMode::SYMLINK
    } else if ft.is_char_device() {
        FileMode::DEVICE | FileMode::CHAR_DEVICE
    } else if ft.is_block_device() {
        FileMode::DEVICE
    } else if ft.is_fifo() {
        FileMode::NAMED_PIPE
    } else if ft.is_socket() {
        FileMode::SOCKET
    } else {
        FileMode::default()
    }
}

fn file_mode(meta: &Metadata) -> FileMode {
    let raw = meta.mode();
    let mut mode = type_mode(meta.file_type()) | FileMode::from_bits(raw & 0o777);
    if raw & libc::S_ISUID as u32 != 0 {
        mode |= FileMode::SETUID;
    }
    if raw & libc::S_ISGID as u32 != 0 {
        mode |= FileMode::SETGID;
    }
    if raw & libc::S_ISVTX as u32 != 0 {
        mode |= FileMode::STICKY;
    }
    mode
}

/// Permission and special bits of `mode` in host encoding
fn host_permissions(mode: FileMode) -> u32 {
    let mut bits = mode.perm();
    if mode.contains(FileMode::SETUID) {
        bits |= libc::S_ISUID as u32;
    }
    if mode.contains(FileMode::SETGID) {
        bits |= libc::S_ISGID as u32;
    }
    if mode.contains(FileMode::STICKY) {
        bits |= libc::S_ISVTX as u32;
    }
    bits
}

fn timestamp(secs: i64, nsecs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, nsecs as u32).single().unwrap_or_default()
}

fn file_info(name: &str, meta: &Metadata) -> FileInfo {
    let modified = timestamp(meta.mtime(), meta.mtime_nsec());
    FileInfo::new(name, meta.len(), file_mode(meta), modified)
        .with_extended(ExtendedMetadata {
            accessed: timestamp(meta.atime(), meta.atime_nsec()),
            changed: timestamp(meta.ctime(), meta.ctime_nsec()),
            owner: meta.uid().to_string(),
            group: meta.gid().to_string(),
        })
        .with_raw(RawStat::from(meta))
}

fn c_path(real: &Path) -> FsResult<CString> {
    CString::new(real.as_os_str().as_bytes()).map_err(|_| FsError::InvalidArgument(real.display().to_string()))
}

/// Numeric id from an owner or group string; empty means "leave unchanged".
fn parse_id(value: &str) -> FsResult<Option<u32>> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| FsError::InvalidArgument(format!("not a numeric id: {value}")))
}

fn to_timespec(time: DateTime<Utc>) -> libc::timespec {
    libc::timespec {
        tv_sec: time.timestamp() as libc::time_t,
        tv_nsec: time.timestamp_subsec_nanos() as libc::c_long,
    }
}

#[async_trait]
impl ContextualFs for LocalFs {
    async fn stat(&self, _ctx: &Context, rel: &str) -> FsResult<FileInfo> {
        let real = self.to_real_path(rel)?;
        let meta = fs::symlink_metadata(&real).await?;
        Ok(file_info(path::base(rel), &meta))
    }

    async fn open_file(
        &self,
        _ctx: &Context,
        rel: &str,
        flags: OpenFlags,
        mode: FileMode,
    ) -> FsResult<Box<dyn BackendFile>> {
        let real = self.to_real_path(rel)?;
        let mut options = fs::OpenOptions::new();
        options
            .read(flags.is_readable())
            .write(flags.is_writable())
            .append(flags.is_append())
            .truncate(flags.is_truncate())
            .mode(host_permissions(mode));
        if flags.is_create() {
            if flags.is_exclusive() {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }

        let file = options.open(&real).await?;
        debug!(path = rel, flags = flags.bits(), "opened local file");
        Ok(Box::new(LocalFile {
            file,
            name: path::base(rel).to_string(),
        }))
    }

    async fn read_dir(&self, _ctx: &Context, rel: &str) -> FsResult<Vec<DirEntry>> {
        let real = self.to_real_path(rel)?;
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&real).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push(DirEntry::new(entry.file_name().to_string_lossy(), type_mode(file_type)));
        }
        Ok(entries)
    }

    async fn mkdir(&self, _ctx: &Context, rel: &str, mode: FileMode) -> FsResult<()> {
        let real = self.to_real_path(rel)?;
        fs::DirBuilder::new().mode(host_permissions(mode)).create(&real).await?;
        Ok(())
    }

    async fn remove(&self, _ctx: &Context, rel: &str) -> FsResult<()> {
        let real = self.to_real_path(rel)?;
        if fs::symlink_metadata(&real).await?.is_dir() {
            fs::remove_dir(&real).await?;
        } else {
            fs::remove_file(&real).await?;
        }
        Ok(())
    }

    async fn symlink(&self, _ctx: &Context, target: &str, rel: &str) -> FsResult<()> {
        let real = self.to_real_path(rel)?;
        fs::symlink(target, &real).await?;
        Ok(())
    }

    async fn read_link(&self, _ctx: &Context, rel: &str) -> FsResult<String> {
        let real = self.to_real_path(rel)?;
        let target = fs::read_link(&real).await?;
        Ok(target.to_string_lossy().into_owned())
    }

    async fn rename(&self, _ctx: &Context, old_path: &str, new_path: &str) -> FsResult<()> {
        let from = self.to_real_path(old_path)?;
        let to = self.to_real_path(new_path)?;
        fs::rename(&from, &to).await?;
        Ok(())
    }

    async fn chmod(&self, _ctx: &Context, rel: &str, mode: FileMode) -> FsResult<()> {
        let real = self.to_real_path(rel)?;
        fs::set_permissions(&real, std::fs::Permissions::from_mode(host_permissions(mode))).await?;
        Ok(())
    }

    async fn change_owner_group(&self, _ctx: &Context, rel: &str, owner: &str, group: &str) -> FsResult<()> {
        let real = self.to_real_path(rel)?;
        let uid = parse_id(owner)?;
        let gid = parse_id(group)?;
        tokio::task::spawn_blocking(move || std::os::unix::fs::lchown(&real, uid, gid))
            .await
            .map_err(|e| FsError::Other(e.to_string()))??;
        Ok(())
    }

    async fn change_times(
        &self,
        _ctx: &Context,
        rel: &str,
        accessed: DateTime<Utc>,
        modified: DateTime<Utc>,
    ) -> FsResult<()> {
        let path = c_path(&self.to_real_path(rel)?)?;
        let times = [to_timespec(accessed), to_timespec(modified)];
        tokio::task::spawn_blocking(move || {
            let ret = unsafe {
                libc::utimensat(libc::AT_FDCWD, path.as_ptr(), times.as_ptr(), libc::AT_SYMLINK_NOFOLLOW)
            };
            if ret != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        })
        .await
        .map_err(|e| FsError::Other(e.to_string()))??;
        Ok(())
    }

    async fn truncate(&self, _ctx: &Context, rel: &str, size: u64) -> FsResult<()> {
        let real = self.to_real_path(rel)?;
        let file = fs::OpenOptions::new().write(true).open(&real).await?;
        file.set_len(size).await?;
        Ok(())
    }
}

/// An open host file
struct LocalFile {
    file: fs::File,
    name: String,
}

#[async_trait]
impl BackendFile for LocalFile {
    fn capabilities(&self) -> FileCapabilities {
        FileCapabilities::seekable()
    }

    async fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        Ok(self.file.read(buf).await?)
    }

    async fn write(&mut self, buf: &[u8]) -> FsResult<usize> {
        Ok(self.file.write(buf).await?)
    }

    async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        Ok(self.file.seek(pos).await?)
    }

    async fn stat(&self) -> FsResult<FileInfo> {
        let meta = self.file.metadata().await?;
        Ok(file_info(&self.name, &meta))
    }

    async fn close(&mut self) -> FsResult<()> {
        self.file.flush().await?;
        Ok(())
    }
}
