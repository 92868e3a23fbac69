// SPDX-License-Identifier: AGPL-3.0-or-later
//! Owner and group rewriting decorator

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fsb_core::{
    BackendFile, Context, ContextualFs, DirEntry, ExtendedMetadata, FileCapabilities, FileInfo, FileMode, FsResult,
    NameMapper, OpenFlags,
};
use std::io::SeekFrom;
use std::sync::Arc;

/// Wraps a backend and passes the owner and group of every stat result
/// through mapper functions.
///
/// Only extended metadata is rewritten; a result without any is returned
/// as is. Open files remember the context they were opened with, so their
/// `stat` maps for the same caller.
pub struct MapOwnership {
    inner: Arc<dyn ContextualFs>,
    owner: Option<NameMapper>,
    group: Option<NameMapper>,
}

impl MapOwnership {
    pub fn new(inner: Arc<dyn ContextualFs>) -> Self {
        Self {
            inner,
            owner: None,
            group: None,
        }
    }

    pub fn with_owner(mut self, mapper: NameMapper) -> Self {
        self.owner = Some(mapper);
        self
    }

    pub fn with_group(mut self, mapper: NameMapper) -> Self {
        self.group = Some(mapper);
        self
    }
}

#[derive(Clone)]
struct Mappers {
    owner: Option<NameMapper>,
    group: Option<NameMapper>,
}

impl Mappers {
    fn apply(&self, ctx: &Context, mut info: FileInfo) -> FileInfo {
        if let Some(extended) = info.extended.as_mut() {
            if let Some(owner) = &self.owner {
                extended.owner = owner(ctx, &extended.owner);
            }
            if let Some(group) = &self.group {
                extended.group = group(ctx, &extended.group);
            }
        }
        info
    }
}

impl MapOwnership {
    fn mappers(&self) -> Mappers {
        Mappers {
            owner: self.owner.clone(),
            group: self.group.clone(),
        }
    }
}

#[async_trait]
impl ContextualFs for MapOwnership {
    async fn stat(&self, ctx: &Context, path: &str) -> FsResult<FileInfo> {
        let info = self.inner.stat(ctx, path).await?;
        Ok(self.mappers().apply(ctx, info))
    }

    async fn open_file(
        &self,
        ctx: &Context,
        path: &str,
        flags: OpenFlags,
        mode: FileMode,
    ) -> FsResult<Box<dyn BackendFile>> {
        let file = self.inner.open_file(ctx, path, flags, mode).await?;
        Ok(Box::new(MappedFile {
            inner: file,
            ctx: ctx.clone(),
            mappers: self.mappers(),
        }))
    }

    async fn read_dir(&self, ctx: &Context, path: &str) -> FsResult<Vec<DirEntry>> {
        self.inner.read_dir(ctx, path).await
    }

    async fn mkdir(&self, ctx: &Context, path: &str, mode: FileMode) -> FsResult<()> {
        self.inner.mkdir(ctx, path, mode).await
    }

    async fn remove(&self, ctx: &Context, path: &str) -> FsResult<()> {
        self.inner.remove(ctx, path).await
    }

    async fn symlink(&self, ctx: &Context, target: &str, path: &str) -> FsResult<()> {
        self.inner.symlink(ctx, target, path).await
    }

    async fn read_link(&self, ctx: &Context, path: &str) -> FsResult<String> {
        self.inner.read_link(ctx, path).await
    }

    async fn rename(&self, ctx: &Context, old_path: &str, new_path: &str) -> FsResult<()> {
        self.inner.rename(ctx, old_path, new_path).await
    }

    async fn chmod(&self, ctx: &Context, path: &str, mode: FileMode) -> FsResult<()> {
        self.inner.chmod(ctx, path, mode).await
    }

    async fn change_owner_group(&self, ctx: &Context, path: &str, owner: &str, group: &str) -> FsResult<()> {
        self.inner.change_owner_group(ctx, path, owner, group).await
    }

    async fn change_times(
        &self,
        ctx: &Context,
        path: &str,
        accessed: DateTime<Utc>,
        modified: DateTime<Utc>,
    ) -> FsResult<()> {
        self.inner.change_times(ctx, path, accessed, modified).await
    }

    async fn truncate(&self, ctx: &Context, path: &str, size: u64) -> FsResult<()> {
        self.inner.truncate(ctx, path, size).await
    }

    fn extend_file_info(&self, info: &FileInfo) -> Option<ExtendedMetadata> {
        self.inner.extend_file_info(info)
    }
}

struct MappedFile {
    inner: Box<dyn BackendFile>,
    ctx: Context,
    mappers: Mappers,
}

#[async_trait]
impl BackendFile for MappedFile {
    fn capabilities(&self) -> FileCapabilities {
        self.inner.capabilities()
    }

    async fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        self.inner.read(buf).await
    }

    async fn write(&mut self, buf: &[u8]) -> FsResult<usize> {
        self.inner.write(buf).await
    }

    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.inner.read_at(buf, offset).await
    }

    async fn write_at(&mut self, buf: &[u8], offset: u64) -> FsResult<usize> {
        self.inner.write_at(buf, offset).await
    }

    async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        self.inner.seek(pos).await
    }

    async fn stat(&self) -> FsResult<FileInfo> {
        let info = self.inner.stat().await?;
        Ok(self.mappers.apply(&self.ctx, info))
    }

    async fn close(&mut self) -> FsResult<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalFs;
    use fsb_core::Caller;

    fn caller_uid() -> NameMapper {
        Arc::new(|ctx: &Context, _: &str| ctx.caller().map(|c| c.uid.to_string()).unwrap_or_default())
    }

    fn fixed(name: &'static str) -> NameMapper {
        Arc::new(move |_: &Context, _: &str| name.to_string())
    }

    #[tokio::test]
    async fn test_stat_is_mapped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"abc").unwrap();
        let fs = MapOwnership::new(Arc::new(LocalFs::new(dir.path())))
            .with_owner(caller_uid())
            .with_group(fixed("staff"));
        let ctx = Context::for_caller(Caller { uid: 4242, gid: 1, pid: 1 });

        let extended = fs.stat(&ctx, "f").await.unwrap().extended.unwrap();
        assert_eq!(extended.owner, "4242");
        assert_eq!(extended.group, "staff");
    }

    #[tokio::test]
    async fn test_unmapped_half_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"").unwrap();
        let local = Arc::new(LocalFs::new(dir.path()));
        let original = local.stat(&Context::new(), "f").await.unwrap().extended.unwrap();

        let fs = MapOwnership::new(local).with_owner(fixed("nobody"));
        let extended = fs.stat(&Context::new(), "f").await.unwrap().extended.unwrap();
        assert_eq!(extended.owner, "nobody");
        assert_eq!(extended.group, original.group);
    }

    #[tokio::test]
    async fn test_open_file_stat_uses_open_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"abc").unwrap();
        let fs = MapOwnership::new(Arc::new(LocalFs::new(dir.path()))).with_owner(caller_uid());
        let ctx = Context::for_caller(Caller { uid: 7, gid: 7, pid: 7 });

        let mut file = fs
            .open_file(&ctx, "f", OpenFlags::from_bits(libc::O_RDONLY), FileMode::default())
            .await
            .unwrap();
        let info = file.stat().await.unwrap();
        assert_eq!(info.extended.unwrap().owner, "7");
        assert_eq!(info.size, 3);

        let mut buf = [0u8; 3];
        assert_eq!(file.read(&mut buf).await.unwrap(), 3);
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_mapped_file_stat_through_handle() {
        use fsb_fuse::{FileHandle, Logger};

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"abcd").unwrap();
        let fs = MapOwnership::new(Arc::new(LocalFs::new(dir.path()))).with_owner(caller_uid());
        let ctx = Context::for_caller(Caller { uid: 31, gid: 31, pid: 31 });

        let file = fs
            .open_file(&ctx, "f", OpenFlags::from_bits(libc::O_RDONLY), FileMode::default())
            .await
            .unwrap();
        let fh = Arc::new(FileHandle::new(file, Logger::disabled()));

        let info = tokio::spawn({
            let fh = Arc::clone(&fh);
            async move { fh.stat().await }
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.extended.unwrap().owner, "31");
        fh.release(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_calls_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let fs = MapOwnership::new(Arc::new(LocalFs::new(dir.path())));
        let ctx = Context::new();

        fs.mkdir(&ctx, "d", FileMode::from_bits(0o755)).await.unwrap();
        fs.symlink(&ctx, "d", "l").await.unwrap();
        fs.rename(&ctx, "l", "m").await.unwrap();
        assert_eq!(fs.read_link(&ctx, "m").await.unwrap(), "d");
        assert_eq!(fs.read_dir(&ctx, ".").await.unwrap().len(), 2);
    }
}
