// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kernel session glue
//!
//! [`FuseSession`] receives requests from `fuser`, resolves inode and handle
//! numbers, and forwards each request to the matching [`PathNode`] or
//! [`FileHandle`] operation. Backend calls are async; fuser callbacks are
//! not, so each one blocks on the runtime handle captured at mount time.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fsb_core::{path, Caller, Context, ContextualFs, OpenFlags};
use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow, FUSE_ROOT_ID,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::errno::{Errno, FuseResult};
use crate::handle::FileHandle;
use crate::logger::Logger;
use crate::mode::{S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFSOCK};
use crate::node::{NewChild, PathNode};
use crate::options::{MountError, MountOptions};
use crate::protocol::{Attr, DirEntryOut, SetAttrIn};

/// Inode reported for directory entries that were listed but never looked up
const UNKNOWN_INO: u64 = 0xffff_ffff;

/// Inode numbers handed out per path
struct InodeTable {
    by_path: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut by_path = HashMap::new();
        by_path.insert(path::ROOT.to_string(), FUSE_ROOT_ID);
        Self {
            by_path,
            next: FUSE_ROOT_ID + 1,
        }
    }

    fn ino_for(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.by_path.get(path) {
            return *ino;
        }
        if self.next == UNKNOWN_INO {
            self.next += 1;
        }
        let ino = self.next;
        self.next += 1;
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    fn get(&self, path: &str) -> Option<u64> {
        self.by_path.get(path).copied()
    }

    /// Drop the mapping for `path` only if it still names `ino`.
    fn release(&mut self, path: &str, ino: u64) {
        if self.by_path.get(path) == Some(&ino) {
            self.by_path.remove(path);
        }
    }

    /// Remove `path` and everything below it, returning the inodes dropped.
    fn take_subtree(&mut self, path: &str) -> Vec<(String, u64)> {
        let prefix = format!("{path}/");
        let paths: Vec<String> = self
            .by_path
            .keys()
            .filter(|p| p.as_str() == path || p.starts_with(&prefix))
            .cloned()
            .collect();
        paths
            .into_iter()
            .filter_map(|p| self.by_path.remove(&p).map(|ino| (p, ino)))
            .collect()
    }
}

/// A mounted bridge between the kernel and one backend
pub struct FuseSession {
    runtime: Handle,
    nodes: DashMap<u64, PathNode>,
    inodes: Mutex<InodeTable>,
    handles: DashMap<u64, Arc<FileHandle>>,
    next_fh: AtomicU64,
    attr_ttl: Duration,
    entry_ttl: Duration,
}

impl FuseSession {
    pub fn new(root: PathNode, runtime: Handle, options: &MountOptions) -> Self {
        let nodes = DashMap::new();
        nodes.insert(FUSE_ROOT_ID, root);
        Self {
            runtime,
            nodes,
            inodes: Mutex::new(InodeTable::new()),
            handles: DashMap::new(),
            next_fh: AtomicU64::new(1),
            attr_ttl: options.attr_ttl(),
            entry_ttl: options.entry_ttl(),
        }
    }

    fn node(&self, ino: u64) -> FuseResult<PathNode> {
        self.nodes.get(&ino).map(|node| node.clone()).ok_or(Errno::ENOENT)
    }

    fn handle(&self, fh: u64) -> FuseResult<Arc<FileHandle>> {
        self.handles.get(&fh).map(|handle| Arc::clone(&handle)).ok_or(Errno(libc::EBADF))
    }

    fn ino_for(&self, path: &str) -> u64 {
        self.inodes.lock().ino_for(path)
    }

    fn register(&self, child: NewChild) -> FileAttr {
        let ino = self.ino_for(child.node.path());
        let attr = to_file_attr(&child.attr, ino);
        self.nodes.insert(ino, child.node);
        attr
    }

    fn open_handle(&self, handle: FileHandle) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(fh, Arc::new(handle));
        fh
    }

    /// Re-key every cached node at or below `old` to live under `new`.
    ///
    /// Nodes cached at or below `new` were replaced by the rename and are
    /// dropped; the kernel gets `ENOENT` for them from now on.
    fn move_paths(&self, old: &str, new: &str) {
        if old == new {
            return;
        }
        let mut inodes = self.inodes.lock();
        for (_, ino) in inodes.take_subtree(new) {
            if ino != FUSE_ROOT_ID {
                self.nodes.remove(&ino);
            }
        }

        for (old_path, ino) in inodes.take_subtree(old) {
            let new_path = format!("{new}{}", &old_path[old.len()..]);
            inodes.by_path.insert(new_path.clone(), ino);
            if let Some(mut node) = self.nodes.get_mut(&ino) {
                *node = PathNode::new(Arc::clone(node.fs()), new_path, node.logger().clone());
            }
        }
    }

    fn forget_ino(&self, ino: u64) {
        if ino == FUSE_ROOT_ID {
            return;
        }
        if let Some((_, node)) = self.nodes.remove(&ino) {
            self.inodes.lock().release(node.path(), ino);
        }
    }

    /// `.`, `..` and the backend entries of directory `ino`. Entries the
    /// kernel has not looked up carry [`UNKNOWN_INO`] and allocate nothing.
    fn listing(&self, ino: u64, dir: &PathNode, entries: Vec<DirEntryOut>) -> Vec<(u64, FileType, String)> {
        let mut out = Vec::with_capacity(entries.len() + 2);
        out.push((ino, FileType::Directory, ".".to_string()));
        out.push((ino, FileType::Directory, "..".to_string()));
        let inodes = self.inodes.lock();
        for entry in entries {
            let child_ino = inodes.get(&path::join(dir.path(), &entry.name)).unwrap_or(UNKNOWN_INO);
            out.push((child_ino, file_type(entry.mode), entry.name));
        }
        out
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

fn context(req: &Request<'_>) -> Context {
    Context::for_caller(Caller {
        uid: req.uid(),
        gid: req.gid(),
        pid: req.pid(),
    })
}

fn name_str(name: &OsStr) -> FuseResult<&str> {
    name.to_str().ok_or(Errno::EINVAL)
}

fn file_type(mode: u32) -> FileType {
    match mode & S_IFMT {
        S_IFDIR => FileType::Directory,
        S_IFLNK => FileType::Symlink,
        S_IFCHR => FileType::CharDevice,
        S_IFBLK => FileType::BlockDevice,
        S_IFIFO => FileType::NamedPipe,
        S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

fn system_time(secs: i64, nsecs: u32) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(nsecs as u64)
    }
}

/// Kernel attributes for inode `ino`; the backend's own inode number is not
/// the one the kernel knows the file by.
fn to_file_attr(attr: &Attr, ino: u64) -> FileAttr {
    let ctime = system_time(attr.ctime.secs, attr.ctime.nsecs);
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: system_time(attr.atime.secs, attr.atime.nsecs),
        mtime: system_time(attr.mtime.secs, attr.mtime.nsecs),
        ctime,
        crtime: ctime,
        kind: file_type(attr.mode),
        perm: (attr.mode & 0o7777) as u16,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev,
        blksize: attr.blksize,
        flags: 0,
    }
}

fn to_datetime(time: TimeOrNow) -> DateTime<Utc> {
    match time {
        TimeOrNow::SpecificTime(time) => DateTime::<Utc>::from(time),
        TimeOrNow::Now => Utc::now(),
    }
}

fn offset_of(offset: i64) -> FuseResult<u64> {
    u64::try_from(offset).map_err(|_| Errno::EINVAL)
}

impl Filesystem for FuseSession {
    fn forget(&mut self, _req: &Request, ino: u64, _nlookup: u64) {
        self.forget_ino(ino);
    }

    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let result = (|| -> FuseResult<_> {
            let node = self.node(parent)?;
            let name = name_str(name)?;
            self.block_on(node.lookup(&context(req), name))
        })();
        match result {
            Ok(child) => reply.entry(&self.entry_ttl, &self.register(child), 0),
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn getattr(&mut self, req: &Request, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        let result = (|| -> FuseResult<_> {
            let node = self.node(ino)?;
            let handle = fh.and_then(|fh| self.handles.get(&fh).map(|h| Arc::clone(&h)));
            self.block_on(node.getattr(&context(req), handle.as_deref()))
        })();
        match result {
            Ok(attr) => reply.attr(&self.attr_ttl, &to_file_attr(&attr, ino)),
            Err(errno) => reply.error(errno.code()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let input = SetAttrIn {
            mode,
            uid,
            gid,
            size,
            atime: atime.map(to_datetime),
            mtime: mtime.map(to_datetime),
        };
        let result = (|| -> FuseResult<_> {
            let node = self.node(ino)?;
            let handle = fh.and_then(|fh| self.handles.get(&fh).map(|h| Arc::clone(&h)));
            self.block_on(node.setattr(&context(req), handle.as_deref(), &input))
        })();
        match result {
            Ok(attr) => reply.attr(&self.attr_ttl, &to_file_attr(&attr, ino)),
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn readlink(&mut self, req: &Request, ino: u64, reply: ReplyData) {
        let result = self.node(ino).and_then(|node| self.block_on(node.readlink(&context(req))));
        match result {
            Ok(target) => reply.data(&target),
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn mkdir(&mut self, req: &Request, parent: u64, name: &OsStr, mode: u32, umask: u32, reply: ReplyEntry) {
        let result = (|| -> FuseResult<_> {
            let node = self.node(parent)?;
            let name = name_str(name)?;
            self.block_on(node.mkdir(&context(req), name, mode & !umask))
        })();
        match result {
            Ok(child) => reply.entry(&self.entry_ttl, &self.register(child), 0),
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn unlink(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = (|| -> FuseResult<_> {
            let node = self.node(parent)?;
            let name = name_str(name)?;
            self.block_on(node.unlink(&context(req), name))
        })();
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn rmdir(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = (|| -> FuseResult<_> {
            let node = self.node(parent)?;
            let name = name_str(name)?;
            self.block_on(node.rmdir(&context(req), name))
        })();
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn symlink(&mut self, req: &Request, parent: u64, link_name: &OsStr, target: &Path, reply: ReplyEntry) {
        let result = (|| -> FuseResult<_> {
            let node = self.node(parent)?;
            let name = name_str(link_name)?;
            let target = target.to_str().ok_or(Errno::EINVAL)?;
            self.block_on(node.symlink(&context(req), target, name))
        })();
        match result {
            Ok(child) => reply.entry(&self.entry_ttl, &self.register(child), 0),
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn rename(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let result = (|| -> FuseResult<_> {
            let node = self.node(parent)?;
            let target = self.node(newparent)?;
            let name = name_str(name)?;
            let newname = name_str(newname)?;
            self.block_on(node.rename(&context(req), name, &target, newname, flags))?;
            Ok((path::join(node.path(), name), path::join(target.path(), newname)))
        })();
        match result {
            Ok((old, new)) => {
                self.move_paths(&old, &new);
                reply.ok()
            }
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn open(&mut self, req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let result = self
            .node(ino)
            .and_then(|node| self.block_on(node.open(&context(req), OpenFlags::from_bits(flags))));
        match result {
            Ok((handle, open_flags)) => reply.opened(self.open_handle(handle), open_flags),
            Err(errno) => reply.error(errno.code()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let result = (|| -> FuseResult<_> {
            let handle = self.handle(fh)?;
            let offset = offset_of(offset)?;
            let mut buf = vec![0u8; size as usize];
            let n = self.block_on(handle.read(&context(req), &mut buf, offset))?;
            buf.truncate(n);
            Ok(buf)
        })();
        match result {
            Ok(data) => reply.data(&data),
            Err(errno) => reply.error(errno.code()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let result = (|| -> FuseResult<_> {
            let handle = self.handle(fh)?;
            let offset = offset_of(offset)?;
            self.block_on(handle.write(&context(req), data, offset))
        })();
        match result {
            Ok(n) => reply.written(n as u32),
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn flush(&mut self, req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let result = self
            .handle(fh)
            .and_then(|handle| self.block_on(handle.flush(&context(req))));
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn release(
        &mut self,
        req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let result = match self.handles.remove(&fh) {
            Some((_, handle)) => self.block_on(handle.release(&context(req))),
            None => Err(Errno(libc::EBADF)),
        };
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno.code()),
        }
    }

    fn readdir(&mut self, req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let result = (|| -> FuseResult<_> {
            let node = self.node(ino)?;
            let entries = self.block_on(node.readdir(&context(req)))?;
            Ok((node, entries))
        })();
        let (node, entries) = match result {
            Ok(listing) => listing,
            Err(errno) => {
                reply.error(errno.code());
                return;
            }
        };

        let listing = self.listing(ino, &node, entries);
        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (entry_ino, kind, name)) in listing.into_iter().enumerate().skip(skip) {
            if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let result = (|| -> FuseResult<_> {
            let node = self.node(parent)?;
            let name = name_str(name)?;
            self.block_on(node.create(&context(req), name, OpenFlags::from_bits(flags), mode & !umask))
        })();
        match result {
            Ok((child, handle, open_flags)) => {
                let attr = self.register(child);
                let fh = self.open_handle(handle);
                reply.created(&self.entry_ttl, &attr, 0, fh, open_flags)
            }
            Err(errno) => reply.error(errno.code()),
        }
    }
}

fn mount_options(options: &MountOptions) -> Vec<MountOption> {
    let mut out = vec![MountOption::FSName(options.fs_name.clone())];
    if options.allow_other {
        out.push(MountOption::AllowOther);
    }
    if options.allow_root {
        out.push(MountOption::AllowRoot);
    }
    if options.auto_unmount {
        out.push(MountOption::AutoUnmount);
    }
    if options.read_only {
        out.push(MountOption::RO);
    }
    out
}

/// Serve `fs` at `mount_point` until it is unmounted.
///
/// Blocks the calling thread, which must not be a runtime worker: call it
/// from `tokio::task::spawn_blocking` or a plain thread inside a runtime
/// context.
pub fn mount(
    fs: Arc<dyn ContextualFs>,
    mount_point: impl AsRef<Path>,
    options: &MountOptions,
    logger: Logger,
) -> Result<(), MountError> {
    let mount_point = mount_point.as_ref();
    MountOptions::validate_mount_point(mount_point)?;
    let runtime = Handle::try_current().map_err(|_| MountError::NoRuntime)?;

    let session = FuseSession::new(PathNode::root(fs, logger), runtime, options);
    let fuse_options = mount_options(options);
    debug!(?fuse_options, "mount options");
    info!(mount_point = %mount_point.display(), "mounting");

    fuser::mount2(session, mount_point, &fuse_options)?;

    info!(mount_point = %mount_point.display(), "unmounted");
    Ok(())
}
