// SPDX-License-Identifier: AGPL-3.0-or-later
//! Test doubles: a recording in-memory backend, a scripted backend file and
//! a log capture.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fsb_core::{
    path, BackendFile, Context, ContextualFs, DirEntry, ExtendedMetadata, FileCapabilities, FileInfo, FileMode,
    FsError, FsResult, OpenFlags,
};
use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

use crate::logger::Logger;

/// Shared, appendable record of calls
#[derive(Debug)]
pub(crate) struct CallLog<T>(Arc<Mutex<Vec<T>>>);

impl<T> Clone for CallLog<T> {
    fn clone(&self) -> Self {
        CallLog(Arc::clone(&self.0))
    }
}

impl<T> Default for CallLog<T> {
    fn default() -> Self {
        CallLog(Arc::new(Mutex::new(Vec::new())))
    }
}

impl<T> CallLog<T> {
    pub(crate) fn push(&self, call: T) {
        self.0.lock().unwrap().push(call);
    }

    /// Drain everything recorded so far.
    pub(crate) fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FileCall {
    Read { len: usize },
    Write { len: usize },
    ReadAt { len: usize, offset: u64 },
    WriteAt { len: usize, offset: u64 },
    Seek { offset: u64 },
    Stat,
    Close,
}

/// Shared view of a [`ScriptedFile`]'s bytes
#[derive(Clone, Default)]
pub(crate) struct Contents(Arc<Mutex<Vec<u8>>>);

impl Contents {
    pub(crate) fn get(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

pub(crate) fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_600_000_000, 0).unwrap()
}

/// In-memory backend file with configurable capabilities
pub(crate) struct ScriptedFile {
    caps: FileCapabilities,
    data: Contents,
    cursor: usize,
    calls: CallLog<FileCall>,
    refuse_positional: bool,
    failure: Option<FsError>,
    info: Option<FileInfo>,
}

impl ScriptedFile {
    pub(crate) fn new(caps: FileCapabilities, content: &[u8]) -> Self {
        let info = FileInfo::new("file", content.len() as u64, FileMode::from_bits(0o644), epoch());
        Self {
            caps,
            data: Contents(Arc::new(Mutex::new(content.to_vec()))),
            cursor: 0,
            calls: CallLog::default(),
            refuse_positional: false,
            failure: None,
            info: Some(info),
        }
    }

    /// Advertise random access but answer `Unsupported` to every
    /// positional call.
    pub(crate) fn refuse_positional(mut self) -> Self {
        self.refuse_positional = true;
        self
    }

    /// Fail the first I/O call (read, write, seek, positional or close).
    pub(crate) fn fail_with(mut self, err: FsError) -> Self {
        self.failure = Some(err);
        self
    }

    pub(crate) fn with_info(mut self, info: FileInfo) -> Self {
        self.info = Some(info);
        self
    }

    pub(crate) fn failing_stat(mut self) -> Self {
        self.info = None;
        self
    }

    pub(crate) fn recording_into(mut self, calls: CallLog<FileCall>) -> Self {
        self.calls = calls;
        self
    }

    pub(crate) fn calls(&self) -> CallLog<FileCall> {
        self.calls.clone()
    }

    pub(crate) fn contents(&self) -> Contents {
        self.data.clone()
    }

    fn check(&mut self) -> FsResult<()> {
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn copy_out(&self, buf: &mut [u8], at: usize) -> usize {
        let data = self.data.0.lock().unwrap();
        if at >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - at);
        buf[..n].copy_from_slice(&data[at..at + n]);
        n
    }

    fn copy_in(&self, buf: &[u8], at: usize) -> usize {
        let mut data = self.data.0.lock().unwrap();
        if data.len() < at + buf.len() {
            data.resize(at + buf.len(), 0);
        }
        data[at..at + buf.len()].copy_from_slice(buf);
        buf.len()
    }
}

#[async_trait]
impl BackendFile for ScriptedFile {
    fn capabilities(&self) -> FileCapabilities {
        self.caps
    }

    async fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        self.calls.push(FileCall::Read { len: buf.len() });
        self.check()?;
        let n = self.copy_out(buf, self.cursor);
        self.cursor += n;
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> FsResult<usize> {
        self.calls.push(FileCall::Write { len: buf.len() });
        self.check()?;
        let n = self.copy_in(buf, self.cursor);
        self.cursor += n;
        Ok(n)
    }

    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.calls.push(FileCall::ReadAt { len: buf.len(), offset });
        if !self.caps.random_access || self.refuse_positional {
            return Err(FsError::unsupported("read_at"));
        }
        self.check()?;
        Ok(self.copy_out(buf, offset as usize))
    }

    async fn write_at(&mut self, buf: &[u8], offset: u64) -> FsResult<usize> {
        self.calls.push(FileCall::WriteAt { len: buf.len(), offset });
        if !self.caps.random_access || self.refuse_positional {
            return Err(FsError::unsupported("write_at"));
        }
        self.check()?;
        Ok(self.copy_in(buf, offset as usize))
    }

    async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        let SeekFrom::Start(offset) = pos else {
            return Err(FsError::InvalidArgument("only SeekFrom::Start is scripted".into()));
        };
        self.calls.push(FileCall::Seek { offset });
        if !self.caps.seek {
            return Err(FsError::unsupported("seek"));
        }
        self.check()?;
        self.cursor = offset as usize;
        Ok(offset)
    }

    async fn stat(&self) -> FsResult<FileInfo> {
        self.calls.push(FileCall::Stat);
        self.info
            .clone()
            .ok_or_else(|| FsError::Io(io::Error::new(io::ErrorKind::Other, "stat on closed file")))
    }

    async fn close(&mut self) -> FsResult<()> {
        self.calls.push(FileCall::Close);
        self.check()
    }
}

/// Backend call as recorded by [`MemFs`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FsCall {
    Stat(String),
    Open { path: String, flags: i32, mode: FileMode },
    ReadDir(String),
    Mkdir(String, FileMode),
    Remove(String),
    Symlink { target: String, path: String },
    ReadLink(String),
    Rename { from: String, to: String },
    Chmod(String, FileMode),
    ChangeOwnerGroup { path: String, owner: String, group: String },
    ChangeTimes { path: String, accessed: DateTime<Utc>, modified: DateTime<Utc> },
    Truncate(String, u64),
}

#[derive(Debug, Clone)]
struct MemNode {
    mode: FileMode,
    data: Vec<u8>,
    target: Option<String>,
    owner: String,
    group: String,
    accessed: DateTime<Utc>,
    modified: DateTime<Utc>,
}

impl MemNode {
    fn new(mode: FileMode) -> Self {
        Self {
            mode,
            data: Vec::new(),
            target: None,
            owner: "1000".to_string(),
            group: "1000".to_string(),
            accessed: epoch(),
            modified: epoch(),
        }
    }

    fn info(&self, path: &str) -> FileInfo {
        FileInfo::new(path::base(path), self.data.len() as u64, self.mode, self.modified).with_extended(
            ExtendedMetadata {
                accessed: self.accessed,
                changed: self.modified,
                owner: self.owner.clone(),
                group: self.group.clone(),
            },
        )
    }
}

#[derive(Default)]
struct MemState {
    // insertion order is iteration order
    nodes: Vec<(String, MemNode)>,
    failures: HashMap<&'static str, FsError>,
}

impl MemState {
    fn get(&self, path: &str) -> Option<&MemNode> {
        self.nodes.iter().find(|(p, _)| p == path).map(|(_, n)| n)
    }

    fn get_mut(&mut self, path: &str) -> Option<&mut MemNode> {
        self.nodes.iter_mut().find(|(p, _)| p == path).map(|(_, n)| n)
    }

    fn insert(&mut self, path: &str, node: MemNode) {
        match self.get_mut(path) {
            Some(existing) => *existing = node,
            None => self.nodes.push((path.to_string(), node)),
        }
    }

    fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a String, &'a MemNode)> + 'a {
        self.nodes.iter().filter(move |(p, _)| p != dir && parent_of(p) == dir).map(|(p, n)| (p, n))
    }
}

fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((parent, _)) => parent,
        None if path == path::ROOT => "",
        None => path::ROOT,
    }
}

/// Recording in-memory backend
pub(crate) struct MemFs {
    state: Mutex<MemState>,
    calls: CallLog<FsCall>,
    file_calls: CallLog<FileCall>,
    file_caps: FileCapabilities,
    failing_file_stat: bool,
    extender: Option<ExtendedMetadata>,
}

impl MemFs {
    pub(crate) fn new() -> Self {
        let mut state = MemState::default();
        state.insert(path::ROOT, MemNode::new(FileMode::DIR | FileMode::from_bits(0o755)));
        Self {
            state: Mutex::new(state),
            calls: CallLog::default(),
            file_calls: CallLog::default(),
            file_caps: FileCapabilities::full(),
            failing_file_stat: false,
            extender: None,
        }
    }

    pub(crate) fn with_file(self, path: &str, content: &[u8]) -> Self {
        let mut node = MemNode::new(FileMode::from_bits(0o644));
        node.data = content.to_vec();
        self.state.lock().unwrap().insert(path, node);
        self
    }

    pub(crate) fn with_dir(self, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .insert(path, MemNode::new(FileMode::DIR | FileMode::from_bits(0o755)));
        self
    }

    pub(crate) fn with_symlink(self, path: &str, target: &str) -> Self {
        let mut node = MemNode::new(FileMode::SYMLINK | FileMode::from_bits(0o777));
        node.target = Some(target.to_string());
        self.state.lock().unwrap().insert(path, node);
        self
    }

    pub(crate) fn with_accessed(self, path: &str, accessed: DateTime<Utc>) -> Self {
        if let Some(node) = self.state.lock().unwrap().get_mut(path) {
            node.accessed = accessed;
        }
        self
    }

    pub(crate) fn with_file_caps(mut self, caps: FileCapabilities) -> Self {
        self.file_caps = caps;
        self
    }

    pub(crate) fn with_failing_file_stat(mut self) -> Self {
        self.failing_file_stat = true;
        self
    }

    pub(crate) fn with_extender(mut self, extended: ExtendedMetadata) -> Self {
        self.extender = Some(extended);
        self
    }

    /// Make the next call of `op` fail with `err`.
    pub(crate) fn fail(&self, op: &'static str, err: FsError) {
        self.state.lock().unwrap().failures.insert(op, err);
    }

    pub(crate) fn calls(&self) -> Vec<FsCall> {
        self.calls.take()
    }

    pub(crate) fn file_calls(&self) -> Vec<FileCall> {
        self.file_calls.take()
    }

    pub(crate) fn exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().get(path).is_some()
    }

    fn check(&self, op: &'static str) -> FsResult<()> {
        match self.state.lock().unwrap().failures.remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ContextualFs for MemFs {
    async fn stat(&self, _ctx: &Context, path: &str) -> FsResult<FileInfo> {
        self.calls.push(FsCall::Stat(path.to_string()));
        self.check("stat")?;
        let state = self.state.lock().unwrap();
        state
            .get(path)
            .map(|node| node.info(path))
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    async fn open_file(
        &self,
        _ctx: &Context,
        path: &str,
        flags: OpenFlags,
        mode: FileMode,
    ) -> FsResult<Box<dyn BackendFile>> {
        self.calls.push(FsCall::Open { path: path.to_string(), flags: flags.bits(), mode });
        self.check("open_file")?;
        let mut state = self.state.lock().unwrap();
        if state.get(path).is_none() {
            if !flags.is_create() {
                return Err(FsError::NotFound(path.to_string()));
            }
            state.insert(path, MemNode::new(mode));
        }
        let node = state.get(path).cloned().ok_or_else(|| FsError::NotFound(path.to_string()))?;
        let mut file = ScriptedFile::new(self.file_caps, &node.data)
            .with_info(node.info(path))
            .recording_into(self.file_calls.clone());
        if self.failing_file_stat {
            file = file.failing_stat();
        }
        Ok(Box::new(file))
    }

    async fn read_dir(&self, _ctx: &Context, path: &str) -> FsResult<Vec<DirEntry>> {
        self.calls.push(FsCall::ReadDir(path.to_string()));
        self.check("read_dir")?;
        let state = self.state.lock().unwrap();
        match state.get(path) {
            Some(node) if node.mode.is_dir() => Ok(state
                .children(path)
                .map(|(p, n)| DirEntry::new(path::base(p), n.mode))
                .collect()),
            Some(_) => Err(FsError::Errno(libc::ENOTDIR)),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    async fn mkdir(&self, _ctx: &Context, path: &str, mode: FileMode) -> FsResult<()> {
        self.calls.push(FsCall::Mkdir(path.to_string(), mode));
        self.check("mkdir")?;
        let mut state = self.state.lock().unwrap();
        if state.get(path).is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        state.insert(path, MemNode::new(FileMode::DIR | mode));
        Ok(())
    }

    async fn remove(&self, _ctx: &Context, path: &str) -> FsResult<()> {
        self.calls.push(FsCall::Remove(path.to_string()));
        self.check("remove")?;
        let mut state = self.state.lock().unwrap();
        if state.get(path).is_none() {
            return Err(FsError::NotFound(path.to_string()));
        }
        if state.children(path).next().is_some() {
            return Err(FsError::Errno(libc::ENOTEMPTY));
        }
        state.nodes.retain(|(p, _)| p != path);
        Ok(())
    }

    async fn symlink(&self, _ctx: &Context, target: &str, path: &str) -> FsResult<()> {
        self.calls.push(FsCall::Symlink { target: target.to_string(), path: path.to_string() });
        self.check("symlink")?;
        let mut state = self.state.lock().unwrap();
        if state.get(path).is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        let mut node = MemNode::new(FileMode::SYMLINK | FileMode::from_bits(0o777));
        node.target = Some(target.to_string());
        state.insert(path, node);
        Ok(())
    }

    async fn read_link(&self, _ctx: &Context, path: &str) -> FsResult<String> {
        self.calls.push(FsCall::ReadLink(path.to_string()));
        self.check("read_link")?;
        let state = self.state.lock().unwrap();
        match state.get(path) {
            Some(node) => node.target.clone().ok_or_else(|| FsError::InvalidArgument(path.to_string())),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    async fn rename(&self, _ctx: &Context, old_path: &str, new_path: &str) -> FsResult<()> {
        self.calls.push(FsCall::Rename { from: old_path.to_string(), to: new_path.to_string() });
        self.check("rename")?;
        let mut state = self.state.lock().unwrap();
        if state.get(old_path).is_none() {
            return Err(FsError::NotFound(old_path.to_string()));
        }
        state.nodes.retain(|(p, _)| p != new_path);
        let prefix = format!("{old_path}/");
        for (p, _) in state.nodes.iter_mut() {
            if p == old_path {
                *p = new_path.to_string();
            } else if let Some(rest) = p.strip_prefix(&prefix) {
                *p = format!("{new_path}/{rest}");
            }
        }
        Ok(())
    }

    async fn chmod(&self, _ctx: &Context, path: &str, mode: FileMode) -> FsResult<()> {
        self.calls.push(FsCall::Chmod(path.to_string(), mode));
        self.check("chmod")?;
        let mut state = self.state.lock().unwrap();
        let node = state.get_mut(path).ok_or_else(|| FsError::NotFound(path.to_string()))?;
        node.mode = node.mode.file_type() | FileMode::from_bits(mode.bits() & !FileMode::TYPE.bits());
        Ok(())
    }

    async fn change_owner_group(&self, _ctx: &Context, path: &str, owner: &str, group: &str) -> FsResult<()> {
        self.calls.push(FsCall::ChangeOwnerGroup {
            path: path.to_string(),
            owner: owner.to_string(),
            group: group.to_string(),
        });
        self.check("change_owner_group")?;
        let mut state = self.state.lock().unwrap();
        let node = state.get_mut(path).ok_or_else(|| FsError::NotFound(path.to_string()))?;
        if !owner.is_empty() {
            node.owner = owner.to_string();
        }
        if !group.is_empty() {
            node.group = group.to_string();
        }
        Ok(())
    }

    async fn change_times(
        &self,
        _ctx: &Context,
        path: &str,
        accessed: DateTime<Utc>,
        modified: DateTime<Utc>,
    ) -> FsResult<()> {
        self.calls.push(FsCall::ChangeTimes { path: path.to_string(), accessed, modified });
        self.check("change_times")?;
        let mut state = self.state.lock().unwrap();
        let node = state.get_mut(path).ok_or_else(|| FsError::NotFound(path.to_string()))?;
        node.accessed = accessed;
        node.modified = modified;
        Ok(())
    }

    async fn truncate(&self, _ctx: &Context, path: &str, size: u64) -> FsResult<()> {
        self.calls.push(FsCall::Truncate(path.to_string(), size));
        self.check("truncate")?;
        let mut state = self.state.lock().unwrap();
        let node = state.get_mut(path).ok_or_else(|| FsError::NotFound(path.to_string()))?;
        node.data.resize(size as usize, 0);
        Ok(())
    }

    fn extend_file_info(&self, _info: &FileInfo) -> Option<ExtendedMetadata> {
        self.extender.clone()
    }
}

/// Log output captured from a [`Logger`]
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// A logger whose output can be inspected.
pub(crate) fn capture_logs() -> (Logger, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    (Logger::new(tracing::Dispatch::new(subscriber)), logs)
}
