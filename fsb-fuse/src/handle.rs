// SPDX-License-Identifier: AGPL-3.0-or-later
//! Open file sessions
//!
//! The kernel addresses reads and writes by offset. Backend files do not all
//! allow that, so each call tries, in order:
//!
//! 1. positional `read_at`/`write_at`, when the file offers random access
//!    and the call does not come back `Unsupported`;
//! 2. `seek` to the offset followed by one plain `read`/`write`;
//! 3. plain `read`/`write` against a cursor tracked by the handle. Moving
//!    forward discards input or pads output with zeros; moving backward is
//!    impossible and fails with `ENOSYS`.

use fsb_core::{BackendFile, Context, FileInfo, FsError, FsResult};
use std::io::{self, SeekFrom};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::errno::{Errno, FuseResult};
use crate::logger::Logger;

/// Largest zero-filled chunk written while padding a sequential file
pub const ZERO_CHUNK: usize = 4096;

struct HandleState {
    file: Box<dyn BackendFile>,
    /// Bytes consumed or produced through plain `read`/`write` since open.
    /// Only meaningful while the file can neither seek nor read positionally.
    offset: u64,
}

/// One open backend file
pub struct FileHandle {
    state: Mutex<HandleState>,
    logger: Logger,
}

impl FileHandle {
    pub fn new(file: Box<dyn BackendFile>, logger: Logger) -> Self {
        Self {
            state: Mutex::new(HandleState { file, offset: 0 }),
            logger,
        }
    }

    /// Read into `buf` starting at `offset`; returns the number of bytes
    /// produced, which is short at end of file.
    pub async fn read(&self, _ctx: &Context, buf: &mut [u8], offset: u64) -> FuseResult<usize> {
        let mut state = self.state.lock().await;
        let caps = state.file.capabilities();

        if caps.random_access {
            match state.file.read_at(buf, offset).await {
                Err(err) if err.is_unsupported() => {}
                Ok(n) => return Ok(n),
                Err(err) => return Err(self.fail("read_at", offset, err)),
            }
        }

        if caps.seek {
            if let Err(err) = state.file.seek(SeekFrom::Start(offset)).await {
                return Err(self.fail("seek", offset, err));
            }
            return state
                .file
                .read(buf)
                .await
                .map_err(|err| self.fail("read after seek", offset, err));
        }

        if offset < state.offset {
            debug!(offset, current = state.offset, "backward read on sequential file");
            return Err(Errno::ENOSYS);
        }
        if offset > state.offset {
            let reached_end = self.discard(&mut state, offset).await?;
            if reached_end {
                return Ok(0);
            }
        }

        let start = state.offset;
        let n = state
            .file
            .read(buf)
            .await
            .map_err(|err| self.fail("read", start, err))?;
        state.offset += n as u64;
        Ok(n)
    }

    /// Write `data` at `offset`; returns the number of bytes written.
    pub async fn write(&self, _ctx: &Context, data: &[u8], offset: u64) -> FuseResult<usize> {
        let mut state = self.state.lock().await;
        let caps = state.file.capabilities();

        if caps.random_access {
            match state.file.write_at(data, offset).await {
                Err(err) if err.is_unsupported() => {}
                Ok(n) => return Ok(n),
                Err(err) => return Err(self.fail("write_at", offset, err)),
            }
        }

        if caps.seek {
            if let Err(err) = state.file.seek(SeekFrom::Start(offset)).await {
                return Err(self.fail("seek", offset, err));
            }
            return state
                .file
                .write(data)
                .await
                .map_err(|err| self.fail("write after seek", offset, err));
        }

        if offset < state.offset {
            debug!(offset, current = state.offset, "backward write on sequential file");
            return Err(Errno::ENOSYS);
        }
        if offset > state.offset {
            self.pad(&mut state, offset).await?;
        }

        let start = state.offset;
        let n = state
            .file
            .write(data)
            .await
            .map_err(|err| self.fail("write", start, err))?;
        state.offset += n as u64;
        Ok(n)
    }

    /// Backends have no flush primitive; there is nothing to push.
    pub async fn flush(&self, _ctx: &Context) -> FuseResult<()> {
        Ok(())
    }

    /// Close the backend file.
    pub async fn release(&self, _ctx: &Context) -> FuseResult<()> {
        let mut state = self.state.lock().await;
        state.file.close().await.map_err(|err| {
            let errno = Errno::from(&err);
            self.logger.in_scope(|| error!(error = %err, "release failed"));
            errno
        })
    }

    /// Live metadata of the open file.
    ///
    /// Does not queue behind a read or write in progress: a busy handle
    /// answers `EBUSY` at once and callers fall back to a path stat.
    pub async fn stat(&self) -> FsResult<FileInfo> {
        let Ok(state) = self.state.try_lock() else {
            return Err(FsError::Errno(libc::EBUSY));
        };
        state.file.stat().await
    }

    #[cfg(test)]
    pub(crate) async fn tracked_offset(&self) -> u64 {
        self.state.lock().await.offset
    }

    /// Hold the handle as an in-flight read or write would.
    #[cfg(test)]
    pub(crate) async fn busy(&self) -> tokio::sync::MutexGuard<'_, impl Sized> {
        self.state.lock().await
    }

    /// Read and drop input until the cursor reaches `target`.
    /// Returns `true` when the stream ended first.
    async fn discard(&self, state: &mut HandleState, target: u64) -> FuseResult<bool> {
        let mut scratch = [0u8; ZERO_CHUNK];
        while state.offset < target {
            let want = (target - state.offset).min(ZERO_CHUNK as u64) as usize;
            match state.file.read(&mut scratch[..want]).await {
                Ok(0) => return Ok(true),
                Ok(n) => state.offset += n as u64,
                Err(err) => {
                    let current = state.offset;
                    self.logger.in_scope(|| {
                        error!(target_offset = target, current, error = %err, "discard forward failed")
                    });
                    return Err(Errno::from(&err));
                }
            }
        }
        Ok(false)
    }

    /// Write zeros until the cursor reaches `target`.
    async fn pad(&self, state: &mut HandleState, target: u64) -> FuseResult<()> {
        let zeros = [0u8; ZERO_CHUNK];
        while state.offset < target {
            let chunk = (target - state.offset).min(ZERO_CHUNK as u64) as usize;
            let start = state.offset;
            match state.file.write(&zeros[..chunk]).await {
                Ok(0) => {
                    let err = FsError::Io(io::Error::from(io::ErrorKind::WriteZero));
                    return Err(self.fail("write zeros (padding)", start, err));
                }
                Ok(n) => state.offset += n as u64,
                Err(err) => return Err(self.fail("write zeros (padding)", start, err)),
            }
        }
        Ok(())
    }

    fn fail(&self, op: &str, offset: u64, err: FsError) -> Errno {
        let errno = Errno::from(&err);
        self.logger.in_scope(|| error!(offset, error = %err, "{op} failed"));
        errno
    }
}
