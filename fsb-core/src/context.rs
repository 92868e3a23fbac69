// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-request context
//!
//! Every backend call receives the [`Context`] of the kernel request that
//! caused it. The bridge never acts on cancellation or deadlines itself; it
//! hands the context through and leaves the decision to the backend.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Identity of the process that issued a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
}

/// Rewrites an owner or group name in the light of the requesting context
pub type NameMapper = Arc<dyn Fn(&Context, &str) -> String + Send + Sync>;

/// Cancellation, deadline and caller identity of one request
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    caller: Option<Caller>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a request issued by `caller`.
    pub fn for_caller(caller: Caller) -> Self {
        Self {
            caller: Some(caller),
            ..Self::default()
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn caller(&self) -> Option<Caller> {
        self.caller
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}
