// SPDX-License-Identifier: AGPL-3.0-or-later
//! Injectable log sink
//!
//! Nodes and file handles of one mount share a [`Logger`] and emit their
//! events through it instead of whatever subscriber happens to be global
//! on the calling thread.

use tracing::dispatcher::{self, Dispatch};

#[derive(Clone, Debug)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Capture the dispatcher active on the current thread.
    pub fn current() -> Self {
        Self::new(dispatcher::get_default(Dispatch::clone))
    }

    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self::new(Dispatch::none())
    }

    /// Run `f` with this logger as the default dispatcher.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::current()
    }
}
