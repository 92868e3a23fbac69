// SPDX-License-Identifier: AGPL-3.0-or-later
//! fsbridge kernel translation layer
//!
//! Serves any [`ContextualFs`] backend to the kernel: path-level requests go
//! through [`PathNode`], open files through [`FileHandle`], and every
//! backend result is translated into kernel attributes and error codes.
//! With the `fuse` feature on Linux, [`mount`] drives all of it from a real
//! FUSE session.

pub mod attr;
pub mod errno;
pub mod handle;
pub mod logger;
pub mod mirror;
pub mod mode;
pub mod node;
pub mod options;
pub mod protocol;

#[cfg(all(feature = "fuse", target_os = "linux"))]
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use fsb_core::ContextualFs;
use std::sync::Arc;

pub use attr::{attr_of, fill_attr};
pub use errno::{errno_of, Errno, FuseResult};
pub use handle::{FileHandle, ZERO_CHUNK};
pub use logger::Logger;
pub use mirror::{mirror_group, mirror_owner};
pub use mode::{to_file_mode, to_fuse_mode};
pub use node::{NewChild, PathNode};
pub use options::{is_fuse_available, MountError, MountOptions};
pub use protocol::{Attr, DirEntryOut, SetAttrIn, StableAttr, FOPEN_KEEP_CACHE};

#[cfg(all(feature = "fuse", target_os = "linux"))]
pub use session::{mount, FuseSession};

/// Root node serving `fs`, logging through `logger`.
pub fn new_root(fs: Arc<dyn ContextualFs>, logger: Logger) -> PathNode {
    PathNode::root(fs, logger)
}
