// SPDX-License-Identifier: AGPL-3.0-or-later
//! fsbridge core
//!
//! The contract between the kernel-facing bridge and storage backends:
//! path-addressed filesystem and open-file traits, the file metadata model
//! and the per-request context.

pub mod backend;
pub mod context;
pub mod entry;
pub mod error;
pub mod metadata;
pub mod operations;
pub mod path;

pub use backend::{BackendFile, ContextualFs, FileCapabilities};
pub use context::{Caller, Context, NameMapper};
pub use entry::DirEntry;
pub use error::{FsError, FsResult};
pub use metadata::{ExtendedMetadata, FileInfo, FileMode, RawStat, Timespec};
pub use operations::OpenFlags;
