// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mount configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Mount errors
#[derive(Error, Debug)]
pub enum MountError {
    #[error("Mount point does not exist: {0}")]
    MountPointNotFound(String),

    #[error("Mount point is not a directory: {0}")]
    MountPointNotDirectory(String),

    #[error("FUSE is not available on this system")]
    FuseUnavailable,

    #[error("No async runtime to drive backend calls")]
    NoRuntime,

    #[error("Invalid mount configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mount options
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    /// Name shown as the filesystem source in the mount table
    pub fs_name: String,
    /// Allow other users to access the mount
    pub allow_other: bool,
    /// Allow root to access the mount
    pub allow_root: bool,
    /// Unmount when the serving process exits
    pub auto_unmount: bool,
    /// Read-only mount
    pub read_only: bool,
    /// How long the kernel may cache attributes
    pub attr_ttl_secs: u64,
    /// How long the kernel may cache name lookups
    pub entry_ttl_secs: u64,
    /// Debug mode
    pub debug: bool,
    /// Present every file as owned by the requesting user
    pub mirror_owner: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            fs_name: "fsbridge".to_string(),
            allow_other: false,
            allow_root: false,
            auto_unmount: true,
            read_only: false,
            attr_ttl_secs: 1,
            entry_ttl_secs: 1,
            debug: false,
            mirror_owner: false,
        }
    }
}

impl MountOptions {
    pub fn from_toml_str(content: &str) -> Result<Self, MountError> {
        toml::from_str(content).map_err(|e| MountError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MountError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }

    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs)
    }

    /// Check that `mount_point` can be mounted on.
    pub fn validate_mount_point(mount_point: &Path) -> Result<(), MountError> {
        if !mount_point.exists() {
            return Err(MountError::MountPointNotFound(mount_point.display().to_string()));
        }
        if !mount_point.is_dir() {
            return Err(MountError::MountPointNotDirectory(mount_point.display().to_string()));
        }
        Ok(())
    }
}

/// Check if FUSE is available on this system
pub fn is_fuse_available() -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new("/dev/fuse").exists()
    }

    #[cfg(target_os = "macos")]
    {
        Path::new("/Library/Filesystems/macfuse.fs").exists()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        false
    }
}
