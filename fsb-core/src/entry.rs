// SPDX-License-Identifier: AGPL-3.0-or-later
//! Directory entries

use crate::metadata::FileMode;
use serde::{Deserialize, Serialize};

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    /// File type flags only; permission bits are not reported here
    pub file_type: FileMode,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, mode: FileMode) -> Self {
        Self {
            name: name.into(),
            file_type: mode.file_type(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }
}
