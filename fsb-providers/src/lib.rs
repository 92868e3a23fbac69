// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backends for fsbridge
//!
//! [`LocalFs`] serves a host directory; [`MapOwnership`] wraps any backend
//! and rewrites the ownership it reports.

mod local;
mod ownership;

pub use local::LocalFs;
pub use ownership::MapOwnership;
