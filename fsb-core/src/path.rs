// SPDX-License-Identifier: AGPL-3.0-or-later
//! Slash-separated backend paths
//!
//! Backends are addressed with `/`-separated paths relative to the mount
//! root, which itself is `"."`. Only lexical cleanup happens here; resolving
//! symlinks or case folding is up to the backend.

/// Path of the mount root
pub const ROOT: &str = ".";

/// Join a parent path and a child name, then clean the result.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        return clean(name);
    }
    if name.is_empty() {
        return clean(parent);
    }
    clean(&format!("{parent}/{name}"))
}

/// Lexically clean a path: drop empty and `.` segments, fold `..`.
///
/// An empty result becomes [`ROOT`]. Leading `..` segments of a relative
/// path are kept; `..` above an absolute root is dropped.
pub fn clean(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            _ => segments.push(part),
        }
    }

    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ROOT.to_string(),
        (false, false) => joined,
    }
}

/// Last element of a path, `"."` for the root.
pub fn base(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { ROOT } else { "/" };
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
