// SPDX-License-Identifier: AGPL-3.0-or-later
//! CLI command implementations

use anyhow::{bail, Context as _, Result};
use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use console::style;
use fsb_core::{Caller, Context, ContextualFs, Timespec};
use fsb_fuse::mode::{S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use fsb_fuse::{mirror_group, mirror_owner, new_root, Attr, Logger, MountOptions, PathNode};
use fsb_providers::{LocalFs, MapOwnership};
use std::path::Path;
use std::sync::Arc;
use tabled::{Table, Tabled};

/// Command-line switches that override the mount options file
#[derive(Debug, Clone, Copy, Default)]
pub struct MountOverrides {
    pub mirror_owner: bool,
    pub read_only: bool,
    pub allow_other: bool,
}

impl MountOverrides {
    fn apply(self, options: &mut MountOptions) {
        options.mirror_owner |= self.mirror_owner;
        options.read_only |= self.read_only;
        options.allow_other |= self.allow_other;
    }
}

/// Build the backend serving `source`, wrapped for owner mirroring when asked.
fn backend(source: &Path, mirror: bool) -> Result<Arc<dyn ContextualFs>> {
    if !source.is_dir() {
        bail!("source is not a directory: {}", source.display());
    }
    let local: Arc<dyn ContextualFs> = Arc::new(LocalFs::new(source));
    if !mirror {
        return Ok(local);
    }
    Ok(Arc::new(
        MapOwnership::new(local)
            .with_owner(mirror_owner())
            .with_group(mirror_group()),
    ))
}

/// Context carrying the identity of this process
fn own_context() -> Context {
    Context::for_caller(Caller {
        uid: nix::unistd::getuid().as_raw(),
        gid: nix::unistd::getgid().as_raw(),
        pid: std::process::id(),
    })
}

/// Walk from the root to `path`, one lookup per component.
async fn resolve(root: PathNode, ctx: &Context, path: &str) -> Result<(PathNode, Attr)> {
    let mut node = root;
    let mut attr = node.getattr(ctx, None).await.context("stat root")?;
    for name in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
        let child = node
            .lookup(ctx, name)
            .await
            .with_context(|| format!("lookup {name:?} in {:?}", node.path()))?;
        node = child.node;
        attr = child.attr;
    }
    Ok((node, attr))
}

/// Format a timestamp for display
fn format_time(ts: Timespec) -> String {
    DateTime::<Utc>::from_timestamp(ts.secs, ts.nsecs)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Format file size
fn format_size(size: u64, human: bool) -> String {
    if human {
        ByteSize(size).to_string()
    } else {
        size.to_string()
    }
}

/// Format the type letter of a mode
fn format_kind(mode: u32) -> String {
    match mode & S_IFMT {
        S_IFDIR => style("d").cyan().to_string(),
        S_IFLNK => style("l").magenta().to_string(),
        S_IFREG => "-".to_string(),
        _ => "?".to_string(),
    }
}

/// Format permissions
fn format_permissions(mode: u32) -> String {
    let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };
    [
        bit(0o400, 'r'),
        bit(0o200, 'w'),
        bit(0o100, 'x'),
        bit(0o040, 'r'),
        bit(0o020, 'w'),
        bit(0o010, 'x'),
        bit(0o004, 'r'),
        bit(0o002, 'w'),
        bit(0o001, 'x'),
    ]
    .iter()
    .collect()
}

#[derive(Tabled)]
struct LsEntry {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Permissions")]
    perms: String,
    #[tabled(rename = "Owner")]
    owner: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Name")]
    name: String,
}

/// Serve `source` at `mountpoint` until unmounted.
pub async fn mount(
    source: &Path,
    mountpoint: &Path,
    config: Option<&Path>,
    overrides: MountOverrides,
) -> Result<()> {
    let mut options = match config {
        Some(path) => MountOptions::from_file(path)?,
        None => MountOptions::default(),
    };
    overrides.apply(&mut options);
    MountOptions::validate_mount_point(mountpoint)?;
    let fs = backend(source, options.mirror_owner)?;
    serve(fs, mountpoint.to_path_buf(), options).await
}

#[cfg(all(feature = "fuse", target_os = "linux"))]
async fn serve(fs: Arc<dyn ContextualFs>, mountpoint: std::path::PathBuf, options: MountOptions) -> Result<()> {
    if !fsb_fuse::is_fuse_available() {
        bail!("FUSE is not available on this system");
    }
    println!(
        "{} {} at {}",
        style("Serving").green(),
        fs_label(&options),
        mountpoint.display()
    );
    let logger = Logger::current();
    tokio::task::spawn_blocking(move || fsb_fuse::mount(fs, &mountpoint, &options, logger))
        .await
        .context("mount task panicked")??;
    Ok(())
}

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
async fn serve(_fs: Arc<dyn ContextualFs>, _mountpoint: std::path::PathBuf, _options: MountOptions) -> Result<()> {
    bail!("this build of fsb cannot mount: FUSE support is not compiled in")
}

#[cfg_attr(not(all(feature = "fuse", target_os = "linux")), allow(dead_code))]
fn fs_label(options: &MountOptions) -> String {
    if options.read_only {
        format!("{} (read-only)", options.fs_name)
    } else {
        options.fs_name.clone()
    }
}

/// Print the attributes the bridge would report for `path`
pub async fn stat(source: &Path, path: &str) -> Result<()> {
    let ctx = own_context();
    let root = new_root(backend(source, false)?, Logger::current());
    let (node, attr) = resolve(root, &ctx, path).await?;

    println!("{}", style(node.path()).bold());
    println!("  Type: {}", format_kind(attr.mode));
    println!("  Size: {} ({})", attr.size, ByteSize(attr.size));
    println!("  Blocks: {}", attr.blocks);
    println!("  Mode: {:o} ({})", attr.mode & 0o7777, format_permissions(attr.mode));
    println!("  Links: {}", attr.nlink);
    println!("  Owner: {}  Group: {}", attr.uid, attr.gid);
    println!("  Accessed: {}", format_time(attr.atime));
    println!("  Modified: {}", format_time(attr.mtime));
    println!("  Changed: {}", format_time(attr.ctime));

    if attr.mode & S_IFMT == S_IFLNK {
        let target = node.readlink(&ctx).await?;
        println!("  Target: {}", String::from_utf8_lossy(&target));
    }
    Ok(())
}

/// List a directory as the bridge reports it
pub async fn ls(source: &Path, path: &str, long: bool, human: bool) -> Result<()> {
    let ctx = own_context();
    let root = new_root(backend(source, false)?, Logger::current());
    let (dir, attr) = resolve(root, &ctx, path).await?;
    if attr.mode & S_IFMT != S_IFDIR {
        bail!("not a directory: {path}");
    }

    let entries = dir.readdir(&ctx).await?;
    if entries.is_empty() {
        println!("(empty directory)");
        return Ok(());
    }

    if !long {
        for entry in entries {
            println!("{}", entry.name);
        }
        return Ok(());
    }

    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        let child = dir.lookup(&ctx, &entry.name).await?;
        rows.push(LsEntry {
            kind: format_kind(entry.mode),
            perms: format_permissions(child.attr.mode),
            owner: format!("{}:{}", child.attr.uid, child.attr.gid),
            size: format_size(child.attr.size, human),
            modified: format_time(child.attr.mtime),
            name: entry.name,
        });
    }
    println!("{}", Table::new(rows));
    Ok(())
}
