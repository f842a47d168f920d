// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk state shared by concurrent invocations: the cloud credential file
//! and the per-profile session directory.
//!
//! Every write goes through [`write_private`]: render to a unique sibling temp
//! file with owner-only permissions, then rename over the target, so readers
//! observe either the old or the new file in full.

pub mod credentials;
pub mod monitoring;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;

/// Resolve the current user's home directory.
pub fn home_dir() -> anyhow::Result<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .context("neither HOME nor USERPROFILE is set")
}

/// Where one user's cached state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    /// Cloud CLI compatible credential file.
    pub credentials: PathBuf,
    /// Per-profile monitoring tokens and quota timestamps.
    pub session_dir: PathBuf,
}

impl CachePaths {
    pub fn under(home: &Path) -> Self {
        Self {
            credentials: home.join(".aws").join("credentials"),
            session_dir: home.join(".claude-code-session"),
        }
    }
}

pub fn monitoring_file(session_dir: &Path, profile: &str) -> PathBuf {
    session_dir.join(format!("{profile}-monitoring.json"))
}

pub fn quota_check_file(session_dir: &Path, profile: &str) -> PathBuf {
    session_dir.join(format!("{profile}-quota-check.json"))
}

/// Create `dir` (and missing parents) with mode 0700.
pub(crate) fn ensure_private_dir(dir: &Path) -> anyhow::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).with_context(|| format!("creating {}", dir.display()))
}

/// Atomically replace `path` with `contents`, readable only by the owner.
///
/// The temp name is unique per process and call (PID + counter) so that
/// concurrent writers never share a partially written temp file.
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_private_dir(parent)?;
    }

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        ".{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);

    let result = write_then_rename(&tmp_path, path, contents);
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

fn write_then_rename(tmp_path: &Path, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file =
        options.open(tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(tmp_path, path)
        .with_context(|| format!("renaming {} over {}", tmp_path.display(), path.display()))
}

/// Remove `path`, reporting whether anything was there.
pub(crate) fn remove_if_exists(path: &Path) -> anyhow::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
