//! Backups taken before a file is overwritten
//!
//! The first backup of a file is `<file>.bak` and is never overwritten, so it
//! always holds the content from before the tool first touched the file.
//! Later backups go to `<file>.<YYYYmmdd_HHMMSS_mmm>.bak`.

use crate::project::append_ext;
use chrono::Local;
use emurun_core::error::{Error, Result};
use std::path::{Path, PathBuf};

/// `<file>.bak`
pub fn first_backup_path(path: &Path) -> PathBuf {
    append_ext(path, "bak")
}

/// Where the next backup of `path` goes
pub fn next_backup_path(path: &Path) -> PathBuf {
    let first = first_backup_path(path);
    if !first.exists() {
        return first;
    }
    let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
    let mut candidate = append_ext(path, &format!("{stamp}.bak"));
    let mut n = 1;
    while candidate.exists() {
        candidate = append_ext(path, &format!("{stamp}-{n}.bak"));
        n += 1;
    }
    candidate
}

/// Save `content` (the current content of `path`) as a backup
pub fn write_backup(path: &Path, content: &str) -> Result<PathBuf> {
    let target = next_backup_path(path);
    std::fs::write(&target, content).map_err(|err| Error::backup_failed(path, err))?;
    tracing::debug!(file = %path.display(), backup = %target.display(), "backup written");
    Ok(target)
}
