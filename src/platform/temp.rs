//! Staging names for config rewrites.
//! A config is written under a hidden name next to its final path and renamed
//! into place, so a child reading `config.json` sees the old or the new file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQ: AtomicU64 = AtomicU64::new(0);

/// `.<file name>.<pid>-<seq>.tmp` in the directory of `target`.
///
/// Unique per process through the sequence number and across the concurrent
/// test processes through the pid.
pub fn staging_path(target: &Path) -> PathBuf {
    let file = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let name = format!(".{file}.{}-{seq}.tmp", std::process::id());
    match target.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// True for names produced by [`staging_path`].
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}
