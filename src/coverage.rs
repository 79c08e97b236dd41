//! Per-invocation coverage profile naming.
//!
//! Every child process writes its own profile. Names are derived from the
//! outer run's `LLVM_PROFILE_FILE` by inserting `-<test>-<n>` after the file
//! stem, where `n` comes from a counter table keyed by test name.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

/// Environment variable LLVM's profiling runtime reads the output path from.
pub const PROFILE_ENV: &str = "LLVM_PROFILE_FILE";

static GLOBAL: LazyLock<Arc<CoverageCounters>> =
    LazyLock::new(|| Arc::new(CoverageCounters::default()));

/// Invocation counters keyed by test name. Counts only ever grow.
#[derive(Debug, Default)]
pub struct CoverageCounters {
    counts: Mutex<HashMap<String, u32>>,
}

impl CoverageCounters {
    /// Process-wide table shared by every harness that doesn't bring its own.
    pub fn global() -> Arc<CoverageCounters> {
        Arc::clone(&GLOBAL)
    }

    /// Increment the counter for `test_name` and return the new value (first call yields 1).
    pub fn next(&self, test_name: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let n = counts.entry(test_name.to_string()).or_insert(0);
        *n += 1;
        *n
    }
}

/// Coverage profile template of the outer run, if instrumentation is active.
pub fn profile_from_env() -> Option<PathBuf> {
    env::var_os(PROFILE_ENV)
        .filter(|v| !v.to_string_lossy().trim().is_empty())
        .map(PathBuf::from)
}

/// Make a test name safe to embed in a file name.
/// `a::b` becomes `a-b`; anything outside `[A-Za-z0-9_-]` becomes `_`.
pub fn sanitize_test_name(name: &str) -> String {
    name.replace("::", "-")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// `<dir>/<stem>-<test>-<counter>.<rest>` where the stem ends at the first `.`.
pub fn profile_path(template: &Path, test_name: &str, counter: u32) -> PathBuf {
    let base = template
        .file_name()
        .map(|b| b.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.split_once('.') {
        Some((stem, rest)) => format!("{stem}-{test_name}-{counter}.{rest}"),
        None => format!("{base}-{test_name}-{counter}"),
    };
    match template.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
