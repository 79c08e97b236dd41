//! Child side of the re-invocation contract.
//!
//! The test binary doubles as the command runner: the harness launches it
//! again with libtest told to run only the entry-point test, and marks the
//! child with [`ENTRY_ENV`]. The command's own arguments travel in
//! [`ARGS_ENV`] as a JSON array, so libtest never sees them as test filters.
//! Inside the entry-point test, [`run_entry_point`] hands them to the CLI and
//! exits the process with its result.
//!
//! Contract version 2:
//!
//! ```text
//! argv: <entry> --exact --nocapture --quiet
//! env:  CMD_HARNESS_ENTRY=2
//!       CMD_HARNESS_ARGS=["--disableconfigwatch", "--config", "<path>", <args...>]
//! ```
//!
//! The `--config <path>` pair is left out when the caller passes its own.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;

/// Bumped whenever the layout below changes.
pub const CONTRACT_VERSION: u32 = 2;

/// Marks a process as a harness child. Value is the contract version.
pub const ENTRY_ENV: &str = "CMD_HARNESS_ENTRY";

/// The child's command-line arguments, JSON-encoded.
pub const ARGS_ENV: &str = "CMD_HARNESS_ARGS";

/// Test function name selected in the child unless the harness is told otherwise.
pub const DEFAULT_ENTRY_POINT: &str = "exec_command";

pub const DISABLE_CONFIG_WATCH_FLAG: &str = "--disableconfigwatch";
pub const CONFIG_FLAG: &str = "--config";

/// The child's argument vector, when this process is a harness child.
///
/// `None` outside child mode; `Some(Err(_))` when the marker is present but
/// the arguments cannot be decoded.
pub fn child_args() -> Option<anyhow::Result<Vec<String>>> {
    let marker = env::var(ENTRY_ENV).ok()?;
    if marker.trim() != CONTRACT_VERSION.to_string() {
        return None;
    }
    Some(decode_args(env::var(ARGS_ENV).ok().as_deref()))
}

/// Encode a child argument vector for [`ARGS_ENV`].
pub fn encode_args(args: &[String]) -> serde_json::Result<String> {
    serde_json::to_string(args)
}

fn decode_args(raw: Option<&str>) -> anyhow::Result<Vec<String>> {
    use anyhow::Context;
    let raw = raw.with_context(|| format!("{ARGS_ENV} is not set"))?;
    serde_json::from_str(raw).with_context(|| format!("decode {ARGS_ENV}"))
}

/// Arguments as seen by the child, split into the harness-owned prefix and the command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryArgs {
    pub disable_config_watch: bool,
    /// `--config` when it directly follows the prefix (harness-injected or caller-first).
    pub config: Option<PathBuf>,
    pub command: Vec<String>,
}

impl EntryArgs {
    /// Peel `--disableconfigwatch` and a leading `--config <path>`/`--config=<path>` off `args`.
    /// Everything else, including a later `--config`, stays in `command`.
    pub fn parse(args: &[String]) -> Self {
        let mut out = EntryArgs::default();
        let mut rest = args;
        if let Some((first, tail)) = rest.split_first()
            && first == DISABLE_CONFIG_WATCH_FLAG
        {
            out.disable_config_watch = true;
            rest = tail;
        }
        match rest {
            [flag, path, tail @ ..] if flag == CONFIG_FLAG => {
                out.config = Some(PathBuf::from(path));
                rest = tail;
            }
            [flag, tail @ ..] if flag.starts_with("--config=") => {
                out.config = Some(PathBuf::from(&flag["--config=".len()..]));
                rest = tail;
            }
            _ => {}
        }
        out.command = rest.to_vec();
        out
    }

    /// Full argument vector for the CLI parser (without a binary name).
    pub fn argv(&self) -> Vec<String> {
        let mut v = Vec::with_capacity(self.command.len() + 3);
        if self.disable_config_watch {
            v.push(DISABLE_CONFIG_WATCH_FLAG.to_string());
        }
        if let Some(cfg) = &self.config {
            v.push(CONFIG_FLAG.to_string());
            v.push(cfg.to_string_lossy().into_owned());
        }
        v.extend(self.command.iter().cloned());
        v
    }
}

/// Run `runner` when this process is a harness child, then exit; otherwise return immediately.
///
/// The process exits with 0 on success, 1 when the runner fails and 2 when the
/// arguments cannot be decoded, before libtest can print its per-test result
/// or summary.
pub fn run_entry_point<F>(runner: F)
where
    F: FnOnce(&EntryArgs) -> anyhow::Result<()>,
{
    let Some(decoded) = child_args() else {
        return;
    };
    let args = match decoded {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(2);
        }
    };
    let entry = EntryArgs::parse(&args);
    let code = match runner(&entry) {
        Ok(()) => 0,
        Err(e) => {
            let _ = io::stdout().flush();
            eprintln!("Error: {e:#}");
            1
        }
    };
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
    std::process::exit(code);
}

/// Declare the entry-point test that child processes select.
///
/// ```ignore
/// cmd_harness::entry_point!(support::run);
/// ```
///
/// expands to `#[test] fn exec_command()`, which is a no-op in the outer run.
#[macro_export]
macro_rules! entry_point {
    ($runner:expr) => {
        #[test]
        fn exec_command() {
            $crate::entry::run_entry_point($runner);
        }
    };
}
