//! Typed error definitions for cmd_harness.
//! Keeps setup, launch and exit failures apart so tests can tell a command
//! that never started from one that ran and failed.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to provision {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fixture setup failed (temp dir {temp_dir}): {source:#}")]
    Fixture {
        temp_dir: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("argument is not valid UTF-8: {arg:?}")]
    NonUtf8Arg { arg: OsString },

    #[error("command exited unsuccessfully: {status}")]
    Exit { status: ExitStatus },

    #[error("command did not finish within {0:?}")]
    Timeout(Duration),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("fixture teardown failed: {0:#}")]
    TearDown(#[source] anyhow::Error),
}

impl HarnessError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        HarnessError::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable short code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            HarnessError::Setup { .. } => "setup",
            HarnessError::Fixture { .. } => "fixture",
            HarnessError::Launch { .. } => "launch",
            HarnessError::NonUtf8Arg { .. } => "non_utf8_arg",
            HarnessError::Exit { .. } => "exit",
            HarnessError::Timeout(_) => "timeout",
            HarnessError::Io { .. } => "io",
            HarnessError::Serialize(_) => "serialize",
            HarnessError::TearDown(_) => "teardown",
        }
    }

    /// Exit code of the child, when it ran to completion and failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            HarnessError::Exit { status } => status.code(),
            _ => None,
        }
    }
}
