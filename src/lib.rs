//! Core library for `cmd_harness`.
//!
//! Runs CLI commands in a child copy of the current test binary. Each test
//! gets a private temp dir with its own `config.json`; the child is pointed at
//! it unless the caller passes `--config` itself. Output from stdout and
//! stderr is captured as one stream, and under coverage every child writes a
//! uniquely named profile.
//!
//! An integration test file declares the child entry point once and then
//! drives commands through a [`Harness`]:
//!
//! ```ignore
//! cmd_harness::entry_point!(my_cli::run);
//!
//! #[test]
//! fn version_prints() {
//!     let h = cmd_harness::Harness::setup();
//!     assert_eq!(h.check_command(["version"]), "1.0.0");
//! }
//! ```

pub mod args;
pub mod config;
pub mod coverage;
pub mod entry;
pub mod errors;
pub mod fixture;
pub mod harness;
pub mod logging;
pub mod normalize;
pub mod platform;
pub mod process;

pub use args::{ArgsBuilder, Invocation};
pub use config::{Config, LogLevel, SqlSettings};
pub use coverage::CoverageCounters;
pub use entry::EntryArgs;
pub use errors::HarnessError;
pub use fixture::Fixture;
pub use harness::Harness;
pub use logging::init_test_tracing;
pub use normalize::normalize;
pub use process::OutputStream;

/// Convenience re-exports for test files.
pub mod prelude {
    pub use crate::config::{Config, LogLevel, LogSettings, ServiceSettings, SqlSettings, load_config};
    pub use crate::entry::EntryArgs;
    pub use crate::errors::HarnessError;
    pub use crate::fixture::Fixture;
    pub use crate::harness::Harness;
    pub use crate::logging::init_test_tracing;
    pub use crate::normalize::normalize;
    pub use crate::process::OutputStream;
}
