//! Per-test harness: a private config in a temp dir, plus the three ways of
//! running a command in a child copy of the test binary.
//!
//! Typical use inside an integration test that also declares the entry point
//! (see [`crate::entry_point!`]):
//!
//! ```ignore
//! let h = Harness::setup();
//! assert_eq!(h.check_command(["version"]), "1.0.0");
//! h.tear_down().unwrap();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::args::{ArgsBuilder, Invocation};
use crate::config::{CONFIG_FILE_NAME, Config, SqlSettings, shared_sql_settings, write_config};
use crate::coverage::{self, CoverageCounters};
use crate::entry::DEFAULT_ENTRY_POINT;
use crate::errors::HarnessError;
use crate::fixture::Fixture;
use crate::logging::init_test_tracing;
use crate::normalize::normalize;
use crate::process::{self, OutputStream};

pub struct Harness<F: Fixture = ()> {
    fixture: F,
    torn_down: bool,
    temp_dir: Option<TempDir>,
    temp_path: PathBuf,
    config_path: PathBuf,
    config: Config,
    sql: &'static SqlSettings,
    test_name: String,
    program: PathBuf,
    entry_point: String,
    coverage_profile: Option<PathBuf>,
    counters: Arc<CoverageCounters>,
    timeout: Option<Duration>,
}

impl Harness<()> {
    /// Harness without a service fixture. Panics if provisioning fails.
    pub fn setup() -> Self {
        Self::setup_with(|| Ok(()))
    }

    pub fn try_setup() -> Result<Self, HarnessError> {
        Self::try_setup_with(|| Ok(()))
    }
}

impl<F: Fixture> Harness<F> {
    /// Provision a temp dir and config, then build the fixture with `factory`.
    /// Panics on any failure: the test cannot run without a writable config.
    pub fn setup_with<G>(factory: G) -> Self
    where
        G: FnOnce() -> anyhow::Result<F>,
    {
        Self::try_setup_with(factory).unwrap_or_else(|e| fatal("harness setup failed", &e))
    }

    /// Fallible form of [`setup_with`](Self::setup_with).
    ///
    /// If `factory` fails, the temp dir is removed before the error is returned.
    pub fn try_setup_with<G>(factory: G) -> Result<Self, HarnessError>
    where
        G: FnOnce() -> anyhow::Result<F>,
    {
        init_test_tracing();
        let program = std::env::current_exe().map_err(|e| HarnessError::io("locate test executable", e))?;
        let dir = tempfile::Builder::new()
            .prefix("cmd-harness-")
            .tempdir()
            .map_err(|source| HarnessError::Setup {
                path: std::env::temp_dir(),
                source,
            })?;
        let temp_path = dir.path().to_path_buf();

        let fixture = match factory() {
            Ok(f) => f,
            Err(source) => {
                if let Err(e) = dir.close() {
                    warn!(path = %temp_path.display(), error = %e, "Failed to remove temp dir after fixture failure");
                }
                return Err(HarnessError::Fixture {
                    temp_dir: temp_path,
                    source,
                });
            }
        };

        let mut harness = Harness {
            fixture,
            torn_down: false,
            config_path: temp_path.join(CONFIG_FILE_NAME),
            temp_dir: Some(dir),
            temp_path,
            config: Config::default(),
            sql: shared_sql_settings(),
            test_name: current_test_name(),
            program,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            coverage_profile: coverage::profile_from_env(),
            counters: CoverageCounters::global(),
            timeout: None,
        };
        // Dropping `harness` on error tears down the fixture and removes the dir.
        harness.try_set_config(Config::default())?;
        debug!(test = %harness.test_name, dir = %harness.temp_path.display(), "Harness provisioned");
        Ok(harness)
    }

    /// Run the fixture's baseline data setup. Panics on failure.
    pub fn init_basic(mut self) -> Self {
        if let Err(e) = self.fixture.init_basic() {
            fatal("fixture init_basic failed", &e);
        }
        self
    }

    pub fn fixture(&self) -> &F {
        &self.fixture
    }

    pub fn fixture_mut(&mut self) -> &mut F {
        &mut self.fixture
    }

    // Builders. These only affect invocations made afterwards.

    /// Name used in coverage profile names. Defaults to the libtest thread name.
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = name.into();
        self
    }

    /// Executable to launch. Defaults to the running test binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Test function selected in the child. Defaults to `exec_command`.
    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    /// Coverage profile template; `None` disables per-invocation profiles.
    /// Defaults to the outer run's `LLVM_PROFILE_FILE`.
    pub fn with_coverage_profile(mut self, template: Option<PathBuf>) -> Self {
        self.coverage_profile = template;
        self
    }

    pub fn with_coverage_counters(mut self, counters: Arc<CoverageCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Kill a child still running after `limit`. Without it, waits are unbounded.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// A copy of the current config; changing it has no effect until passed to [`set_config`](Self::set_config).
    pub fn config(&self) -> Config {
        self.config.clone()
    }

    /// Replace the config and rewrite `config.json`. The run's SQL settings are
    /// always re-applied. Panics if the file cannot be written.
    pub fn set_config(&mut self, config: Config) {
        if let Err(e) = self.try_set_config(config) {
            fatal("failed to write config", &e);
        }
    }

    pub fn try_set_config(&mut self, mut config: Config) -> Result<(), HarnessError> {
        config.sql_settings = self.sql.clone();
        write_config(&self.config_path, &config)?;
        self.config = config;
        Ok(())
    }

    /// The invocation that would be launched for `args`.
    /// Fails with [`HarnessError::NonUtf8Arg`] if an argument or the config path is not UTF-8.
    pub fn invocation<I, S>(&self, args: I) -> Result<Invocation, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut builder = ArgsBuilder::new(&self.program, &self.entry_point, &self.test_name, &self.config_path);
        if let Some(template) = &self.coverage_profile {
            builder = builder.with_coverage(template, Arc::clone(&self.counters));
        }
        builder.build(args)
    }

    /// Run a command that must succeed and return its normalized output.
    /// Panics with the captured output on launch failure, non-zero exit or timeout.
    pub fn check_command<I, S>(&self, args: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let inv = match self.invocation(args) {
            Ok(inv) => inv,
            Err(e) => panic!("command could not be built [{}]: {e}", e.code()),
        };
        let (output, result) = process::run_with_output(&inv, self.timeout);
        if let Err(e) = result {
            panic!(
                "command {:?} failed [{}]: {e}\n--- output ---\n{output}",
                command_args(&inv),
                e.code()
            );
        }
        normalize(&output)
    }

    /// Run a command and report only whether it succeeded. Output is discarded.
    pub fn run_command<I, S>(&self, args: I) -> Result<(), HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        process::run_status(&self.invocation(args)?, self.timeout)
    }

    /// Run a command and return its raw merged output with the outcome.
    pub fn run_command_with_output<I, S>(&self, args: I) -> (String, Result<(), HarnessError>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        match self.invocation(args) {
            Ok(inv) => process::run_with_output(&inv, self.timeout),
            Err(e) => (String::new(), Err(e)),
        }
    }

    /// Start a command and hand back its live output stream.
    pub fn spawn_command<I, S>(&self, args: I) -> Result<OutputStream, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        OutputStream::spawn(&self.invocation(args)?, self.timeout)
    }

    /// Tear down the fixture, then remove the temp dir.
    ///
    /// Returns the fixture's error, if any. Failing to remove the dir is only logged.
    pub fn tear_down(mut self) -> Result<(), HarnessError> {
        self.torn_down = true;
        let fixture_result = self.fixture.tear_down().map_err(HarnessError::TearDown);
        self.remove_temp_dir();
        fixture_result
    }

    fn remove_temp_dir(&mut self) {
        let Some(dir) = self.temp_dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => debug!(path = %self.temp_path.display(), "Removed harness temp dir"),
            Err(e) => warn!(path = %self.temp_path.display(), error = %e, "Failed to remove harness temp dir"),
        }
    }
}

impl<F: Fixture> Drop for Harness<F> {
    fn drop(&mut self) {
        if !self.torn_down {
            self.torn_down = true;
            if let Err(e) = self.fixture.tear_down() {
                warn!(error = %format!("{e:#}"), "Fixture teardown failed during drop");
            }
        }
        self.remove_temp_dir();
    }
}

/// Caller args as passed, i.e. everything after the harness-owned prefix.
fn command_args(inv: &Invocation) -> &[String] {
    let skip = if inv.caller_config { 1 } else { 3 };
    inv.child_args.get(skip..).unwrap_or_default()
}

fn current_test_name() -> String {
    match thread::current().name() {
        Some(name) if name != "main" => name.to_string(),
        _ => "harness".to_string(),
    }
}

fn fatal(context: &str, err: &dyn std::fmt::Display) -> ! {
    panic!("{context}: {err:#}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        calls: Rc<RefCell<Vec<&'static str>>>,
        fail_tear_down: bool,
    }

    impl Fixture for Recorder {
        fn init_basic(&mut self) -> anyhow::Result<()> {
            self.calls.borrow_mut().push("init_basic");
            Ok(())
        }

        fn tear_down(&mut self) -> anyhow::Result<()> {
            self.calls.borrow_mut().push("tear_down");
            if self.fail_tear_down {
                anyhow::bail!("database still locked");
            }
            Ok(())
        }
    }

    #[test]
    fn setup_writes_config_with_shared_sql() {
        let h = Harness::setup();
        assert!(h.config_path().starts_with(h.temp_dir()));
        let on_disk = load_config(h.config_path()).unwrap();
        assert_eq!(&on_disk.sql_settings, shared_sql_settings());
        assert_eq!(on_disk, h.config());
        h.tear_down().unwrap();
    }

    #[test]
    fn set_config_forces_shared_sql_settings() {
        let mut h = Harness::setup();
        let mut cfg = h.config();
        cfg.sql_settings = SqlSettings {
            driver_name: "sqlite".into(),
            data_source: String::new(),
            ..SqlSettings::default()
        };
        cfg.service_settings.site_url = "http://example.test".into();
        h.set_config(cfg);

        let on_disk = load_config(h.config_path()).unwrap();
        assert_eq!(&on_disk.sql_settings, shared_sql_settings());
        assert_eq!(on_disk.service_settings.site_url, "http://example.test");
    }

    #[test]
    fn config_returns_a_copy() {
        let h = Harness::setup();
        let mut copy = h.config();
        copy.service_settings.enable_developer = !copy.service_settings.enable_developer;
        assert_ne!(copy, h.config());
    }

    #[test]
    fn tear_down_removes_dir() {
        let h = Harness::setup();
        let dir = h.temp_dir().to_path_buf();
        assert!(dir.is_dir());
        h.tear_down().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn drop_removes_dir() {
        let dir = {
            let h = Harness::setup();
            h.temp_dir().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn fixture_is_torn_down_before_dir_and_error_propagates() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let rec = Recorder {
            calls: Rc::clone(&calls),
            fail_tear_down: true,
        };
        let h = Harness::setup_with(|| Ok(rec)).init_basic();
        let dir = h.temp_dir().to_path_buf();
        let err = h.tear_down().unwrap_err();
        assert!(matches!(err, HarnessError::TearDown(_)));
        assert!(!dir.exists(), "dir removed even though fixture teardown failed");
        assert_eq!(*calls.borrow(), ["init_basic", "tear_down"]);
    }

    #[test]
    fn fixture_torn_down_once_on_drop() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let rec = Recorder {
            calls: Rc::clone(&calls),
            ..Recorder::default()
        };
        drop(Harness::setup_with(|| Ok(rec)));
        assert_eq!(*calls.borrow(), ["tear_down"]);
    }

    #[test]
    fn failed_fixture_setup_removes_dir() {
        let err = match Harness::<Recorder>::try_setup_with(|| anyhow::bail!("no database")) {
            Ok(_) => panic!("setup should fail"),
            Err(e) => e,
        };
        match err {
            HarnessError::Fixture { temp_dir, .. } => assert!(!temp_dir.exists()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invocation_points_at_provisioned_config() {
        let h = Harness::setup()
            .with_program("/bin/true")
            .with_entry_point("run_cli")
            .with_coverage_profile(None);
        let inv = h.invocation(["user", "list"]).unwrap();
        assert_eq!(inv.program, PathBuf::from("/bin/true"));
        assert_eq!(inv.args[0], "run_cli");
        let config = h.config_path().to_str().unwrap();
        assert!(inv.child_args.iter().any(|a| a == config));
        assert_eq!(command_args(&inv), ["user", "list"]);

        let inv = h.invocation(["--config", "/other.json"]).unwrap();
        assert_eq!(command_args(&inv), ["--config", "/other.json"]);
    }

    #[test]
    fn coverage_names_follow_harness_test_name() {
        let counters = Arc::new(CoverageCounters::default());
        let h = Harness::setup()
            .with_test_name("suite::case")
            .with_coverage_profile(Some(PathBuf::from("/cov/run.profraw")))
            .with_coverage_counters(Arc::clone(&counters));
        let a = h.invocation(["x"]).unwrap();
        let b = h.invocation(["x"]).unwrap();
        assert_eq!(a.profile_path(), Some(Path::new("/cov/run-suite-case-1.profraw")));
        assert_eq!(b.profile_path(), Some(Path::new("/cov/run-suite-case-2.profraw")));
    }

    #[cfg(unix)]
    #[test]
    fn launch_failure_is_returned_not_fatal() {
        let h = Harness::setup().with_program("/definitely/not/here");
        assert!(matches!(h.run_command(["x"]), Err(HarnessError::Launch { .. })));
        let (out, res) = h.run_command_with_output(["x"]);
        assert!(out.is_empty());
        assert!(matches!(res, Err(HarnessError::Launch { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_args_fail_before_launch() {
        use std::os::unix::ffi::OsStrExt;
        let h = Harness::setup().with_program("/definitely/not/here");
        let args = [OsStr::new("echo"), OsStr::from_bytes(b"caf\xff")];
        assert!(matches!(h.run_command(args), Err(HarnessError::NonUtf8Arg { .. })));
        assert!(matches!(h.spawn_command(args), Err(HarnessError::NonUtf8Arg { .. })));
        let (out, res) = h.run_command_with_output(args);
        assert!(out.is_empty());
        assert_eq!(res.unwrap_err().code(), "non_utf8_arg");
    }
}
