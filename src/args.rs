//! Child argument assembly.
//! Turns the caller's command arguments into a full [`Invocation`] of the
//! test binary, following the contract documented in [`crate::entry`].

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::debug;

use crate::coverage::{self, CoverageCounters};
use crate::entry::{self, ARGS_ENV, CONFIG_FLAG, CONTRACT_VERSION, DISABLE_CONFIG_WATCH_FLAG, ENTRY_ENV};
use crate::errors::HarnessError;

/// One fully-described child launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    /// libtest's arguments: entry-point selection only.
    pub args: Vec<OsString>,
    /// The command's own arguments, exported to the child as [`ARGS_ENV`].
    pub child_args: Vec<String>,
    pub envs: Vec<(OsString, OsString)>,
    /// The caller supplied its own `--config`; the provisioned one was not injected.
    pub caller_config: bool,
}

impl Invocation {
    /// Coverage profile path exported to the child, if any.
    pub fn profile_path(&self) -> Option<&Path> {
        self.envs
            .iter()
            .find(|(k, _)| k == coverage::PROFILE_ENV)
            .map(|(_, v)| Path::new(v))
    }

    /// A `Command` with program, args and env set; stdio left to the caller.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        cmd
    }
}

/// True if `arg` is the config flag, in either `--config` or `--config=<path>` form.
pub fn is_config_flag(arg: &OsStr) -> bool {
    let s = arg.to_string_lossy();
    s == CONFIG_FLAG || s.starts_with("--config=")
}

/// Builds invocations for one harness.
#[derive(Debug, Clone)]
pub struct ArgsBuilder {
    program: PathBuf,
    entry_point: String,
    test_name: String,
    config_path: PathBuf,
    coverage: Option<(PathBuf, Arc<CoverageCounters>)>,
}

impl ArgsBuilder {
    pub fn new(
        program: impl Into<PathBuf>,
        entry_point: impl Into<String>,
        test_name: impl Into<String>,
        config_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            entry_point: entry_point.into(),
            test_name: test_name.into(),
            config_path: config_path.into(),
            coverage: None,
        }
    }

    /// Enable per-invocation coverage profiles derived from `template`.
    pub fn with_coverage(mut self, template: impl Into<PathBuf>, counters: Arc<CoverageCounters>) -> Self {
        self.coverage = Some((template.into(), counters));
        self
    }

    /// Assemble the child invocation for `caller_args`.
    ///
    /// Every argument, and the config path when it is injected, must be valid
    /// UTF-8 since the child hands them to its CLI parser as `String`s.
    pub fn build<I, S>(&self, caller_args: I) -> Result<Invocation, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let caller = caller_args
            .into_iter()
            .map(|a| utf8(a.as_ref()))
            .collect::<Result<Vec<String>, _>>()?;

        // 1) select the entry-point test only
        let args: Vec<OsString> = vec![
            self.entry_point.clone().into(),
            "--exact".into(),
            "--nocapture".into(),
            "--quiet".into(),
        ];
        let mut envs: Vec<(OsString, OsString)> =
            vec![(ENTRY_ENV.into(), CONTRACT_VERSION.to_string().into())];

        // 2) the child's own arguments
        let mut child_args = vec![DISABLE_CONFIG_WATCH_FLAG.to_string()];

        // 3) caller's --config wins
        let caller_config = caller.iter().any(|a| is_config_flag(OsStr::new(a)));
        if !caller_config {
            child_args.push(CONFIG_FLAG.to_string());
            child_args.push(utf8(self.config_path.as_os_str())?);
        }

        // 4) caller args, in order
        child_args.extend(caller);
        envs.push((ARGS_ENV.into(), entry::encode_args(&child_args)?.into()));

        // 5) unique coverage profile, after every fallible step
        if let Some((template, counters)) = &self.coverage {
            let name = coverage::sanitize_test_name(&self.test_name);
            let n = counters.next(&name);
            let profile = coverage::profile_path(template, &name, n);
            envs.push((coverage::PROFILE_ENV.into(), profile.into_os_string()));
        }

        let inv = Invocation {
            program: self.program.clone(),
            args,
            child_args,
            envs,
            caller_config,
        };
        debug!(test = %self.test_name, args = ?inv.child_args, caller_config, "Built child invocation");
        Ok(inv)
    }
}

fn utf8(arg: &OsStr) -> Result<String, HarnessError> {
    arg.to_str().map(str::to_string).ok_or_else(|| HarnessError::NonUtf8Arg {
        arg: arg.to_os_string(),
    })
}
