//! A small CLI the integration tests drive through the harness.
//! Each test file declares `cmd_harness::entry_point!(support::run)`.

#![allow(dead_code)]

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use cmd_harness::config::load_config;
use cmd_harness::entry::EntryArgs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "demo", version)]
pub struct Cli {
    /// Config file to read
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Do not watch the config file for changes
    #[arg(long = "disableconfigwatch", global = true)]
    pub disable_config_watch: bool,

    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Print the package version
    Version,
    /// Print words to stdout, optionally echoing them to stderr as well
    Echo {
        #[arg(long)]
        stderr: bool,
        words: Vec<String>,
    },
    /// Write a line, then fail with MESSAGE
    Fail {
        #[arg(long, default_value = "command failed")]
        message: String,
    },
    /// Inspect the config the command was started with
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
    /// Report whether config watching was disabled
    Watch,
    /// Print an environment variable (empty if unset)
    Env { name: String },
    /// Print, sleep, print again
    Sleep {
        #[arg(long, default_value_t = 500)]
        millis: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Print the path of the config in use
    Show,
    /// Print one setting
    Get { key: String },
}

pub fn run(entry: &EntryArgs) -> Result<()> {
    let cli = Cli::try_parse_from(std::iter::once("demo".to_string()).chain(entry.argv()))?;
    let mut out = io::stdout().lock();

    match cli.command {
        Cmd::Version => writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?,
        Cmd::Echo { stderr, words } => {
            let line = words.join(" ");
            writeln!(out, "out: {line}")?;
            out.flush()?;
            if stderr {
                eprintln!("err: {line}");
            }
        }
        Cmd::Fail { message } => {
            writeln!(out, "about to fail")?;
            bail!(message);
        }
        Cmd::Config { action } => {
            let path = cli.config.ok_or_else(|| anyhow!("no --config given"))?;
            match action {
                ConfigCmd::Show => writeln!(out, "{}", path.display())?,
                ConfigCmd::Get { key } => {
                    let cfg = load_config(&path)?;
                    let value = match key.as_str() {
                        "site_url" => cfg.service_settings.site_url,
                        "listen_address" => cfg.service_settings.listen_address,
                        "sql.driver" => cfg.sql_settings.driver_name,
                        "sql.datasource" => cfg.sql_settings.data_source,
                        "log.console_level" => cfg.log_settings.console_level.to_string(),
                        other => bail!("unknown key: {other}"),
                    };
                    writeln!(out, "{value}")?;
                }
            }
        }
        Cmd::Watch => {
            let state = if cli.disable_config_watch { "disabled" } else { "enabled" };
            writeln!(out, "{state}")?;
        }
        Cmd::Env { name } => writeln!(out, "{}", std::env::var(&name).unwrap_or_default())?,
        Cmd::Sleep { millis } => {
            writeln!(out, "sleeping")?;
            out.flush().context("flush stdout")?;
            thread::sleep(Duration::from_millis(millis));
            writeln!(out, "awake")?;
        }
    }
    Ok(())
}
