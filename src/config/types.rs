//! Core configuration types.
//! - Config is the document provisioned for each child command.
//! - SqlSettings carries the database connection shared by the whole test run.
//! - LogLevel represents verbosity with simple parsing helpers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{DEFAULT_LISTEN_ADDRESS, DEFAULT_SQL_DATASOURCE, DEFAULT_SQL_DRIVER};

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Informational output (default)
    #[default]
    Normal,
    /// More info (like verbose)
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" | "warn" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlSettings {
    pub driver_name: String,
    pub data_source: String,
    pub data_source_replicas: Vec<String>,
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    pub query_timeout_secs: u64,
}

impl Default for SqlSettings {
    fn default() -> Self {
        Self {
            driver_name: DEFAULT_SQL_DRIVER.to_string(),
            data_source: DEFAULT_SQL_DATASOURCE.to_string(),
            data_source_replicas: Vec::new(),
            max_idle_conns: 20,
            max_open_conns: 300,
            query_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub site_url: String,
    pub listen_address: String,
    pub enable_developer: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            enable_developer: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Console verbosity
    pub console_level: LogLevel,
    pub enable_console: bool,
    pub enable_file: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            console_level: LogLevel::Normal,
            enable_console: true,
            enable_file: false,
        }
    }
}

/// Configuration document handed to the command under test.
///
/// Unknown fields are ignored and missing sections fall back to defaults, so
/// a config written by an older harness still loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service_settings: ServiceSettings,
    pub sql_settings: SqlSettings,
    pub log_settings: LogSettings,
}

impl Config {
    /// Pretty JSON, as persisted to `config.json`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
