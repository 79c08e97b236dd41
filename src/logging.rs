//! Tracing initialization for test processes.
//! Builds a subscriber with EnvFilter, supports compact or JSON formats, and optional file logging.
//!
//! Behavior:
//! - Level comes from `CMD_HARNESS_LOG` (a LogLevel name or an EnvFilter directive); default warn.
//! - `CMD_HARNESS_LOG_JSON=1` switches the console layer to JSON.
//! - `CMD_HARNESS_LOG_FILE=<path>` adds a non-blocking file layer.
//!
//! Console output goes through libtest's capture, so harness logs only show
//! up for failing tests (or with `--nocapture`).

use chrono::Local;
use std::env;
use std::fmt as stdfmt;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt as tsfmt;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogLevel;
use crate::platform::open_log_file_secure_append;

pub const LOG_ENV: &str = "CMD_HARNESS_LOG";
pub const LOG_JSON_ENV: &str = "CMD_HARNESS_LOG_JSON";
pub const LOG_FILE_ENV: &str = "CMD_HARNESS_LOG_FILE";

// Keeps the file appender flushing for the life of the test process.
static FILE_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);
static INIT: OnceLock<()> = OnceLock::new();

/// Human-friendly timestamp formatter (DD/MM/YY HH:MM:SS)
struct LocalHumanTime;
impl FormatTime for LocalHumanTime {
    fn format_time(&self, w: &mut tsfmt::format::Writer<'_>) -> stdfmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%d/%m/%y %H:%M:%S"))
    }
}

#[inline]
fn to_level_filter(lvl: LogLevel) -> LevelFilter {
    match lvl {
        LogLevel::Quiet => LevelFilter::ERROR,
        LogLevel::Normal => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::TRACE,
    }
}

/// EnvFilter for a `CMD_HARNESS_LOG` value: LogLevel names first, raw directives otherwise.
pub fn env_filter_for(value: Option<&str>) -> EnvFilter {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return EnvFilter::new("warn");
    };
    if let Some(lvl) = LogLevel::parse(raw) {
        return EnvFilter::new(to_level_filter(lvl).to_string().to_ascii_lowercase());
    }
    EnvFilter::try_new(raw).unwrap_or_else(|e| {
        eprintln!("Ignoring invalid {LOG_ENV} value '{raw}': {e}");
        EnvFilter::new("warn")
    })
}

fn maybe_open_non_blocking_writer(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    match open_log_file_secure_append(path) {
        Ok(file) => Some(tracing_appender::non_blocking(file)),
        Err(e) => {
            eprintln!("Failed to open harness log file {}: {}", path.display(), e);
            None
        }
    }
}

/// Install the harness subscriber once per process. Later calls, or a
/// subscriber installed by someone else, leave things as they are.
pub fn init_test_tracing() {
    INIT.get_or_init(|| {
        let level = env::var(LOG_ENV).ok();
        let json = env::var(LOG_JSON_ENV).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
        let file = env::var_os(LOG_FILE_ENV)
            .filter(|v| !v.is_empty())
            .and_then(|p| maybe_open_non_blocking_writer(Path::new(&p)));

        let env_filter = env_filter_for(level.as_deref());
        let (file_writer, guard) = match file {
            Some((w, g)) => (Some(w), Some(g)),
            None => (None, None),
        };

        let installed = if json {
            let console = tsfmt::layer()
                .event_format(tsfmt::format().json())
                .with_timer(LocalHumanTime)
                .with_target(true)
                .with_thread_names(true)
                .with_test_writer();
            let file_layer = file_writer.map(|w| {
                tsfmt::layer()
                    .event_format(tsfmt::format().json())
                    .with_timer(LocalHumanTime)
                    .with_thread_names(true)
                    .with_writer(w)
            });
            registry().with(env_filter).with(console).with(file_layer).try_init()
        } else {
            let console = tsfmt::layer()
                .with_timer(LocalHumanTime)
                .with_target(true)
                .with_thread_names(true)
                .compact()
                .with_test_writer();
            let file_layer = file_writer.map(|w| {
                tsfmt::layer()
                    .with_timer(LocalHumanTime)
                    .with_thread_names(true)
                    .with_ansi(false)
                    .compact()
                    .with_writer(w)
            });
            registry().with(env_filter).with(console).with(file_layer).try_init()
        };

        if installed.is_ok()
            && let Ok(mut slot) = FILE_GUARD.lock()
        {
            *slot = guard;
        }
    });
}
