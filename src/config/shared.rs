//! Database settings shared by every harness in the test process.
//! Read from the environment once, on first use, and never mutated afterwards.

use std::env;
use std::sync::OnceLock;
use tracing::debug;

use super::types::SqlSettings;

pub const SQL_DRIVER_ENV: &str = "CMD_HARNESS_SQL_DRIVER";
pub const SQL_DATASOURCE_ENV: &str = "CMD_HARNESS_SQL_DATASOURCE";

static SHARED: OnceLock<SqlSettings> = OnceLock::new();

/// Settings for the database the current test run uses.
pub fn shared_sql_settings() -> &'static SqlSettings {
    SHARED.get_or_init(|| {
        let settings = sql_settings_from_env();
        debug!(driver = %settings.driver_name, "Loaded shared SQL settings");
        settings
    })
}

/// Build settings from defaults plus environment overrides. Empty values are ignored.
pub fn sql_settings_from_env() -> SqlSettings {
    let mut settings = SqlSettings::default();
    if let Some(driver) = non_empty_var(SQL_DRIVER_ENV) {
        settings.driver_name = driver;
    }
    if let Some(dsn) = non_empty_var(SQL_DATASOURCE_ENV) {
        settings.data_source = dsn;
    }
    settings
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
