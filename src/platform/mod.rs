//! Platform-specific helpers.
//! Hides Unix/Windows file-mode differences behind one API for the config
//! writer and the log file layer.

mod temp;
#[cfg(unix)]
mod unix;
#[cfg(not(unix))]
mod windows;

pub use temp::{is_staging_name, staging_path};

#[cfg(unix)]
pub use unix::{open_log_file_secure_append, write_config_0600};

#[cfg(not(unix))]
pub use windows::{open_log_file_secure_append, write_config_0600};
