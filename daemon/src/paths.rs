/// Location of the daemon's config file.
///
/// `$BEACON_CONFIG` wins when set; otherwise `beacon.toml` in the working
/// directory, which is where hosting platforms usually mount files.
use std::ffi::OsString;
use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "BEACON_CONFIG";
pub const CONFIG_FILE_NAME: &str = "beacon.toml";

/// Returns the config file path for this process.
pub fn config_file_path() -> PathBuf {
    resolve_config_path(std::env::var_os(CONFIG_PATH_ENV))
}

fn resolve_config_path(override_path: Option<OsString>) -> PathBuf {
    match override_path {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(CONFIG_FILE_NAME),
    }
}
