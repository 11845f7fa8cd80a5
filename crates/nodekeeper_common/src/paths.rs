//! Filesystem locations
//!
//! State lives under the per-user state directory when the platform has one
//! (`$XDG_STATE_HOME` on Linux), otherwise the local data directory, otherwise
//! `/var/lib/nodekeeper`.

use std::path::PathBuf;

/// Directory name under the platform state/config dirs
pub const APP_DIR: &str = "nodekeeper";

/// State file name
pub const STATE_FILE_NAME: &str = "state.json";

/// Log file name
pub const LOG_FILE_NAME: &str = "nodekeeper.log";

/// System-wide config file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/nodekeeper/config.toml";

/// Last-resort state directory
pub const FALLBACK_STATE_DIR: &str = "/var/lib/nodekeeper";

/// Directory holding the state file and the log file
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_STATE_DIR))
}

/// Default location of the persisted orchestration state
pub fn default_state_file() -> PathBuf {
    state_dir().join(STATE_FILE_NAME)
}

/// Default location of the log file
pub fn default_log_file() -> PathBuf {
    state_dir().join(LOG_FILE_NAME)
}

/// Per-user config file, if the platform has a config dir
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_file_under_app_dir() {
        let path = default_state_file();
        assert!(path.ends_with("nodekeeper/state.json"));
    }

    #[test]
    fn test_log_file_next_to_state() {
        assert_eq!(default_log_file().parent(), default_state_file().parent());
    }
}
