pub mod config;
pub mod remote;
pub mod serve;

use std::path::{Path, PathBuf};

/// `<config-root>/config/settings.yaml`
pub fn settings_path(config_root: &Path) -> PathBuf {
    config_root.join("config").join("settings.yaml")
}
