//! Path utilities for loopmix configuration files

use std::path::PathBuf;

/// Name of the mixer config file
pub const CONFIG_FILE_NAME: &str = "mixer.yaml";

/// Directory holding loopmix configuration
///
/// Returns: `<platform config dir>/loopmix` (e.g. `~/.config/loopmix`),
/// falling back to `./loopmix` when the platform has no config dir.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loopmix")
}

/// Full path of a config file inside [`default_config_dir`]
///
/// # Arguments
/// * `filename` - Config file name (e.g., "mixer.yaml")
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
