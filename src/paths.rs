//! Path resolution for nodeprep
//!
//! # Settings File Resolution Priority
//!
//! 1. `--config <path>` flag
//! 2. `NODEPREP_CONFIG` environment variable (read by clap into the flag)
//! 3. `XDG_CONFIG_HOME/nodeprep/settings.toml` (if set)
//! 4. Platform default:
//!    - Windows: `%APPDATA%\nodeprep\settings.toml`
//!    - macOS/Linux: `~/.config/nodeprep/settings.toml`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming the settings file
pub const ENV_CONFIG: &str = "NODEPREP_CONFIG";

/// Settings file name inside the config directory
pub const SETTINGS_FILE: &str = "settings.toml";

/// Get the nodeprep config directory path
///
/// Priority:
/// 1. `XDG_CONFIG_HOME/nodeprep`
/// 2. Platform default
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("nodeprep");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("nodeprep");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    // Unix default: ~/.config/nodeprep
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("nodeprep");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Resolve the settings file, preferring an explicit path
pub fn settings_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = expand(&path.to_string_lossy());
        log::debug!("Using settings file from flag or {}: {}", ENV_CONFIG, path.display());
        return Ok(path);
    }

    let path = config_dir()?.join(SETTINGS_FILE);
    log::debug!("Using default settings file: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// # Examples
///
/// ```ignore
/// let home_path = paths::expand("~/archive");
/// let var_path = paths::expand("$RoleRoot/archive");
/// ```
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
