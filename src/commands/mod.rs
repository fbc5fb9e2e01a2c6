pub mod run;
pub mod settings;
pub mod status;

use crate::Context;
use crate::paths;
use crate::settings::Settings;
use anyhow::Result;
use std::path::PathBuf;

/// Resolve and load the settings file for this invocation.
pub fn load_settings(ctx: &Context) -> Result<(PathBuf, Settings)> {
    let path = paths::settings_file(ctx.config.as_deref())?;
    let settings = Settings::load(&path)?;
    Ok((path, settings))
}
