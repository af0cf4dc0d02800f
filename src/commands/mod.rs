//! Command-line command handlers.
//!
//! One-shot commands that load the configuration, do one thing and exit.
//! Each command is implemented in its own submodule.

pub mod discover;
pub mod help;
pub mod window;

use anyhow::Result;
use std::path::Path;

use crate::config::Config;

/// Load the configuration from the `--config` path or the default location.
pub(crate) fn load_config(config_path: Option<&str>) -> Result<Config> {
    Config::load(config_path.map(Path::new))
}
