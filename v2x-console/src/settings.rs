//! Simulation config discovery

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use v2x_sim::SimConfig;

/// Config directory for the console
///
/// Uses $XDG_CONFIG_HOME/v2x-console when that is absolute, falls back to
/// ~/.config/v2x-console
fn config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config);
        if path.is_absolute() {
            return Some(path.join("v2x-console"));
        }
    }

    dirs::home_dir().map(|h| h.join(".config").join("v2x-console"))
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("sim.json"))
}

/// Load the simulation config from `path`, or defaults when it is missing
///
/// A file that exists but does not parse is an error.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SimConfig> {
    match path {
        Some(path) if path.exists() => {
            info!("Loading simulation config from {}", path.display());
            Ok(SimConfig::load(path)?)
        }
        Some(path) => {
            info!("No config at {}, using defaults", path.display());
            Ok(SimConfig::default())
        }
        None => {
            warn!("Could not determine config path, using defaults");
            Ok(SimConfig::default())
        }
    }
}
