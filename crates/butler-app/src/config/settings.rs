//! Settings parser for config.toml

use std::path::{Path, PathBuf};

use butler_core::prelude::*;

use super::types::Settings;

const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "flutter-butler";

/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "BUTLER_CONFIG_DIR";

/// Resolve the config directory
///
/// Order: explicit override, `BUTLER_CONFIG_DIR`, `<config_dir>/flutter-butler`, and
/// finally `./.flutter-butler` when the platform has no config dir.
pub fn config_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".flutter-butler"))
}

/// Load settings from `<config_dir>/config.toml`
///
/// Returns default settings if file doesn't exist or can't be parsed.
pub fn load_settings(config_dir: &Path) -> Settings {
    let config_path = config_dir.join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create the config dir with a commented default config.toml
///
/// An existing config.toml is left untouched.
pub fn init_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;
    }

    let config_path = config_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# Flutter Butler Configuration

[timing]
volume_reassert_interval_ms = 300   # volume lock drift check (min 50)
focus_reassert_delay_ms = 100       # reassert after losing audio focus
overlay_poll_interval_ms = 500      # OEM power-menu detection poll (min 100)
block_loop_period_ms = 50           # "back" repeat while the power menu is up (min 10)
block_loop_timeout_ms = 10000       # block loop stops on its own after this
screen_wake_ms = 3000               # wake lock held when an alarm fires
pin_verify_timeout_ms = 30000       # wait for the app to answer verifyPin

[alert]
vibration_pattern = [0, 800, 400, 800]

[classifier]
# Case-insensitive substrings; a power menu needs a system package AND a matching class
system_packages = ["systemui", "power"]
exact_system_packages = ["android"]
power_menu_classes = ["GlobalActions", "PowerOptions", "Shutdown", "PowerUI", "SystemUI"]
system_dialog_class = "Dialog"

[overlay]
detection_packages = ["systemui"]
detection_classes = ["GlobalActions", "PowerUI"]

[preferences]
file_name = "butler_prefs.json"
armed_key = "is_armed"
"#;
        std::fs::write(&config_path, default_content)
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Wrote default config to {:?}", config_path);
    }

    Ok(())
}
