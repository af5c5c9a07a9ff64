//! Configuration types for Flutter Butler
//!
//! Defines:
//! - `Settings` - Global settings loaded from `config.toml`
//! - One section struct per table: timing, alert, classifier, overlay, preferences

use std::time::Duration;

use serde::{Deserialize, Serialize};

use butler_core::prelude::*;

/// Global settings (config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub timing: TimingSettings,

    #[serde(default)]
    pub alert: AlertSettings,

    #[serde(default)]
    pub classifier: ClassifierSettings,

    #[serde(default)]
    pub overlay: OverlaySettings,

    #[serde(default)]
    pub preferences: PreferenceSettings,
}

impl Settings {
    /// Reject settings the components cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.alert.vibration_pattern.is_empty() {
            return Err(Error::config_invalid("alert.vibration_pattern must not be empty"));
        }
        if self.alert.vibration_pattern.iter().all(|ms| *ms == 0) {
            return Err(Error::config_invalid(
                "alert.vibration_pattern must contain a non-zero segment",
            ));
        }
        if self.timing.block_loop_timeout() < self.timing.block_loop_period() {
            return Err(Error::config_invalid(
                "timing.block_loop_timeout_ms is shorter than one block loop period",
            ));
        }
        if self.preferences.armed_key.trim().is_empty() {
            return Err(Error::config_invalid("preferences.armed_key must not be empty"));
        }
        if self.classifier.power_menu_classes.is_empty() {
            return Err(Error::config_invalid(
                "classifier.power_menu_classes must name at least one pattern",
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Timing
// ─────────────────────────────────────────────────────────────────

pub const MIN_REASSERT_INTERVAL_MS: u64 = 50;
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MIN_BLOCK_PERIOD_MS: u64 = 10;

/// Loop intervals and timeouts
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TimingSettings {
    #[serde(default = "default_volume_reassert_interval_ms")]
    pub volume_reassert_interval_ms: u64,

    #[serde(default = "default_focus_reassert_delay_ms")]
    pub focus_reassert_delay_ms: u64,

    #[serde(default = "default_overlay_poll_interval_ms")]
    pub overlay_poll_interval_ms: u64,

    #[serde(default = "default_block_loop_period_ms")]
    pub block_loop_period_ms: u64,

    #[serde(default = "default_block_loop_timeout_ms")]
    pub block_loop_timeout_ms: u64,

    #[serde(default = "default_screen_wake_ms")]
    pub screen_wake_ms: u64,

    #[serde(default = "default_pin_verify_timeout_ms")]
    pub pin_verify_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            volume_reassert_interval_ms: default_volume_reassert_interval_ms(),
            focus_reassert_delay_ms: default_focus_reassert_delay_ms(),
            overlay_poll_interval_ms: default_overlay_poll_interval_ms(),
            block_loop_period_ms: default_block_loop_period_ms(),
            block_loop_timeout_ms: default_block_loop_timeout_ms(),
            screen_wake_ms: default_screen_wake_ms(),
            pin_verify_timeout_ms: default_pin_verify_timeout_ms(),
        }
    }
}

impl TimingSettings {
    pub fn volume_reassert_interval(&self) -> Duration {
        Duration::from_millis(self.volume_reassert_interval_ms.max(MIN_REASSERT_INTERVAL_MS))
    }

    pub fn focus_reassert_delay(&self) -> Duration {
        Duration::from_millis(self.focus_reassert_delay_ms)
    }

    pub fn overlay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.overlay_poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn block_loop_period(&self) -> Duration {
        Duration::from_millis(self.block_loop_period_ms.max(MIN_BLOCK_PERIOD_MS))
    }

    pub fn block_loop_timeout(&self) -> Duration {
        Duration::from_millis(self.block_loop_timeout_ms)
    }

    pub fn screen_wake(&self) -> Duration {
        Duration::from_millis(self.screen_wake_ms)
    }

    pub fn pin_verify_timeout(&self) -> Duration {
        Duration::from_millis(self.pin_verify_timeout_ms)
    }
}

fn default_volume_reassert_interval_ms() -> u64 {
    300
}

fn default_focus_reassert_delay_ms() -> u64 {
    100
}

fn default_overlay_poll_interval_ms() -> u64 {
    500
}

fn default_block_loop_period_ms() -> u64 {
    50
}

fn default_block_loop_timeout_ms() -> u64 {
    10_000
}

fn default_screen_wake_ms() -> u64 {
    3_000
}

fn default_pin_verify_timeout_ms() -> u64 {
    30_000
}

// ─────────────────────────────────────────────────────────────────
// Alert
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AlertSettings {
    /// Off/on segments in milliseconds, repeated from index 0
    #[serde(default = "default_vibration_pattern")]
    pub vibration_pattern: Vec<u64>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            vibration_pattern: default_vibration_pattern(),
        }
    }
}

fn default_vibration_pattern() -> Vec<u64> {
    vec![0, 800, 400, 800]
}

// ─────────────────────────────────────────────────────────────────
// Power-menu classification
// ─────────────────────────────────────────────────────────────────

/// Rules for recognizing the power menu in accessibility events
///
/// All matching is case-insensitive substring matching, except
/// `exact_system_packages` which must match the whole package name.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClassifierSettings {
    #[serde(default = "default_system_packages")]
    pub system_packages: Vec<String>,

    #[serde(default = "default_exact_system_packages")]
    pub exact_system_packages: Vec<String>,

    #[serde(default = "default_power_menu_classes")]
    pub power_menu_classes: Vec<String>,

    /// Any class containing this is a power-menu candidate when the package is a system one
    #[serde(default = "default_system_dialog_class")]
    pub system_dialog_class: String,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            system_packages: default_system_packages(),
            exact_system_packages: default_exact_system_packages(),
            power_menu_classes: default_power_menu_classes(),
            system_dialog_class: default_system_dialog_class(),
        }
    }
}

fn default_system_packages() -> Vec<String> {
    vec!["systemui".to_string(), "power".to_string()]
}

fn default_exact_system_packages() -> Vec<String> {
    vec!["android".to_string()]
}

fn default_power_menu_classes() -> Vec<String> {
    ["GlobalActions", "PowerOptions", "Shutdown", "PowerUI", "SystemUI"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_system_dialog_class() -> String {
    "Dialog".to_string()
}

// ─────────────────────────────────────────────────────────────────
// Overlay detection (OEM fallback)
// ─────────────────────────────────────────────────────────────────

/// Foreground-activity indicators that reveal power-menu UI
///
/// A hit on either list is enough.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OverlaySettings {
    #[serde(default = "default_detection_packages")]
    pub detection_packages: Vec<String>,

    #[serde(default = "default_detection_classes")]
    pub detection_classes: Vec<String>,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            detection_packages: default_detection_packages(),
            detection_classes: default_detection_classes(),
        }
    }
}

fn default_detection_packages() -> Vec<String> {
    vec!["systemui".to_string()]
}

fn default_detection_classes() -> Vec<String> {
    vec!["GlobalActions".to_string(), "PowerUI".to_string()]
}

// ─────────────────────────────────────────────────────────────────
// Preference store
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PreferenceSettings {
    /// File name under the config dir when a file-backed store is used without an explicit path
    #[serde(default = "default_prefs_file_name")]
    pub file_name: String,

    #[serde(default = "default_armed_key")]
    pub armed_key: String,
}

impl Default for PreferenceSettings {
    fn default() -> Self {
        Self {
            file_name: default_prefs_file_name(),
            armed_key: default_armed_key(),
        }
    }
}

fn default_prefs_file_name() -> String {
    "butler_prefs.json".to_string()
}

fn default_armed_key() -> String {
    "is_armed".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let timing = TimingSettings::default();
        assert_eq!(timing.volume_reassert_interval(), Duration::from_millis(300));
        assert_eq!(timing.focus_reassert_delay(), Duration::from_millis(100));
        assert_eq!(timing.overlay_poll_interval(), Duration::from_millis(500));
        assert_eq!(timing.block_loop_period(), Duration::from_millis(50));
        assert_eq!(timing.block_loop_timeout(), Duration::from_secs(10));
        assert_eq!(timing.screen_wake(), Duration::from_secs(3));
    }

    #[test]
    fn test_intervals_clamped() {
        let timing = TimingSettings {
            volume_reassert_interval_ms: 1,
            overlay_poll_interval_ms: 0,
            block_loop_period_ms: 2,
            ..Default::default()
        };
        assert_eq!(timing.volume_reassert_interval(), Duration::from_millis(50));
        assert_eq!(timing.overlay_poll_interval(), Duration::from_millis(100));
        assert_eq!(timing.block_loop_period(), Duration::from_millis(10));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[timing]
block_loop_timeout_ms = 2000

[classifier]
power_menu_classes = ["GlobalActions"]
"#,
        )
        .unwrap();
        assert_eq!(settings.timing.block_loop_timeout_ms, 2000);
        assert_eq!(settings.timing.block_loop_period_ms, 50);
        assert_eq!(settings.classifier.power_menu_classes, vec!["GlobalActions"]);
        assert_eq!(settings.classifier.system_dialog_class, "Dialog");
        assert_eq!(settings.alert.vibration_pattern, vec![0, 800, 400, 800]);
        assert_eq!(settings.preferences.armed_key, "is_armed");
    }

    #[test]
    fn test_validate() {
        assert!(Settings::default().validate().is_ok());

        let mut settings = Settings::default();
        settings.alert.vibration_pattern = vec![0, 0];
        assert!(settings.validate().unwrap_err().is_fatal());

        let mut settings = Settings::default();
        settings.timing.block_loop_timeout_ms = 5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.preferences.armed_key = " ".to_string();
        assert!(settings.validate().is_err());
    }
}
