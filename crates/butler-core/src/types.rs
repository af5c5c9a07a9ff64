//! Domain types shared by every component

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────
// Triggers
// ─────────────────────────────────────────────────────────────────

/// What caused an emergency or security event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    /// Shutdown / reboot broadcast received while armed
    ActionShutdown,
    /// Hardware volume key pressed while armed
    VolumeKeyPressed,
    /// Alarm requested explicitly by the policy layer
    FlutterTrigger,
    /// Power menu opened (close-system-dialogs, reason=globalactions)
    PowerMenu,
    /// System shutdown observed (security event only)
    SystemShutdown,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::ActionShutdown => "ACTION_SHUTDOWN",
            TriggerType::VolumeKeyPressed => "VOLUME_KEY_PRESSED",
            TriggerType::FlutterTrigger => "FLUTTER_TRIGGER",
            TriggerType::PowerMenu => "POWER_MENU",
            TriggerType::SystemShutdown => "SYSTEM_SHUTDOWN",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Audio
// ─────────────────────────────────────────────────────────────────

/// Audio streams the core manipulates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioStream {
    Music,
    Alarm,
}

/// Side-effect flags for a volume change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeFlags {
    #[default]
    None,
    /// Change silently, without the system sound/vibration feedback
    RemoveSoundAndVibrate,
}

/// Audio focus callback values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FocusChange {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

/// Outcome of an audio focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequestResult {
    Granted,
    Delayed,
    Failed,
}

// ─────────────────────────────────────────────────────────────────
// Input
// ─────────────────────────────────────────────────────────────────

/// Hardware key codes the interceptor cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    VolumeUp,
    VolumeDown,
    Power,
    Other(i32),
}

impl KeyCode {
    /// Map an Android `KeyEvent` key code
    pub fn from_android(code: i32) -> Self {
        match code {
            24 => KeyCode::VolumeUp,
            25 => KeyCode::VolumeDown,
            26 => KeyCode::Power,
            other => KeyCode::Other(other),
        }
    }

    pub fn is_volume_key(&self) -> bool {
        matches!(self, KeyCode::VolumeUp | KeyCode::VolumeDown)
    }
}

/// Input device listener callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "deviceId", rename_all = "camelCase")]
pub enum InputDeviceChange {
    Added(i32),
    Removed(i32),
    Changed(i32),
}

// ─────────────────────────────────────────────────────────────────
// Accessibility
// ─────────────────────────────────────────────────────────────────

/// Accessibility event kinds delivered to the power-menu blocker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessibilityEventType {
    WindowStateChanged,
    WindowContentChanged,
    WindowsChanged,
    ViewFocused,
    ViewClicked,
    #[serde(other)]
    Other,
}

impl AccessibilityEventType {
    /// Event kinds that can reveal the power menu
    pub fn is_window_or_view_change(&self) -> bool {
        !matches!(self, AccessibilityEventType::Other)
    }
}

/// A single accessibility event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityEvent {
    pub event_type: AccessibilityEventType,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
}

impl AccessibilityEvent {
    pub fn new(
        event_type: AccessibilityEventType,
        package_name: impl Into<String>,
        class_name: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            package_name: Some(package_name.into()),
            class_name: Some(class_name.into()),
        }
    }

    pub fn package(&self) -> &str {
        self.package_name.as_deref().unwrap_or("")
    }

    pub fn class(&self) -> &str {
        self.class_name.as_deref().unwrap_or("")
    }
}

/// Package and class of a foreground activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Services
// ─────────────────────────────────────────────────────────────────

/// Independently lifecycled OS services hosting the components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceKind {
    Alert,
    Overlay,
    Accessibility,
}

/// Foreground notification shown while a service is promoted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundNotice {
    pub id: u32,
    pub channel_id: &'static str,
    pub title: &'static str,
    pub text: Option<&'static str>,
}

impl ForegroundNotice {
    pub const ALERT: ForegroundNotice = ForegroundNotice {
        id: 1001,
        channel_id: "alert_service_channel",
        title: "THEFT ALERT ACTIVE",
        text: Some("Anti-theft protection is running"),
    };

    pub const OVERLAY: ForegroundNotice = ForegroundNotice {
        id: 9999,
        channel_id: "secure_overlay_channel",
        title: "Security Protection Active",
        text: None,
    };
}

// ─────────────────────────────────────────────────────────────────
// Alert session
// ─────────────────────────────────────────────────────────────────

/// The single in-flight alarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSession {
    pub started_at: DateTime<Local>,
}

impl AlertSession {
    pub fn begin() -> Self {
        Self {
            started_at: Local::now(),
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        Local::now() - self.started_at
    }
}
