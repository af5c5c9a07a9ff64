//! Events crossing the core boundary
//!
//! - [`ChannelEvent`]: core → policy layer notifications
//! - [`PlatformSignal`]: OS → core signals (broadcasts, accessibility, audio, input, lifecycle)
//! - [`SystemBroadcast`]: the broadcast subset consumed by the shutdown watcher

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{
    AccessibilityEvent, FocusChange, InputDeviceChange, KeyCode, ServiceKind, TriggerType,
};

// ─────────────────────────────────────────────────────────────────
// Method channel names
// ─────────────────────────────────────────────────────────────────

pub const ALERT_CHANNEL: &str = "flutter_butler_flutter/alert_service";
pub const POWER_OFF_CHANNEL: &str = "flutter_butler_flutter/power_off";
pub const SHUTDOWN_CHANNEL: &str = "flutter_butler_flutter/shutdown";
pub const AUDIO_VOLUME_CHANNEL: &str = "flutter_butler_flutter/audio_volume";
pub const SECURE_OVERLAY_CHANNEL: &str = "flutter_butler_flutter/secure_overlay";
pub const CLASSIC_BT_CHANNEL: &str = "butler.bluetooth/classic";

/// Close-system-dialogs reason reported when the power menu opens
pub const REASON_GLOBAL_ACTIONS: &str = "globalactions";

// ─────────────────────────────────────────────────────────────────
// Core → policy layer
// ─────────────────────────────────────────────────────────────────

/// Fire-and-forget notifications for the policy layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The volume lock pushed media volume back up
    VolumeForced { from: u32, to: u32 },

    /// An emergency alarm sequence started
    EmergencyAlarm {
        trigger_type: TriggerType,
        /// Milliseconds since the Unix epoch
        timestamp: i64,
    },

    /// A security-relevant system event was observed
    SecurityEvent { trigger_type: TriggerType },
}

impl ChannelEvent {
    pub fn emergency_alarm(trigger_type: TriggerType) -> Self {
        ChannelEvent::EmergencyAlarm {
            trigger_type,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Method channel the event is published on
    pub fn channel(&self) -> &'static str {
        match self {
            ChannelEvent::VolumeForced { .. } => AUDIO_VOLUME_CHANNEL,
            ChannelEvent::EmergencyAlarm { .. } => POWER_OFF_CHANNEL,
            ChannelEvent::SecurityEvent { .. } => SHUTDOWN_CHANNEL,
        }
    }

    /// Method name invoked on the policy side
    pub fn method(&self) -> &'static str {
        match self {
            ChannelEvent::VolumeForced { .. } => "volumeForced",
            ChannelEvent::EmergencyAlarm { .. } => "emergencyAlarm",
            ChannelEvent::SecurityEvent { .. } => "onSecurityEvent",
        }
    }

    pub fn params(&self) -> Value {
        match self {
            ChannelEvent::VolumeForced { from, to } => json!({ "from": from, "to": to }),
            ChannelEvent::EmergencyAlarm {
                trigger_type,
                timestamp,
            } => json!({ "triggerType": trigger_type, "timestamp": timestamp }),
            ChannelEvent::SecurityEvent { trigger_type } => {
                json!({ "triggerType": trigger_type })
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// OS → core
// ─────────────────────────────────────────────────────────────────

/// System broadcasts the shutdown watcher listens to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemBroadcast {
    Shutdown,
    QuickbootPoweroff,
    Reboot,
    CloseSystemDialogs { reason: Option<String> },
    ScreenOff,
}

impl SystemBroadcast {
    /// Shutdown-class broadcasts: an actual attempt to power off
    pub fn is_shutdown_attempt(&self) -> bool {
        matches!(
            self,
            SystemBroadcast::Shutdown | SystemBroadcast::QuickbootPoweroff | SystemBroadcast::Reboot
        )
    }

    /// Power menu opened: close-system-dialogs with reason `globalactions`
    pub fn is_power_menu(&self) -> bool {
        matches!(
            self,
            SystemBroadcast::CloseSystemDialogs { reason: Some(r) } if r == REASON_GLOBAL_ACTIONS
        )
    }
}

/// Everything the OS can deliver to the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
pub enum PlatformSignal {
    // Broadcasts
    Shutdown,
    QuickbootPoweroff,
    Reboot,
    CloseSystemDialogs {
        #[serde(default)]
        reason: Option<String>,
    },
    ScreenOff,

    // Accessibility service
    Accessibility {
        event: AccessibilityEvent,
    },
    AccessibilityConnected,
    AccessibilityInterrupted,
    /// Explicit armed-state push on the accessibility service's narrow broadcast channel
    ArmedBroadcast {
        armed: bool,
    },

    // Audio
    VolumeSettingsChanged,
    AudioFocusChanged {
        change: FocusChange,
    },

    // Input
    KeyPressed {
        #[serde(rename = "keyCode")]
        key_code: i32,
    },
    InputDevice {
        change: InputDeviceChange,
    },

    // Overlay view
    /// Unlock pressed on the overlay with the entered PIN
    PinSubmitted {
        pin: String,
    },

    // Lifecycle
    TaskRemoved,
    ServiceDestroyed {
        service: ServiceKind,
    },
}

impl PlatformSignal {
    /// Broadcast view of this signal, if it is one
    pub fn as_broadcast(&self) -> Option<SystemBroadcast> {
        match self {
            PlatformSignal::Shutdown => Some(SystemBroadcast::Shutdown),
            PlatformSignal::QuickbootPoweroff => Some(SystemBroadcast::QuickbootPoweroff),
            PlatformSignal::Reboot => Some(SystemBroadcast::Reboot),
            PlatformSignal::CloseSystemDialogs { reason } => {
                Some(SystemBroadcast::CloseSystemDialogs {
                    reason: reason.clone(),
                })
            }
            PlatformSignal::ScreenOff => Some(SystemBroadcast::ScreenOff),
            _ => None,
        }
    }

    pub fn key_code(&self) -> Option<KeyCode> {
        match self {
            PlatformSignal::KeyPressed { key_code } => Some(KeyCode::from_android(*key_code)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccessibilityEventType;

    #[test]
    fn test_channel_event_routing() {
        let event = ChannelEvent::VolumeForced { from: 3, to: 15 };
        assert_eq!(event.channel(), AUDIO_VOLUME_CHANNEL);
        assert_eq!(event.method(), "volumeForced");
        assert_eq!(event.params(), json!({ "from": 3, "to": 15 }));

        let event = ChannelEvent::SecurityEvent {
            trigger_type: TriggerType::PowerMenu,
        };
        assert_eq!(event.channel(), SHUTDOWN_CHANNEL);
        assert_eq!(event.params()["triggerType"], "POWER_MENU");
    }

    #[test]
    fn test_emergency_alarm_has_timestamp() {
        let event = ChannelEvent::emergency_alarm(TriggerType::ActionShutdown);
        let params = event.params();
        assert_eq!(params["triggerType"], "ACTION_SHUTDOWN");
        assert!(params["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_broadcast_classification() {
        assert!(SystemBroadcast::Reboot.is_shutdown_attempt());
        assert!(!SystemBroadcast::ScreenOff.is_shutdown_attempt());
        assert!(SystemBroadcast::CloseSystemDialogs {
            reason: Some("globalactions".into())
        }
        .is_power_menu());
        assert!(!SystemBroadcast::CloseSystemDialogs {
            reason: Some("homekey".into())
        }
        .is_power_menu());
        assert!(!SystemBroadcast::CloseSystemDialogs { reason: None }.is_power_menu());
    }

    #[test]
    fn test_platform_signal_wire_format() {
        let signal: PlatformSignal =
            serde_json::from_str(r#"{"signal":"closeSystemDialogs","reason":"globalactions"}"#)
                .unwrap();
        assert!(signal.as_broadcast().unwrap().is_power_menu());

        let signal: PlatformSignal =
            serde_json::from_str(r#"{"signal":"pinSubmitted","pin":"0042"}"#).unwrap();
        assert_eq!(
            signal,
            PlatformSignal::PinSubmitted {
                pin: "0042".to_string()
            }
        );

        let signal: PlatformSignal =
            serde_json::from_str(r#"{"signal":"keyPressed","keyCode":25}"#).unwrap();
        assert_eq!(signal.key_code(), Some(KeyCode::VolumeDown));

        let signal: PlatformSignal = serde_json::from_str(
            r#"{"signal":"accessibility","event":{"eventType":"windowStateChanged","packageName":"com.android.systemui","className":"GlobalActionsDialog"}}"#,
        )
        .unwrap();
        match signal {
            PlatformSignal::Accessibility { event } => {
                assert_eq!(event.event_type, AccessibilityEventType::WindowStateChanged);
                assert_eq!(event.class(), "GlobalActionsDialog");
            }
            other => panic!("unexpected signal: {:?}", other),
        }
    }
}
