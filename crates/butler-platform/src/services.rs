//! OS service seams
//!
//! Each trait stands for one system service the protection core talks to. Calls are
//! synchronous and fallible; callers isolate failures and degrade the single effect
//! that failed. [`PlatformServices`] bundles one handle per service for composition.

use std::sync::Arc;
use std::time::Duration;

use butler_core::prelude::*;
use butler_core::{
    AccessibilityEventType, AudioStream, ComponentName, FocusRequestResult, ForegroundNotice,
    ServiceKind, VolumeFlags,
};

/// Opaque handle for a registered content observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(pub u64);

/// Opaque handle for a view attached to the window manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewHandle(pub u64);

/// Haptics
pub trait Vibrator: Send + Sync {
    /// Play a waveform; `repeat` is the index to loop from, `None` plays once
    fn vibrate_waveform(&self, pattern: &[u64], repeat: Option<usize>) -> Result<()>;

    fn cancel(&self) -> Result<()>;
}

/// Stream volumes and audio focus
pub trait AudioManager: Send + Sync {
    fn stream_volume(&self, stream: AudioStream) -> Result<u32>;

    fn stream_max_volume(&self, stream: AudioStream) -> Result<u32>;

    fn set_stream_volume(&self, stream: AudioStream, volume: u32, flags: VolumeFlags)
        -> Result<()>;

    /// Request exclusive transient focus on `stream`
    fn request_audio_focus(&self, stream: AudioStream) -> Result<FocusRequestResult>;

    fn abandon_audio_focus(&self) -> Result<()>;
}

/// Observers on system settings (volume changes show up here)
pub trait ContentResolver: Send + Sync {
    fn register_volume_observer(&self) -> Result<ObserverHandle>;

    fn unregister_observer(&self, handle: ObserverHandle) -> Result<()>;
}

/// Camera flashlight
pub trait Torch: Send + Sync {
    fn camera_ids(&self) -> Result<Vec<String>>;

    fn set_torch_mode(&self, camera_id: &str, enabled: bool) -> Result<()>;
}

/// Screen wake
pub trait PowerManager: Send + Sync {
    /// Acquire a bright wake lock that wakes the screen and expires after `timeout`
    fn acquire_wake_lock(&self, tag: &str, timeout: Duration) -> Result<()>;
}

/// Window parameters for the blocking overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySpec {
    pub title: String,
    pub subtitle: String,
    pub full_screen: bool,
    pub layout_in_screen: bool,
    pub layout_no_limits: bool,
    pub keep_screen_on: bool,
    pub show_when_locked: bool,
    pub watch_outside_touch: bool,
    /// Never set: the overlay must receive every touch
    pub not_touchable: bool,
    /// Never set: the PIN field needs focus
    pub not_focusable: bool,
    /// Root view swallows all touch events
    pub consume_all_touches: bool,
}

impl OverlaySpec {
    /// The full-screen PIN overlay that occludes the power menu
    pub fn secure_pin() -> Self {
        Self {
            title: "⚠️ SECURITY PROTECTION ACTIVE".to_string(),
            subtitle: "This phone is protected by Butler\nEnter PIN to access power options"
                .to_string(),
            full_screen: true,
            layout_in_screen: true,
            layout_no_limits: true,
            keep_screen_on: true,
            show_when_locked: true,
            watch_outside_touch: true,
            not_touchable: false,
            not_focusable: false,
            consume_all_touches: true,
        }
    }

    /// True when nothing can reach the windows beneath
    pub fn is_input_blocking(&self) -> bool {
        self.full_screen && self.consume_all_touches && !self.not_touchable
    }
}

/// Window manager overlay attachment and transient messages
pub trait WindowManager: Send + Sync {
    fn add_overlay(&self, spec: &OverlaySpec) -> Result<ViewHandle>;

    fn remove_view(&self, view: ViewHandle) -> Result<()>;

    fn show_toast(&self, text: &str);
}

/// Accessibility service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessibilityServiceInfo {
    pub event_types: Vec<AccessibilityEventType>,
    pub feedback_generic: bool,
    pub notification_timeout_ms: u64,
    pub retrieve_interactive_windows: bool,
    pub include_not_focused_windows: bool,
    pub report_view_ids: bool,
}

impl AccessibilityServiceInfo {
    pub fn power_menu_watch() -> Self {
        Self {
            event_types: vec![
                AccessibilityEventType::WindowStateChanged,
                AccessibilityEventType::WindowContentChanged,
                AccessibilityEventType::WindowsChanged,
            ],
            feedback_generic: true,
            notification_timeout_ms: 0,
            retrieve_interactive_windows: true,
            include_not_focused_windows: true,
            report_view_ids: true,
        }
    }
}

/// Global actions available to the accessibility service
pub trait AccessibilityHost: Send + Sync {
    fn set_service_info(&self, info: &AccessibilityServiceInfo) -> Result<()>;

    /// Perform the global "back" action; `Ok(false)` if the system refused it
    fn perform_back(&self) -> Result<bool>;
}

/// Foreground task inspection (OEM fallback power-menu detection)
pub trait TaskInspector: Send + Sync {
    fn top_activity(&self) -> Result<Option<ComponentName>>;
}

/// Input device listener registration
pub trait InputManager: Send + Sync {
    fn register_input_device_listener(&self) -> Result<()>;

    fn unregister_input_device_listener(&self) -> Result<()>;
}

/// Foreground promotion and self-termination of hosting services
pub trait ServiceHost: Send + Sync {
    fn start_foreground(&self, service: ServiceKind, notice: &ForegroundNotice) -> Result<()>;

    fn stop_service(&self, service: ServiceKind) -> Result<()>;
}

/// System screens the policy layer can ask to open
pub trait SystemNavigator: Send + Sync {
    fn open_accessibility_settings(&self) -> Result<()>;
}

/// Classic (non-LE) Bluetooth connectivity
pub trait ClassicBluetooth: Send + Sync {
    fn is_device_connected(&self, device_mac: &str) -> Result<bool>;
}

/// App-scoped durable key-value store
pub trait PreferenceStore: Send + Sync {
    /// Read a boolean, returning `default` when missing or unreadable
    fn get_bool(&self, key: &str, default: bool) -> bool;

    fn put_bool(&self, key: &str, value: bool) -> Result<()>;
}

/// One handle per OS service, cloned into each component at composition time
#[derive(Clone)]
pub struct PlatformServices {
    pub vibrator: Arc<dyn Vibrator>,
    pub audio: Arc<dyn AudioManager>,
    pub content: Arc<dyn ContentResolver>,
    pub torch: Arc<dyn Torch>,
    pub power: Arc<dyn PowerManager>,
    pub window: Arc<dyn WindowManager>,
    pub accessibility: Arc<dyn AccessibilityHost>,
    pub tasks: Arc<dyn TaskInspector>,
    pub input: Arc<dyn InputManager>,
    pub host: Arc<dyn ServiceHost>,
    pub navigator: Arc<dyn SystemNavigator>,
    pub bluetooth: Arc<dyn ClassicBluetooth>,
    pub prefs: Arc<dyn PreferenceStore>,
}

impl std::fmt::Debug for PlatformServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformServices").finish_non_exhaustive()
    }
}
