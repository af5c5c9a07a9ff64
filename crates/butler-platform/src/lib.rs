//! # butler-platform - OS Seams and Channel Plumbing
//!
//! Everything the protection core needs from the outside world:
//!
//! - [`services`] - one trait per OS service, bundled as [`PlatformServices`]
//! - [`sim`] - [`SimulatedDevice`], an in-process implementation of every service
//! - [`prefs`] - in-memory and JSON-file preference stores
//! - [`protocol`] - NDJSON message shapes exchanged with the host
//! - [`commands`] - typed commands, request tracking and the [`ChannelBridge`]

pub mod commands;
pub mod prefs;
pub mod protocol;
pub mod services;
pub mod sim;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use commands::{
    ChannelBridge, Command, LocalPinVerifier, PinVerifier, RequestResponse, RequestTracker,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use prefs::{FilePreferences, MemoryPreferences};
pub use protocol::{
    parse_inbound, InboundMessage, MethodCall, OutboundMessage, SimAction, WireError,
};
pub use services::{
    AccessibilityHost, AccessibilityServiceInfo, AudioManager, ClassicBluetooth, ContentResolver,
    InputManager, ObserverHandle, OverlaySpec, PlatformServices, PowerManager, PreferenceStore,
    ServiceHost, SystemNavigator, TaskInspector, Torch, ViewHandle, Vibrator, WindowManager,
};
pub use sim::{Fault, SimulatedDevice, WakeLockRecord, DEFAULT_MAX_VOLUME};
