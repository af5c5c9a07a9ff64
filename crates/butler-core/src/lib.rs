//! # butler-core - Core Domain Types
//!
//! Foundation crate for Flutter Butler's native protection core. Provides domain
//! types, error handling, channel events and OS signal definitions.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`TriggerType`] - Why an alarm or security event fired
//! - [`AudioStream`], [`FocusChange`], [`VolumeFlags`] - Audio vocabulary
//! - [`AccessibilityEvent`] - Window/view event seen by the power-menu blocker
//! - [`AlertSession`] - The single in-flight alarm
//!
//! ### Events (`events`)
//! - [`ChannelEvent`] - Notifications sent to the policy layer
//! - [`PlatformSignal`] - Signals delivered by the OS
//! - [`SystemBroadcast`] - Shutdown / close-system-dialogs broadcasts
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! ```rust
//! use butler_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all Flutter Butler crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use error::{Error, Result, ResultExt};
pub use events::{
    ChannelEvent, PlatformSignal, SystemBroadcast, ALERT_CHANNEL, AUDIO_VOLUME_CHANNEL,
    CLASSIC_BT_CHANNEL, POWER_OFF_CHANNEL, REASON_GLOBAL_ACTIONS, SECURE_OVERLAY_CHANNEL,
    SHUTDOWN_CHANNEL,
};
pub use types::{
    AccessibilityEvent, AccessibilityEventType, AlertSession, AudioStream, ComponentName,
    FocusChange, FocusRequestResult, ForegroundNotice, InputDeviceChange, KeyCode, ServiceKind,
    TriggerType, VolumeFlags,
};
