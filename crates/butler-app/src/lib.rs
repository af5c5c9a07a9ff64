//! butler-app - Protection components and orchestration for Flutter Butler
//!
//! Each component owns its own OS resources and is told about arming through the
//! [`ArmingCoordinator`]. The [`Engine`] composes them once at startup, routes platform
//! signals, and [`handler`] maps policy-layer method calls onto it.

pub mod alert;
pub mod armed;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod handler;
pub mod orchestrator;
pub mod overlay;
pub mod power_menu;
pub mod protection;
pub mod shutdown;
pub mod volume_keys;
pub mod volume_lock;

#[cfg(test)]
mod test_support;

// Re-export primary types
pub use alert::AlertEffect;
pub use armed::{ArmedStateStore, ArmedSubscriber, ArmingCoordinator};
pub use classifier::{ForegroundMatcher, MenuClassifier, RuleClassifier};
pub use config::Settings;
pub use engine::Engine;
pub use handler::{handle_call, handle_command};
pub use orchestrator::EmergencyOrchestrator;
pub use overlay::{OverlayControl, OverlayGuard};
pub use power_menu::PowerMenuBlocker;
pub use protection::ProtectionController;
pub use shutdown::ShutdownWatcher;
pub use volume_keys::VolumeKeyInterceptor;
pub use volume_lock::VolumeLock;
