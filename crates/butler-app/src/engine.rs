//! Engine - composition root for the protection core
//!
//! Builds every component once from [`Settings`] and [`PlatformServices`], wires them to
//! the single arming entry point, and routes platform signals to whichever component owns
//! them. Commands from the policy layer are handled in [`crate::handler`].

use std::sync::Arc;

use tokio::task::JoinHandle;

use butler_core::prelude::*;
use butler_core::{PlatformSignal, ServiceKind};
use butler_platform::{ChannelBridge, PinVerifier, PlatformServices};

use crate::alert::AlertEffect;
use crate::armed::{ArmedStateStore, ArmingCoordinator};
use crate::classifier::{ForegroundMatcher, RuleClassifier};
use crate::config::Settings;
use crate::orchestrator::EmergencyOrchestrator;
use crate::overlay::{OverlayControl, OverlayGuard};
use crate::power_menu::PowerMenuBlocker;
use crate::protection::ProtectionController;
use crate::shutdown::ShutdownWatcher;
use crate::volume_keys::VolumeKeyInterceptor;
use crate::volume_lock::VolumeLock;

/// Protection engine.
///
/// Owns one instance of every component. `V` is the PIN verifier used by the overlay;
/// in production this is the [`ChannelBridge`] itself.
pub struct Engine<V = ChannelBridge> {
    /// Loaded settings
    pub settings: Settings,

    services: PlatformServices,
    bridge: ChannelBridge,
    coordinator: ArmingCoordinator,

    alert: Arc<AlertEffect>,
    volume_lock: Arc<VolumeLock>,
    overlay: Arc<OverlayGuard<V>>,
    orchestrator: Arc<EmergencyOrchestrator>,
    watcher: Arc<ShutdownWatcher>,
    keys: Arc<VolumeKeyInterceptor>,
    protection: Arc<ProtectionController>,
    blocker: Arc<PowerMenuBlocker>,
}

impl<V> std::fmt::Debug for Engine<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("armed", &self.coordinator.is_armed())
            .field("alert", &self.alert)
            .field("volume_lock", &self.volume_lock)
            .field("protection", &self.protection)
            .finish_non_exhaustive()
    }
}

impl Engine<ChannelBridge> {
    /// Engine whose overlay verifies PINs over the bridge
    pub fn with_bridge(
        settings: Settings,
        services: PlatformServices,
        bridge: ChannelBridge,
    ) -> Result<Self> {
        let verifier = Arc::new(bridge.clone());
        Self::new(settings, services, bridge, verifier)
    }
}

impl<V> Engine<V>
where
    V: PinVerifier + Sync + 'static,
{
    /// Compose the engine.
    ///
    /// Must run inside a tokio runtime: restoring an armed state starts the overlay
    /// detection loop.
    ///
    /// - Validates settings and builds the classifiers
    /// - Creates the armed store over the platform preference store
    /// - Creates every component
    /// - Registers subscribers with the arming coordinator
    /// - Restores the persisted armed state through the coordinator
    pub fn new(
        settings: Settings,
        services: PlatformServices,
        bridge: ChannelBridge,
        verifier: Arc<V>,
    ) -> Result<Self> {
        // 1. Validate settings and build classifiers
        settings.validate()?;
        let classifier = RuleClassifier::from_settings(&settings.classifier)
            .context("Invalid power menu classifier rules")?;
        let matcher = ForegroundMatcher::from_settings(&settings.overlay)
            .context("Invalid overlay foreground patterns")?;
        let timing = &settings.timing;

        // 2. Armed state
        let store = Arc::new(ArmedStateStore::new(
            services.prefs.clone(),
            settings.preferences.armed_key.clone(),
        ));

        // 3. Components
        let alert = Arc::new(AlertEffect::new(
            &services,
            store.clone(),
            settings.alert.vibration_pattern.clone(),
        ));
        let volume_lock = Arc::new(VolumeLock::new(
            services.audio.clone(),
            bridge.clone(),
            timing.volume_reassert_interval(),
            timing.focus_reassert_delay(),
        ));
        let overlay = Arc::new(OverlayGuard::new(
            &services,
            store.clone(),
            verifier,
            matcher,
            timing.overlay_poll_interval(),
        ));
        let overlay_control: Arc<dyn OverlayControl> = overlay.clone();
        let orchestrator = Arc::new(EmergencyOrchestrator::new(
            &services,
            store.clone(),
            overlay_control.clone(),
            alert.clone(),
            bridge.clone(),
            timing.screen_wake(),
        ));
        let watcher = Arc::new(ShutdownWatcher::new(
            store.clone(),
            orchestrator.clone(),
            overlay_control,
            bridge.clone(),
        ));
        let keys = Arc::new(VolumeKeyInterceptor::new(
            services.input.clone(),
            store.clone(),
            orchestrator.clone(),
        ));
        let protection = Arc::new(ProtectionController::new(watcher.clone(), keys.clone()));
        let blocker = Arc::new(PowerMenuBlocker::new(
            services.accessibility.clone(),
            store.clone(),
            Box::new(classifier),
            timing.block_loop_period(),
            timing.block_loop_timeout(),
        ));

        // 4. Subscribers, in disengage order
        let mut coordinator = ArmingCoordinator::new(store);
        coordinator.register(protection.clone());
        coordinator.register(blocker.clone());
        coordinator.register(overlay.clone());
        coordinator.register(orchestrator.clone());
        coordinator.register(alert.clone());
        coordinator.register(volume_lock.clone());

        let engine = Self {
            settings,
            services,
            bridge,
            coordinator,
            alert,
            volume_lock,
            overlay,
            orchestrator,
            watcher,
            keys,
            protection,
            blocker,
        };

        // 5. Restore persisted state
        engine.coordinator.restore();
        info!("Engine ready (armed={})", engine.is_armed());

        Ok(engine)
    }

    pub fn is_armed(&self) -> bool {
        self.coordinator.is_armed()
    }

    /// The single arming entry point
    pub fn set_armed(&self, armed: bool) {
        self.coordinator.set_armed(armed);
    }

    pub fn services(&self) -> &PlatformServices {
        &self.services
    }

    pub fn bridge(&self) -> &ChannelBridge {
        &self.bridge
    }

    pub fn alert(&self) -> &AlertEffect {
        &self.alert
    }

    pub fn volume_lock(&self) -> &VolumeLock {
        &self.volume_lock
    }

    pub fn overlay(&self) -> &OverlayGuard<V> {
        &self.overlay
    }

    pub fn orchestrator(&self) -> &EmergencyOrchestrator {
        &self.orchestrator
    }

    pub fn protection(&self) -> &ProtectionController {
        &self.protection
    }

    pub fn power_menu(&self) -> &PowerMenuBlocker {
        &self.blocker
    }

    /// Route one platform signal to its component.
    ///
    /// Returns true when the signal was consumed (a blocked power menu or an intercepted
    /// key).
    pub fn dispatch_signal(&self, signal: PlatformSignal) -> bool {
        trace!("Signal: {:?}", signal);

        if let Some(broadcast) = signal.as_broadcast() {
            self.watcher.on_broadcast(&broadcast);
            return false;
        }
        if let Some(key) = signal.key_code() {
            return self.keys.on_key(key);
        }

        match signal {
            PlatformSignal::Accessibility { event } => self.blocker.on_accessibility_event(&event),
            PlatformSignal::AccessibilityConnected => {
                self.blocker.on_service_connected();
                false
            }
            PlatformSignal::AccessibilityInterrupted => {
                self.blocker.on_interrupt();
                false
            }
            PlatformSignal::ArmedBroadcast { armed } => {
                self.on_armed_push(armed);
                false
            }
            PlatformSignal::VolumeSettingsChanged => {
                self.alert.on_volume_settings_changed();
                false
            }
            PlatformSignal::AudioFocusChanged { change } => {
                self.volume_lock.on_focus_change(change);
                false
            }
            PlatformSignal::InputDevice { change } => {
                self.keys.on_input_device(change);
                false
            }
            PlatformSignal::PinSubmitted { pin } => {
                self.submit_pin(&pin);
                false
            }
            PlatformSignal::TaskRemoved => {
                info!("Task removed, force-stopping alert");
                self.alert.force_stop();
                false
            }
            PlatformSignal::ServiceDestroyed { service } => {
                self.on_service_destroyed(service);
                false
            }
            // Broadcasts and key presses are routed above
            PlatformSignal::Shutdown
            | PlatformSignal::QuickbootPoweroff
            | PlatformSignal::Reboot
            | PlatformSignal::CloseSystemDialogs { .. }
            | PlatformSignal::ScreenOff
            | PlatformSignal::KeyPressed { .. } => false,
        }
    }

    /// Submit the overlay PIN; the handle resolves once verification has been applied
    pub fn submit_pin(&self, pin: &str) -> Option<JoinHandle<()>> {
        self.overlay.submit_pin(pin)
    }

    /// Explicit armed push on the blocker's narrow channel
    fn on_armed_push(&self, armed: bool) {
        if !self.blocker.accepts_armed_push() {
            debug!("Armed push ({}) dropped, blocker not connected", armed);
            return;
        }
        debug!("Armed push received by power menu blocker: {}", armed);
        if !armed {
            self.blocker.stop_blocking();
        }
    }

    fn on_service_destroyed(&self, service: ServiceKind) {
        info!("Service destroyed: {:?}", service);
        match service {
            ServiceKind::Alert => self.alert.force_stop(),
            ServiceKind::Overlay => self.overlay.teardown(),
            ServiceKind::Accessibility => self.blocker.on_destroyed(),
        }
    }

    /// Unconditional teardown; the persisted armed flag is left as it is
    pub async fn shutdown(&self) {
        info!("Engine shutting down");
        self.blocker.on_destroyed();
        self.protection.deactivate();
        self.overlay.teardown();
        self.alert.force_stop();
        self.orchestrator.stop_emergency_effects();
        self.volume_lock.unlock_volume();
        self.bridge.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use butler_core::{AudioStream, FocusChange};
    use butler_platform::test_utils::{
        drain_outbound, event_names, power_menu_event, ScriptedVerifier,
    };
    use butler_platform::{
        MemoryPreferences, OutboundMessage, PreferenceStore, SimulatedDevice, DEFAULT_MAX_VOLUME,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        device: Arc<SimulatedDevice>,
        prefs: Arc<MemoryPreferences>,
        verifier: Arc<ScriptedVerifier>,
        rx: mpsc::UnboundedReceiver<OutboundMessage>,
        engine: Engine<ScriptedVerifier>,
    }

    fn setup(armed: bool) -> Fixture {
        let prefs = Arc::new(MemoryPreferences::with_value("is_armed", armed));
        let device = SimulatedDevice::with_prefs(DEFAULT_MAX_VOLUME, prefs.clone());
        let (bridge, rx) = ChannelBridge::channel(Duration::from_secs(1));
        let verifier = Arc::new(ScriptedVerifier::new("1234"));
        let engine = Engine::new(
            Settings::default(),
            device.services(),
            bridge,
            verifier.clone(),
        )
        .unwrap();
        Fixture {
            device,
            prefs,
            verifier,
            rx,
            engine,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restores_persisted_armed_state() {
        let f = setup(true);
        assert!(f.engine.is_armed());
        assert!(f.engine.protection().is_active());
        assert!(f.engine.overlay().is_detecting());

        let f = setup(false);
        assert!(!f.engine.is_armed());
        assert!(!f.engine.protection().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_settings_rejected() {
        let device = SimulatedDevice::new();
        let (bridge, _rx) = ChannelBridge::channel(Duration::from_secs(1));
        let mut settings = Settings::default();
        settings.alert.vibration_pattern.clear();

        let result = Engine::with_bridge(settings, device.services(), bridge);
        tokio_test::assert_err!(result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_armed_persists_and_broadcasts() {
        let f = setup(false);
        f.engine.set_armed(true);

        assert!(f.prefs.get_bool("is_armed", false));
        assert!(f.engine.protection().is_active());

        f.engine.set_armed(false);
        assert!(!f.prefs.get_bool("is_armed", true));
        assert!(!f.engine.protection().is_active());
        assert!(!f.engine.overlay().is_detecting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_shutdown_scenario() {
        let mut f = setup(true);
        f.engine.dispatch_signal(PlatformSignal::Shutdown);

        assert!(f.engine.overlay().is_showing());
        assert!(f.device.is_vibrating());
        assert!(f.device.torch_on());
        assert_eq!(
            event_names(&drain_outbound(&mut f.rx)),
            vec!["onSecurityEvent", "emergencyAlarm"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_releases_everything() {
        let f = setup(true);
        f.engine.dispatch_signal(PlatformSignal::Reboot);
        f.engine.dispatch_signal(PlatformSignal::Accessibility {
            event: power_menu_event(),
        });
        assert!(f.engine.power_menu().is_blocking());

        f.engine.set_armed(false);

        assert!(!f.device.is_vibrating());
        assert!(!f.device.torch_on());
        assert_eq!(f.device.attached_views(), 0);
        assert!(!f.engine.alert().is_active());
        assert!(!f.engine.power_menu().is_blocking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_key_consumed_while_armed() {
        let f = setup(true);
        assert!(f.engine.dispatch_signal(PlatformSignal::KeyPressed { key_code: 25 }));
        assert!(f.engine.alert().is_active());
        assert!(!f.engine.dispatch_signal(PlatformSignal::KeyPressed { key_code: 66 }));

        let f = setup(false);
        assert!(!f.engine.dispatch_signal(PlatformSignal::KeyPressed { key_code: 24 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_correct_pin_dismisses_overlay() {
        let f = setup(true);
        f.engine.dispatch_signal(PlatformSignal::CloseSystemDialogs {
            reason: Some("globalactions".to_string()),
        });
        assert!(f.engine.overlay().is_showing());

        f.engine.submit_pin("1234").unwrap().await.unwrap();

        assert!(!f.engine.overlay().is_showing());
        assert!(!f.device.is_foreground(ServiceKind::Overlay));
        assert_eq!(f.verifier.asked(), vec!["1234"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_removed_force_stops_alert() {
        let f = setup(true);
        f.engine.dispatch_signal(PlatformSignal::Shutdown);
        assert!(f.engine.alert().is_active());

        f.engine.dispatch_signal(PlatformSignal::TaskRemoved);
        assert!(!f.engine.alert().is_active());
        assert!(!f.device.is_vibrating());

        // Never starts one
        f.engine.dispatch_signal(PlatformSignal::TaskRemoved);
        assert!(!f.engine.alert().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_destroyed_routes_per_kind() {
        let f = setup(true);
        f.engine.dispatch_signal(PlatformSignal::AccessibilityConnected);
        f.engine.dispatch_signal(PlatformSignal::Shutdown);

        f.engine.dispatch_signal(PlatformSignal::ServiceDestroyed {
            service: ServiceKind::Overlay,
        });
        assert!(!f.engine.overlay().is_showing());
        assert!(f.engine.alert().is_active());

        f.engine.dispatch_signal(PlatformSignal::ServiceDestroyed {
            service: ServiceKind::Alert,
        });
        assert!(!f.engine.alert().is_active());

        f.engine.dispatch_signal(PlatformSignal::ServiceDestroyed {
            service: ServiceKind::Accessibility,
        });
        assert!(!f.engine.power_menu().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_push_needs_connected_blocker() {
        let f = setup(true);
        f.engine.dispatch_signal(PlatformSignal::Accessibility {
            event: power_menu_event(),
        });
        // Not connected yet: the push is dropped
        f.engine.dispatch_signal(PlatformSignal::ArmedBroadcast { armed: false });
        assert!(f.engine.power_menu().is_blocking());

        f.engine.dispatch_signal(PlatformSignal::AccessibilityConnected);
        f.engine.dispatch_signal(PlatformSignal::Accessibility {
            event: power_menu_event(),
        });
        f.engine.dispatch_signal(PlatformSignal::ArmedBroadcast { armed: false });
        assert!(!f.engine.power_menu().is_blocking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_loss_reasserts_locked_volume() {
        let mut f = setup(true);
        assert!(f.engine.volume_lock().lock_volume());
        f.device.set_external_volume(AudioStream::Music, 2);

        f.engine.dispatch_signal(PlatformSignal::AudioFocusChanged {
            change: FocusChange::Loss,
        });
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(f.device.volume(AudioStream::Music), DEFAULT_MAX_VOLUME);
        assert!(event_names(&drain_outbound(&mut f.rx)).contains(&"volumeForced".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_keeps_persisted_flag() {
        let f = setup(true);
        f.engine.dispatch_signal(PlatformSignal::Shutdown);
        f.engine.volume_lock().lock_volume();

        f.engine.shutdown().await;

        assert!(f.prefs.get_bool("is_armed", false));
        assert!(!f.device.is_vibrating());
        assert!(!f.device.torch_on());
        assert_eq!(f.device.attached_views(), 0);
        assert!(!f.engine.volume_lock().is_locked());
        assert!(!f.engine.protection().is_active());
    }
}
