//! Emergency orchestration
//!
//! Fans a single trigger out to every alarm channel. Each step is isolated: a missing
//! flashlight or a refused wake lock never stops the rest of the sequence.

use std::sync::Arc;
use std::time::Duration;

use butler_core::prelude::*;
use butler_core::{ChannelEvent, TriggerType};
use butler_platform::{ChannelBridge, PlatformServices, PowerManager, Torch};

use crate::alert::AlertEffect;
use crate::armed::{ArmedStateStore, ArmedSubscriber};
use crate::overlay::OverlayControl;

pub const WAKE_LOCK_TAG: &str = "Butler:EmergencyWakeLock";

pub struct EmergencyOrchestrator {
    armed: Arc<ArmedStateStore>,
    overlay: Arc<dyn OverlayControl>,
    alert: Arc<AlertEffect>,
    torch: Arc<dyn Torch>,
    power: Arc<dyn PowerManager>,
    bridge: ChannelBridge,
    screen_wake: Duration,
}

impl std::fmt::Debug for EmergencyOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyOrchestrator")
            .field("screen_wake", &self.screen_wake)
            .finish_non_exhaustive()
    }
}

impl EmergencyOrchestrator {
    pub fn new(
        services: &PlatformServices,
        armed: Arc<ArmedStateStore>,
        overlay: Arc<dyn OverlayControl>,
        alert: Arc<AlertEffect>,
        bridge: ChannelBridge,
        screen_wake: Duration,
    ) -> Self {
        Self {
            armed,
            overlay,
            alert,
            torch: services.torch.clone(),
            power: services.power.clone(),
            bridge,
            screen_wake,
        }
    }

    /// Raise the full alarm; returns false (and does nothing) while disarmed
    pub fn trigger_emergency_alarm(&self, trigger: TriggerType) -> bool {
        if !self.armed.get_armed() {
            warn!("Emergency alarm rejected, not armed (trigger: {})", trigger);
            return false;
        }
        error!("EMERGENCY ALARM TRIGGERED: {}", trigger);

        self.overlay.show_overlay();
        self.bridge.emit(&ChannelEvent::emergency_alarm(trigger));
        self.alert.start_alert();
        self.set_flashlight(true);
        self.wake_screen();
        true
    }

    /// Stop alert and flashlight; the overlay only goes away once disarmed
    pub fn stop_emergency_effects(&self) {
        self.alert.stop_alert();
        self.set_flashlight(false);
        if !self.armed.get_armed() {
            self.overlay.hide_overlay();
        }
    }

    fn set_flashlight(&self, enabled: bool) {
        let camera = match self.torch.camera_ids() {
            Ok(ids) => ids.into_iter().next(),
            Err(e) => {
                error!("Flashlight unavailable: {}", e);
                return;
            }
        };
        let Some(camera) = camera else {
            debug!("No camera with a flashlight");
            return;
        };
        if let Err(e) = self.torch.set_torch_mode(&camera, enabled) {
            error!("Flashlight {} failed: {}", if enabled { "on" } else { "off" }, e);
        }
    }

    fn wake_screen(&self) {
        if let Err(e) = self.power.acquire_wake_lock(WAKE_LOCK_TAG, self.screen_wake) {
            error!("Screen wake failed: {}", e);
        }
    }
}

impl ArmedSubscriber for EmergencyOrchestrator {
    fn name(&self) -> &str {
        "emergency"
    }

    fn on_disarmed(&self) {
        self.stop_emergency_effects();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingOverlay, Harness};
    use butler_platform::test_utils::{drain_outbound, event_names};
    use butler_platform::OutboundMessage;
    use mockall::mock;

    mock! {
        Flashlight {}
        impl Torch for Flashlight {
            fn camera_ids(&self) -> Result<Vec<String>>;
            fn set_torch_mode(&self, camera_id: &str, enabled: bool) -> Result<()>;
        }
    }

    struct Fixture {
        h: Harness,
        overlay: Arc<CountingOverlay>,
        alert: Arc<AlertEffect>,
        orchestrator: EmergencyOrchestrator,
    }

    fn setup(armed: bool, torch: Option<Arc<dyn Torch>>) -> Fixture {
        let h = Harness::new(armed);
        let mut services = h.device.services();
        if let Some(torch) = torch {
            services.torch = torch;
        }
        let overlay = Arc::new(CountingOverlay::default());
        let alert = Arc::new(AlertEffect::new(&services, h.store.clone(), vec![0, 800, 400, 800]));
        let orchestrator = EmergencyOrchestrator::new(
            &services,
            h.store.clone(),
            overlay.clone(),
            alert.clone(),
            h.bridge.clone(),
            Duration::from_secs(3),
        );
        Fixture {
            h,
            overlay,
            alert,
            orchestrator,
        }
    }

    #[test]
    fn test_trigger_fans_out() {
        let mut f = setup(true, None);

        assert!(f.orchestrator.trigger_emergency_alarm(TriggerType::ActionShutdown));

        assert!(f.overlay.is_showing());
        assert!(f.alert.is_active());
        assert!(f.h.device.is_vibrating());
        assert!(f.h.device.torch_on());
        let locks = f.h.device.wake_locks();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].tag, WAKE_LOCK_TAG);
        assert_eq!(locks[0].timeout, Duration::from_secs(3));

        let messages = drain_outbound(&mut f.h.rx);
        assert_eq!(event_names(&messages), vec!["emergencyAlarm"]);
        match &messages[0] {
            OutboundMessage::Event { params, .. } => {
                assert_eq!(params["triggerType"], "ACTION_SHUTDOWN");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_trigger_rejected_while_disarmed() {
        let mut f = setup(false, None);

        assert!(!f.orchestrator.trigger_emergency_alarm(TriggerType::FlutterTrigger));

        assert_eq!(f.overlay.shown(), 0);
        assert!(!f.h.device.is_vibrating());
        assert!(!f.h.device.torch_on());
        assert!(f.h.device.wake_locks().is_empty());
        assert!(drain_outbound(&mut f.h.rx).is_empty());
    }

    #[test]
    fn test_flashlight_failure_is_isolated() {
        let mut torch = MockFlashlight::new();
        torch
            .expect_camera_ids()
            .returning(|| Ok(vec!["0".to_string()]));
        torch
            .expect_set_torch_mode()
            .returning(|_, _| Err(Error::platform("torch busy")));

        let f = setup(true, Some(Arc::new(torch)));
        assert!(f.orchestrator.trigger_emergency_alarm(TriggerType::VolumeKeyPressed));

        assert!(f.alert.is_active());
        assert_eq!(f.h.device.wake_locks().len(), 1);
    }

    #[test]
    fn test_no_camera_skips_flashlight() {
        let mut torch = MockFlashlight::new();
        torch.expect_camera_ids().returning(|| Ok(Vec::new()));
        torch.expect_set_torch_mode().never();

        let f = setup(true, Some(Arc::new(torch)));
        assert!(f.orchestrator.trigger_emergency_alarm(TriggerType::FlutterTrigger));
        assert!(f.alert.is_active());
    }

    #[test]
    fn test_stop_keeps_overlay_while_armed() {
        let f = setup(true, None);
        f.orchestrator.trigger_emergency_alarm(TriggerType::ActionShutdown);

        f.orchestrator.stop_emergency_effects();

        assert!(!f.alert.is_active());
        assert!(!f.h.device.torch_on());
        assert!(f.overlay.is_showing());
    }

    #[test]
    fn test_stop_hides_overlay_once_disarmed() {
        let f = setup(true, None);
        f.orchestrator.trigger_emergency_alarm(TriggerType::ActionShutdown);

        f.h.set_armed_silently(false);
        f.orchestrator.on_disarmed();

        assert!(!f.overlay.is_showing());
        assert!(!f.h.device.is_vibrating());
        assert!(!f.h.device.torch_on());
    }
}
