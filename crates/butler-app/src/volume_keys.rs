//! Volume-key trigger
//!
//! While registered, a volume up/down press with the device armed raises the full alarm and
//! is consumed so the OS never changes the volume for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use butler_core::prelude::*;
use butler_core::{InputDeviceChange, KeyCode, TriggerType};
use butler_platform::InputManager;

use crate::armed::ArmedStateStore;
use crate::orchestrator::EmergencyOrchestrator;

pub struct VolumeKeyInterceptor {
    input: Arc<dyn InputManager>,
    armed: Arc<ArmedStateStore>,
    orchestrator: Arc<EmergencyOrchestrator>,
    registered: AtomicBool,
}

impl std::fmt::Debug for VolumeKeyInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeKeyInterceptor")
            .field("registered", &self.is_registered())
            .finish_non_exhaustive()
    }
}

impl VolumeKeyInterceptor {
    pub fn new(
        input: Arc<dyn InputManager>,
        armed: Arc<ArmedStateStore>,
        orchestrator: Arc<EmergencyOrchestrator>,
    ) -> Self {
        Self {
            input,
            armed,
            orchestrator,
            registered: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        if self.registered.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.input.register_input_device_listener() {
            warn!("Input device listener unavailable: {}", e);
        }
        info!("Volume key interceptor started");
    }

    pub fn stop(&self) {
        if !self.registered.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.input.unregister_input_device_listener() {
            warn!("Input device listener removal failed: {}", e);
        }
        info!("Volume key interceptor stopped");
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Returns true when the key was consumed
    pub fn on_key(&self, key: KeyCode) -> bool {
        if !self.is_registered() || !key.is_volume_key() || !self.armed.get_armed() {
            return false;
        }
        warn!("{:?} pressed while armed", key);
        self.orchestrator
            .trigger_emergency_alarm(TriggerType::VolumeKeyPressed);
        true
    }

    pub fn on_input_device(&self, change: InputDeviceChange) {
        match change {
            InputDeviceChange::Added(id) => debug!("Input device added: {}", id),
            InputDeviceChange::Removed(id) => debug!("Input device removed: {}", id),
            InputDeviceChange::Changed(id) => debug!("Input device changed: {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertEffect;
    use crate::test_support::{CountingOverlay, Harness};
    use butler_platform::test_utils::{drain_outbound, event_names};
    use butler_platform::Fault;
    use std::time::Duration;

    fn setup(armed: bool) -> (Harness, Arc<AlertEffect>, VolumeKeyInterceptor) {
        let h = Harness::new(armed);
        let services = h.device.services();
        let alert = Arc::new(AlertEffect::new(&services, h.store.clone(), vec![0, 500]));
        let orchestrator = Arc::new(EmergencyOrchestrator::new(
            &services,
            h.store.clone(),
            Arc::new(CountingOverlay::default()),
            alert.clone(),
            h.bridge.clone(),
            Duration::from_secs(3),
        ));
        let keys = VolumeKeyInterceptor::new(services.input, h.store.clone(), orchestrator);
        keys.start();
        (h, alert, keys)
    }

    #[test]
    fn test_start_registers_listener() {
        let (h, _alert, keys) = setup(true);
        assert!(keys.is_registered());
        assert!(h.device.input_listener_registered());

        keys.stop();
        keys.stop();
        assert!(!keys.is_registered());
        assert!(!h.device.input_listener_registered());
    }

    #[test]
    fn test_volume_key_while_armed_triggers_alarm() {
        let (mut h, alert, keys) = setup(true);

        assert!(keys.on_key(KeyCode::VolumeDown));
        assert!(alert.is_active());

        let messages = drain_outbound(&mut h.rx);
        assert_eq!(event_names(&messages), vec!["emergencyAlarm"]);
    }

    #[test]
    fn test_other_keys_pass_through() {
        let (_h, alert, keys) = setup(true);
        assert!(!keys.on_key(KeyCode::Power));
        assert!(!keys.on_key(KeyCode::Other(66)));
        assert!(!alert.is_active());
    }

    #[test]
    fn test_disarmed_or_stopped_passes_through() {
        let (_h, alert, keys) = setup(false);
        assert!(!keys.on_key(KeyCode::VolumeUp));

        let (_h2, alert2, keys2) = setup(true);
        keys2.stop();
        assert!(!keys2.on_key(KeyCode::VolumeUp));

        assert!(!alert.is_active());
        assert!(!alert2.is_active());
    }

    #[test]
    fn test_listener_failure_still_registers() {
        let h = Harness::new(true);
        h.device.inject_fault(Fault::Input);
        let services = h.device.services();
        let alert = Arc::new(AlertEffect::new(&services, h.store.clone(), vec![0, 500]));
        let orchestrator = Arc::new(EmergencyOrchestrator::new(
            &services,
            h.store.clone(),
            Arc::new(CountingOverlay::default()),
            alert,
            h.bridge.clone(),
            Duration::from_secs(3),
        ));
        let keys = VolumeKeyInterceptor::new(services.input, h.store.clone(), orchestrator);
        keys.start();
        assert!(keys.is_registered());
        assert!(keys.on_key(KeyCode::VolumeUp));
    }
}
