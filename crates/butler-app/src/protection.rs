//! Protection lifecycle
//!
//! Protection is "active" while the shutdown watcher and the volume-key interceptor are
//! both registered. Arming activates them, disarming deactivates them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use butler_core::prelude::*;

use crate::armed::ArmedSubscriber;
use crate::shutdown::ShutdownWatcher;
use crate::volume_keys::VolumeKeyInterceptor;

#[derive(Debug)]
pub struct ProtectionController {
    watcher: Arc<ShutdownWatcher>,
    keys: Arc<VolumeKeyInterceptor>,
    active: AtomicBool,
}

impl ProtectionController {
    pub fn new(watcher: Arc<ShutdownWatcher>, keys: Arc<VolumeKeyInterceptor>) -> Self {
        Self {
            watcher,
            keys,
            active: AtomicBool::new(false),
        }
    }

    pub fn activate(&self) {
        if self.active.swap(true, Ordering::SeqCst) {
            debug!("Protection already active");
            return;
        }
        self.watcher.register();
        self.keys.start();
        info!("Protection activated");
    }

    pub fn deactivate(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.watcher.unregister();
        self.keys.stop();
        info!("Protection deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
            && self.watcher.is_registered()
            && self.keys.is_registered()
    }
}

impl ArmedSubscriber for ProtectionController {
    fn name(&self) -> &str {
        "protection"
    }

    fn on_armed(&self) {
        self.activate();
    }

    fn on_disarmed(&self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertEffect;
    use crate::orchestrator::EmergencyOrchestrator;
    use crate::test_support::{CountingOverlay, Harness};
    use std::time::Duration;

    fn setup() -> (Harness, ProtectionController) {
        let h = Harness::new(true);
        let services = h.device.services();
        let overlay = Arc::new(CountingOverlay::default());
        let alert = Arc::new(AlertEffect::new(&services, h.store.clone(), vec![0, 500]));
        let orchestrator = Arc::new(EmergencyOrchestrator::new(
            &services,
            h.store.clone(),
            overlay.clone(),
            alert,
            h.bridge.clone(),
            Duration::from_secs(3),
        ));
        let watcher = Arc::new(ShutdownWatcher::new(
            h.store.clone(),
            orchestrator.clone(),
            overlay,
            h.bridge.clone(),
        ));
        let keys = Arc::new(VolumeKeyInterceptor::new(
            services.input,
            h.store.clone(),
            orchestrator,
        ));
        (h, ProtectionController::new(watcher, keys))
    }

    #[test]
    fn test_inactive_until_armed() {
        let (_h, protection) = setup();
        assert!(!protection.is_active());
    }

    #[test]
    fn test_arm_disarm_cycle() {
        let (h, protection) = setup();

        protection.on_armed();
        protection.on_armed();
        assert!(protection.is_active());
        assert!(h.device.input_listener_registered());

        protection.on_disarmed();
        protection.on_disarmed();
        assert!(!protection.is_active());
        assert!(!h.device.input_listener_registered());
    }
}
