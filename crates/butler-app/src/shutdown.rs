//! Passive shutdown / power-menu broadcast listener
//!
//! Shutdown-class broadcasts while armed raise the full alarm. The power menu opening
//! (close-system-dialogs with reason `globalactions`) only raises the overlay. Screen-off
//! is never a trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use butler_core::prelude::*;
use butler_core::{ChannelEvent, SystemBroadcast, TriggerType};
use butler_platform::ChannelBridge;

use crate::armed::ArmedStateStore;
use crate::orchestrator::EmergencyOrchestrator;
use crate::overlay::OverlayControl;

#[derive(Debug)]
pub struct ShutdownWatcher {
    armed: Arc<ArmedStateStore>,
    orchestrator: Arc<EmergencyOrchestrator>,
    overlay: Arc<dyn OverlayControl>,
    bridge: ChannelBridge,
    registered: AtomicBool,
}

impl ShutdownWatcher {
    pub fn new(
        armed: Arc<ArmedStateStore>,
        orchestrator: Arc<EmergencyOrchestrator>,
        overlay: Arc<dyn OverlayControl>,
        bridge: ChannelBridge,
    ) -> Self {
        Self {
            armed,
            orchestrator,
            overlay,
            bridge,
            registered: AtomicBool::new(false),
        }
    }

    pub fn register(&self) {
        if !self.registered.swap(true, Ordering::SeqCst) {
            info!("Shutdown watcher registered");
        }
    }

    pub fn unregister(&self) {
        if self.registered.swap(false, Ordering::SeqCst) {
            info!("Shutdown watcher unregistered");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn on_broadcast(&self, broadcast: &SystemBroadcast) {
        if !self.is_registered() {
            trace!("Broadcast {:?} ignored, watcher not registered", broadcast);
            return;
        }
        let armed = self.armed.get_armed();
        debug!("Broadcast {:?} (armed={})", broadcast, armed);

        if broadcast.is_shutdown_attempt() {
            if !armed {
                return;
            }
            warn!("Shutdown attempt while armed: {:?}", broadcast);
            self.bridge.emit(&ChannelEvent::SecurityEvent {
                trigger_type: TriggerType::SystemShutdown,
            });
            self.orchestrator
                .trigger_emergency_alarm(TriggerType::ActionShutdown);
        } else if broadcast.is_power_menu() {
            if !armed {
                return;
            }
            warn!("Power menu opened while armed, showing overlay");
            self.overlay.show_overlay();
            self.bridge.emit(&ChannelEvent::SecurityEvent {
                trigger_type: TriggerType::PowerMenu,
            });
        }
    }
}
