//! Shared fixtures for component unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use butler_platform::{
    ChannelBridge, MemoryPreferences, OutboundMessage, SimulatedDevice, DEFAULT_MAX_VOLUME,
};

use crate::armed::{ArmedStateStore, ArmingCoordinator};
use crate::overlay::OverlayControl;

/// Device, armed store and bridge wired the same way the engine wires them
pub struct Harness {
    pub device: Arc<SimulatedDevice>,
    pub prefs: Arc<MemoryPreferences>,
    pub store: Arc<ArmedStateStore>,
    pub bridge: ChannelBridge,
    pub rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Harness {
    pub fn new(armed: bool) -> Self {
        let prefs = Arc::new(MemoryPreferences::with_value("is_armed", armed));
        let device = SimulatedDevice::with_prefs(DEFAULT_MAX_VOLUME, prefs.clone());
        let store = Arc::new(ArmedStateStore::new(prefs.clone(), "is_armed"));
        let (bridge, rx) = ChannelBridge::channel(Duration::from_secs(1));
        Self {
            device,
            prefs,
            store,
            bridge,
            rx,
        }
    }

    /// Flip the stored value without notifying any component
    pub fn set_armed_silently(&self, armed: bool) {
        ArmingCoordinator::new(self.store.clone()).set_armed(armed);
    }
}

/// Overlay stand-in that only counts calls
#[derive(Debug, Default)]
pub struct CountingOverlay {
    pub shown: AtomicUsize,
    pub hidden: AtomicUsize,
}

impl CountingOverlay {
    pub fn shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }
}

impl OverlayControl for CountingOverlay {
    fn show_overlay(&self) {
        self.shown.fetch_add(1, Ordering::SeqCst);
    }

    fn hide_overlay(&self) {
        self.hidden.fetch_add(1, Ordering::SeqCst);
    }

    fn is_showing(&self) -> bool {
        self.shown.load(Ordering::SeqCst) > self.hidden.load(Ordering::SeqCst)
    }
}
