//! Accessibility-driven power-menu blocker
//!
//! Each window or view event is checked against the persisted armed flag and the
//! [`MenuClassifier`]. A hit dismisses the menu with one "back" right away and then keeps
//! pressing "back" on a short period until a deadline. Every new hit pushes the deadline
//! out again; nothing keeps the loop alive past it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use butler_core::prelude::*;
use butler_core::AccessibilityEvent;
use butler_platform::{AccessibilityHost, AccessibilityServiceInfo};

use crate::armed::{ArmedStateStore, ArmedSubscriber};
use crate::classifier::MenuClassifier;

#[derive(Debug, Default)]
struct BlockerState {
    connected: bool,
    /// Narrow channel for explicit armed pushes
    receiver_registered: bool,
    block_task: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
}

struct Shared {
    accessibility: Arc<dyn AccessibilityHost>,
    armed: Arc<ArmedStateStore>,
    state: Mutex<BlockerState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, BlockerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deadline not reached and still armed in persisted storage
    fn should_keep_blocking(&self) -> bool {
        let within_deadline = self
            .state()
            .deadline
            .is_some_and(|deadline| Instant::now() < deadline);
        within_deadline && self.armed.read_persisted()
    }

    fn press_back(&self) {
        match self.accessibility.perform_back() {
            Ok(true) => trace!("Back performed"),
            Ok(false) => debug!("Back action refused"),
            Err(e) => error!("Back action failed: {}", e),
        }
    }
}

pub struct PowerMenuBlocker {
    shared: Arc<Shared>,
    classifier: Box<dyn MenuClassifier>,
    period: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for PowerMenuBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerMenuBlocker")
            .field("classifier", &self.classifier)
            .field("period", &self.period)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PowerMenuBlocker {
    pub fn new(
        accessibility: Arc<dyn AccessibilityHost>,
        armed: Arc<ArmedStateStore>,
        classifier: Box<dyn MenuClassifier>,
        period: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                accessibility,
                armed,
                state: Mutex::new(BlockerState::default()),
            }),
            classifier,
            period,
            timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state().connected
    }

    /// Whether explicit armed pushes can currently reach this service
    pub fn accepts_armed_push(&self) -> bool {
        let state = self.shared.state();
        state.connected && state.receiver_registered
    }

    pub fn is_blocking(&self) -> bool {
        self.shared
            .state()
            .block_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Service (re)connected: configure event delivery and reset state
    pub fn on_service_connected(&self) {
        if let Err(e) = self
            .shared
            .accessibility
            .set_service_info(&AccessibilityServiceInfo::power_menu_watch())
        {
            error!("Could not configure accessibility service: {}", e);
        }
        self.stop_blocking();

        let mut state = self.shared.state();
        state.connected = true;
        state.receiver_registered = true;
        info!(
            "Power menu blocker connected (armed={})",
            self.shared.armed.read_persisted()
        );
    }

    pub fn on_interrupt(&self) {
        debug!("Power menu blocker interrupted");
        self.stop_blocking();
    }

    /// Service destroyed: stop everything and drop the armed receiver
    pub fn on_destroyed(&self) {
        self.stop_blocking();
        let mut state = self.shared.state();
        state.connected = false;
        state.receiver_registered = false;
        info!("Power menu blocker disconnected");
    }

    /// Returns true when the event was recognized and blocked
    pub fn on_accessibility_event(&self, event: &AccessibilityEvent) -> bool {
        if !event.event_type.is_window_or_view_change() {
            return false;
        }
        // Persisted storage, not the cache: this service may outlive the process that armed it
        if !self.shared.armed.read_persisted() {
            return false;
        }
        if !self
            .classifier
            .is_power_menu(event.package(), event.class())
        {
            return false;
        }

        warn!(
            "Power menu detected ({} / {}), blocking",
            event.package(),
            event.class()
        );
        self.shared.press_back();
        self.start_block_loop();
        true
    }

    fn start_block_loop(&self) {
        let mut state = self.shared.state();
        if let Some(task) = state.block_task.take() {
            task.abort();
        }
        state.deadline = Some(Instant::now() + self.timeout);

        let shared = self.shared.clone();
        let period = self.period;
        state.block_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !shared.should_keep_blocking() {
                    break;
                }
                shared.press_back();
            }
            debug!("Power menu block loop ended");
        }));
    }

    pub fn stop_blocking(&self) {
        let mut state = self.shared.state();
        state.deadline = None;
        if let Some(task) = state.block_task.take() {
            task.abort();
            debug!("Power menu block loop stopped");
        }
    }
}

impl ArmedSubscriber for PowerMenuBlocker {
    fn name(&self) -> &str {
        "power-menu"
    }

    fn on_disarmed(&self) {
        self.stop_blocking();
    }
}
