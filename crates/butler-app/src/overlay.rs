//! Full-screen PIN overlay
//!
//! `Hidden -> Showing -> Hidden`. While showing, exactly one view is attached. The overlay
//! leaves only through a confirmed PIN round trip or an explicit disarm. While armed and
//! hidden, a detection loop polls the foreground activity as a fallback for devices whose
//! power menu never produces a usable accessibility event or broadcast.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

use butler_core::prelude::*;
use butler_core::{ForegroundNotice, ServiceKind};
use butler_platform::{
    OverlaySpec, PinVerifier, PlatformServices, ServiceHost, TaskInspector, ViewHandle,
    WindowManager,
};

use crate::armed::{ArmedStateStore, ArmedSubscriber};
use crate::classifier::ForegroundMatcher;

pub const TOAST_EMPTY_PIN: &str = "Please enter PIN";
pub const TOAST_INVALID_PIN: &str = "Invalid PIN";

/// What other components may do with the overlay
pub trait OverlayControl: Send + Sync + fmt::Debug {
    fn show_overlay(&self);

    fn hide_overlay(&self);

    fn is_showing(&self) -> bool;
}

#[derive(Debug, Default)]
struct OverlayState {
    view: Option<ViewHandle>,
    /// Overlay service promoted to foreground
    hosted: bool,
    pin_input: String,
    verifying: bool,
    detection_task: Option<JoinHandle<()>>,
}

struct Shared<V> {
    window: Arc<dyn WindowManager>,
    tasks: Arc<dyn TaskInspector>,
    host: Arc<dyn ServiceHost>,
    armed: Arc<ArmedStateStore>,
    verifier: Arc<V>,
    matcher: ForegroundMatcher,
    poll_interval: Duration,
    state: Mutex<OverlayState>,
}

impl<V> Shared<V> {
    fn state(&self) -> MutexGuard<'_, OverlayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn show(&self) {
        let mut state = self.state();
        if let Some(task) = state.detection_task.take() {
            task.abort();
        }
        if state.view.is_some() {
            debug!("Overlay already showing");
            return;
        }

        if !state.hosted {
            match self
                .host
                .start_foreground(ServiceKind::Overlay, &ForegroundNotice::OVERLAY)
            {
                Ok(()) => state.hosted = true,
                Err(e) => error!("Overlay service foreground promotion failed: {}", e),
            }
        }

        match self.window.add_overlay(&OverlaySpec::secure_pin()) {
            Ok(view) => {
                info!("Security overlay shown");
                state.view = Some(view);
                state.pin_input.clear();
            }
            Err(e) => error!("Could not attach security overlay: {}", e),
        }
    }

    fn hide(&self) {
        let mut state = self.state();
        let Some(view) = state.view.take() else {
            return;
        };
        if let Err(e) = self.window.remove_view(view) {
            error!("Could not detach security overlay: {}", e);
        }
        state.pin_input.clear();
        info!("Security overlay hidden");
    }

    fn stop_hosting(&self) {
        let mut state = self.state();
        if !state.hosted {
            return;
        }
        state.hosted = false;
        if let Err(e) = self.host.stop_service(ServiceKind::Overlay) {
            error!("Overlay service stop failed: {}", e);
        }
    }

    fn stop_detection(&self) {
        if let Some(task) = self.state().detection_task.take() {
            debug!("Overlay detection stopped");
            task.abort();
        }
    }
}

pub struct OverlayGuard<V> {
    shared: Arc<Shared<V>>,
}

impl<V> fmt::Debug for OverlayGuard<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state();
        f.debug_struct("OverlayGuard")
            .field("showing", &state.view.is_some())
            .field("detecting", &state.detection_task.is_some())
            .finish_non_exhaustive()
    }
}

impl<V> OverlayGuard<V>
where
    V: PinVerifier + Sync + 'static,
{
    pub fn new(
        services: &PlatformServices,
        armed: Arc<ArmedStateStore>,
        verifier: Arc<V>,
        matcher: ForegroundMatcher,
        poll_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                window: services.window.clone(),
                tasks: services.tasks.clone(),
                host: services.host.clone(),
                armed,
                verifier,
                matcher,
                poll_interval,
                state: Mutex::new(OverlayState::default()),
            }),
        }
    }

    /// Current PIN field contents
    pub fn pin_input(&self) -> String {
        self.shared.state().pin_input.clone()
    }

    pub fn is_detecting(&self) -> bool {
        self.shared
            .state()
            .detection_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Start polling for power-menu UI; no-op while showing or disarmed
    pub fn start_detection(&self) {
        let mut state = self.shared.state();
        if state.view.is_some() || !self.shared.armed.get_armed() {
            return;
        }
        if let Some(task) = state.detection_task.take() {
            task.abort();
        }

        debug!("Overlay detection started");
        let shared = self.shared.clone();
        state.detection_task = Some(tokio::spawn(async move {
            let period = shared.poll_interval;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !shared.armed.get_armed() || shared.state().view.is_some() {
                    break;
                }
                match shared.tasks.top_activity() {
                    Ok(Some(component)) if shared.matcher.is_power_menu_ui(&component) => {
                        warn!(
                            "Power menu UI in foreground ({}/{}), showing overlay",
                            component.package, component.class
                        );
                        shared.show();
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => trace!("Foreground inspection failed: {}", e),
                }
            }
        }));
    }

    pub fn stop_detection(&self) {
        self.shared.stop_detection();
    }

    /// Detach everything and release the overlay service, whatever the state
    pub fn teardown(&self) {
        self.shared.stop_detection();
        self.shared.hide();
        self.shared.stop_hosting();
    }

    /// Unlock pressed with `pin`
    ///
    /// Empty input only shows a toast. Otherwise the PIN goes to the verifier on a separate
    /// task; a confirmed match hides the overlay and releases its service, a rejection
    /// clears the field, and a failed round trip leaves everything as it was.
    pub fn submit_pin(&self, pin: &str) -> Option<JoinHandle<()>> {
        let mut state = self.shared.state();
        if state.view.is_none() {
            debug!("PIN submitted with no overlay showing");
            return None;
        }
        state.pin_input = pin.to_string();
        if pin.is_empty() {
            drop(state);
            self.shared.window.show_toast(TOAST_EMPTY_PIN);
            return None;
        }
        if state.verifying {
            debug!("PIN verification already in flight");
            return None;
        }
        state.verifying = true;
        drop(state);

        let shared = self.shared.clone();
        let pin = pin.to_string();
        Some(tokio::spawn(async move {
            let result = shared.verifier.verify_pin(&pin).await;
            shared.state().verifying = false;
            match result {
                Ok(true) => {
                    info!("PIN verified, dismissing overlay");
                    shared.stop_detection();
                    shared.hide();
                    shared.stop_hosting();
                }
                Ok(false) => {
                    warn!("Invalid PIN entered");
                    shared.state().pin_input.clear();
                    shared.window.show_toast(TOAST_INVALID_PIN);
                }
                Err(e) => {
                    warn!("PIN verification failed, overlay stays: {}", e);
                }
            }
        }))
    }
}

impl<V> OverlayControl for OverlayGuard<V>
where
    V: PinVerifier + Sync + 'static,
{
    fn show_overlay(&self) {
        self.shared.show();
    }

    fn hide_overlay(&self) {
        self.shared.hide();
    }

    fn is_showing(&self) -> bool {
        self.shared.state().view.is_some()
    }
}

impl<V> ArmedSubscriber for OverlayGuard<V>
where
    V: PinVerifier + Sync + 'static,
{
    fn name(&self) -> &str {
        "overlay"
    }

    fn on_armed(&self) {
        self.start_detection();
    }

    fn on_disarmed(&self) {
        self.teardown();
    }
}
