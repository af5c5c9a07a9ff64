//! Simulated device
//!
//! A single in-process stand-in for every OS service. It records what the core did
//! (vibration, volumes, observers, views, back actions, ...) and can be told to fail
//! individual services. The headless host runs against it and the tests inspect it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use butler_core::prelude::*;
use butler_core::{
    AudioStream, ComponentName, FocusRequestResult, ForegroundNotice, ServiceKind, VolumeFlags,
};

use crate::prefs::MemoryPreferences;
use crate::services::{
    AccessibilityHost, AccessibilityServiceInfo, AudioManager, ClassicBluetooth, ContentResolver,
    InputManager, ObserverHandle, OverlaySpec, PlatformServices, PowerManager, PreferenceStore,
    ServiceHost, SystemNavigator, TaskInspector, Torch, ViewHandle, Vibrator, WindowManager,
};

/// Services that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Vibrator,
    Audio,
    AudioFocus,
    ContentObserver,
    Torch,
    NoCamera,
    Power,
    Window,
    GlobalAction,
    Tasks,
    Input,
    Host,
    Navigator,
    Bluetooth,
}

/// A recorded wake lock acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeLockRecord {
    pub tag: String,
    pub timeout: Duration,
}

#[derive(Debug)]
struct DeviceState {
    vibration: Option<(Vec<u64>, Option<usize>)>,
    vibrate_calls: usize,
    cancel_calls: usize,

    volumes: HashMap<AudioStream, u32>,
    max_volumes: HashMap<AudioStream, u32>,
    focus_held: bool,
    focus_requests: usize,

    observers: HashSet<u64>,
    next_handle: u64,

    camera_ids: Vec<String>,
    torch: HashMap<String, bool>,
    wake_locks: Vec<WakeLockRecord>,

    views: BTreeMap<ViewHandle, OverlaySpec>,
    views_added: usize,
    toasts: Vec<String>,

    service_info: Option<AccessibilityServiceInfo>,
    back_actions: usize,
    top_activity: Option<ComponentName>,

    input_listener: bool,
    foreground: HashSet<ServiceKind>,
    stopped: Vec<ServiceKind>,
    settings_opened: usize,
    bt_connected: HashSet<String>,

    faults: HashSet<Fault>,
}

impl DeviceState {
    fn new(max_volume: u32) -> Self {
        let mut volumes = HashMap::new();
        volumes.insert(AudioStream::Music, max_volume / 2);
        volumes.insert(AudioStream::Alarm, max_volume / 2);
        let mut max_volumes = HashMap::new();
        max_volumes.insert(AudioStream::Music, max_volume);
        max_volumes.insert(AudioStream::Alarm, max_volume);

        Self {
            vibration: None,
            vibrate_calls: 0,
            cancel_calls: 0,
            volumes,
            max_volumes,
            focus_held: false,
            focus_requests: 0,
            observers: HashSet::new(),
            next_handle: 1,
            camera_ids: vec!["0".to_string(), "1".to_string()],
            torch: HashMap::new(),
            wake_locks: Vec::new(),
            views: BTreeMap::new(),
            views_added: 0,
            toasts: Vec::new(),
            service_info: None,
            back_actions: 0,
            top_activity: None,
            input_listener: false,
            foreground: HashSet::new(),
            stopped: Vec::new(),
            settings_opened: 0,
            bt_connected: HashSet::new(),
            faults: HashSet::new(),
        }
    }

    fn check(&self, fault: Fault, service: &str) -> Result<()> {
        if self.faults.contains(&fault) {
            Err(Error::service_unavailable(service))
        } else {
            Ok(())
        }
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }
}

/// In-process device implementing every OS seam
pub struct SimulatedDevice {
    state: Mutex<DeviceState>,
    prefs: Arc<dyn PreferenceStore>,
}

impl std::fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Default max volume index, matching common Android media streams
pub const DEFAULT_MAX_VOLUME: u32 = 15;

impl SimulatedDevice {
    pub fn new() -> Arc<Self> {
        Self::with_prefs(DEFAULT_MAX_VOLUME, Arc::new(MemoryPreferences::new()))
    }

    pub fn with_prefs(max_volume: u32, prefs: Arc<dyn PreferenceStore>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DeviceState::new(max_volume)),
            prefs,
        })
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        // A panicking test thread must not hide the recorded state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bundle this device as the handle set for every service
    pub fn services(self: &Arc<Self>) -> PlatformServices {
        PlatformServices {
            vibrator: self.clone(),
            audio: self.clone(),
            content: self.clone(),
            torch: self.clone(),
            power: self.clone(),
            window: self.clone(),
            accessibility: self.clone(),
            tasks: self.clone(),
            input: self.clone(),
            host: self.clone(),
            navigator: self.clone(),
            bluetooth: self.clone(),
            prefs: self.prefs.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Fault injection and external actors
    // ─────────────────────────────────────────────────────────

    pub fn inject_fault(&self, fault: Fault) {
        self.state().faults.insert(fault);
    }

    pub fn clear_fault(&self, fault: Fault) {
        self.state().faults.remove(&fault);
    }

    /// Someone else (a user, another app) changes a stream volume
    pub fn set_external_volume(&self, stream: AudioStream, volume: u32) {
        let mut state = self.state();
        let max = state.max_volumes.get(&stream).copied().unwrap_or(0);
        state.volumes.insert(stream, volume.min(max));
    }

    pub fn set_top_activity(&self, component: Option<ComponentName>) {
        self.state().top_activity = component;
    }

    pub fn set_camera_ids(&self, ids: Vec<String>) {
        self.state().camera_ids = ids;
    }

    pub fn set_bluetooth_connected(&self, device_mac: &str, connected: bool) {
        let mac = device_mac.to_ascii_uppercase();
        let mut state = self.state();
        if connected {
            state.bt_connected.insert(mac);
        } else {
            state.bt_connected.remove(&mac);
        }
    }

    // ─────────────────────────────────────────────────────────
    // Observations
    // ─────────────────────────────────────────────────────────

    pub fn is_vibrating(&self) -> bool {
        self.state().vibration.is_some()
    }

    pub fn vibration_pattern(&self) -> Option<(Vec<u64>, Option<usize>)> {
        self.state().vibration.clone()
    }

    pub fn vibrate_calls(&self) -> usize {
        self.state().vibrate_calls
    }

    pub fn cancel_calls(&self) -> usize {
        self.state().cancel_calls
    }

    pub fn volume(&self, stream: AudioStream) -> u32 {
        self.state().volumes.get(&stream).copied().unwrap_or(0)
    }

    pub fn has_audio_focus(&self) -> bool {
        self.state().focus_held
    }

    pub fn focus_requests(&self) -> usize {
        self.state().focus_requests
    }

    /// Another app takes audio focus
    pub fn lose_audio_focus(&self) {
        self.state().focus_held = false;
    }

    pub fn observer_count(&self) -> usize {
        self.state().observers.len()
    }

    pub fn torch_on(&self) -> bool {
        self.state().torch.values().any(|on| *on)
    }

    pub fn wake_locks(&self) -> Vec<WakeLockRecord> {
        self.state().wake_locks.clone()
    }

    pub fn attached_views(&self) -> usize {
        self.state().views.len()
    }

    pub fn attached_specs(&self) -> Vec<OverlaySpec> {
        self.state().views.values().cloned().collect()
    }

    pub fn views_added(&self) -> usize {
        self.state().views_added
    }

    pub fn toasts(&self) -> Vec<String> {
        self.state().toasts.clone()
    }

    pub fn service_info(&self) -> Option<AccessibilityServiceInfo> {
        self.state().service_info.clone()
    }

    pub fn back_actions(&self) -> usize {
        self.state().back_actions
    }

    pub fn input_listener_registered(&self) -> bool {
        self.state().input_listener
    }

    pub fn is_foreground(&self, service: ServiceKind) -> bool {
        self.state().foreground.contains(&service)
    }

    pub fn stopped_services(&self) -> Vec<ServiceKind> {
        self.state().stopped.clone()
    }

    pub fn settings_opened(&self) -> usize {
        self.state().settings_opened
    }
}

// ─────────────────────────────────────────────────────────────────
// Service implementations
// ─────────────────────────────────────────────────────────────────

impl Vibrator for SimulatedDevice {
    fn vibrate_waveform(&self, pattern: &[u64], repeat: Option<usize>) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Vibrator, "vibrator")?;
        state.vibrate_calls += 1;
        state.vibration = Some((pattern.to_vec(), repeat));
        Ok(())
    }

    fn cancel(&self) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Vibrator, "vibrator")?;
        state.cancel_calls += 1;
        state.vibration = None;
        Ok(())
    }
}

impl AudioManager for SimulatedDevice {
    fn stream_volume(&self, stream: AudioStream) -> Result<u32> {
        let state = self.state();
        state.check(Fault::Audio, "audio")?;
        Ok(state.volumes.get(&stream).copied().unwrap_or(0))
    }

    fn stream_max_volume(&self, stream: AudioStream) -> Result<u32> {
        let state = self.state();
        state.check(Fault::Audio, "audio")?;
        Ok(state.max_volumes.get(&stream).copied().unwrap_or(0))
    }

    fn set_stream_volume(
        &self,
        stream: AudioStream,
        volume: u32,
        _flags: VolumeFlags,
    ) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Audio, "audio")?;
        let max = state.max_volumes.get(&stream).copied().unwrap_or(0);
        state.volumes.insert(stream, volume.min(max));
        Ok(())
    }

    fn request_audio_focus(&self, _stream: AudioStream) -> Result<FocusRequestResult> {
        let mut state = self.state();
        state.check(Fault::Audio, "audio")?;
        state.focus_requests += 1;
        if state.faults.contains(&Fault::AudioFocus) {
            return Ok(FocusRequestResult::Failed);
        }
        state.focus_held = true;
        Ok(FocusRequestResult::Granted)
    }

    fn abandon_audio_focus(&self) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Audio, "audio")?;
        state.focus_held = false;
        Ok(())
    }
}

impl ContentResolver for SimulatedDevice {
    fn register_volume_observer(&self) -> Result<ObserverHandle> {
        let mut state = self.state();
        state.check(Fault::ContentObserver, "content resolver")?;
        let id = state.next_handle();
        state.observers.insert(id);
        Ok(ObserverHandle(id))
    }

    fn unregister_observer(&self, handle: ObserverHandle) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::ContentObserver, "content resolver")?;
        state.observers.remove(&handle.0);
        Ok(())
    }
}

impl Torch for SimulatedDevice {
    fn camera_ids(&self) -> Result<Vec<String>> {
        let state = self.state();
        state.check(Fault::Torch, "camera")?;
        if state.faults.contains(&Fault::NoCamera) {
            return Ok(Vec::new());
        }
        Ok(state.camera_ids.clone())
    }

    fn set_torch_mode(&self, camera_id: &str, enabled: bool) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Torch, "camera")?;
        if !state.camera_ids.iter().any(|id| id == camera_id) {
            return Err(Error::platform(format!("unknown camera id {}", camera_id)));
        }
        state.torch.insert(camera_id.to_string(), enabled);
        Ok(())
    }
}

impl PowerManager for SimulatedDevice {
    fn acquire_wake_lock(&self, tag: &str, timeout: Duration) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Power, "power")?;
        state.wake_locks.push(WakeLockRecord {
            tag: tag.to_string(),
            timeout,
        });
        Ok(())
    }
}

impl WindowManager for SimulatedDevice {
    fn add_overlay(&self, spec: &OverlaySpec) -> Result<ViewHandle> {
        let mut state = self.state();
        state.check(Fault::Window, "window manager")?;
        let handle = ViewHandle(state.next_handle());
        state.views.insert(handle, spec.clone());
        state.views_added += 1;
        Ok(handle)
    }

    fn remove_view(&self, view: ViewHandle) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Window, "window manager")?;
        state
            .views
            .remove(&view)
            .map(|_| ())
            .ok_or_else(|| Error::platform(format!("view {:?} not attached", view)))
    }

    fn show_toast(&self, text: &str) {
        self.state().toasts.push(text.to_string());
    }
}

impl AccessibilityHost for SimulatedDevice {
    fn set_service_info(&self, info: &AccessibilityServiceInfo) -> Result<()> {
        self.state().service_info = Some(info.clone());
        Ok(())
    }

    fn perform_back(&self) -> Result<bool> {
        let mut state = self.state();
        state.check(Fault::GlobalAction, "accessibility")?;
        state.back_actions += 1;
        // Back dismisses whatever system dialog sits on top
        state.top_activity = None;
        Ok(true)
    }
}

impl TaskInspector for SimulatedDevice {
    fn top_activity(&self) -> Result<Option<ComponentName>> {
        let state = self.state();
        state.check(Fault::Tasks, "activity manager")?;
        Ok(state.top_activity.clone())
    }
}

impl InputManager for SimulatedDevice {
    fn register_input_device_listener(&self) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Input, "input manager")?;
        state.input_listener = true;
        Ok(())
    }

    fn unregister_input_device_listener(&self) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Input, "input manager")?;
        state.input_listener = false;
        Ok(())
    }
}

impl ServiceHost for SimulatedDevice {
    fn start_foreground(&self, service: ServiceKind, notice: &ForegroundNotice) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Host, "service host")?;
        trace!("Foreground {:?}: {} (#{})", service, notice.title, notice.id);
        state.foreground.insert(service);
        Ok(())
    }

    fn stop_service(&self, service: ServiceKind) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Host, "service host")?;
        state.foreground.remove(&service);
        state.stopped.push(service);
        Ok(())
    }
}

impl SystemNavigator for SimulatedDevice {
    fn open_accessibility_settings(&self) -> Result<()> {
        let mut state = self.state();
        state.check(Fault::Navigator, "settings")?;
        state.settings_opened += 1;
        Ok(())
    }
}

impl ClassicBluetooth for SimulatedDevice {
    fn is_device_connected(&self, device_mac: &str) -> Result<bool> {
        let state = self.state();
        state.check(Fault::Bluetooth, "bluetooth")?;
        Ok(state.bt_connected.contains(&device_mac.to_ascii_uppercase()))
    }
}
