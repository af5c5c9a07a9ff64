//! Alert effect: vibration plus forced volume
//!
//! The only component allowed to vibrate. At most one session exists; a session owns
//! the repeating waveform, the volume snapshot and the volume-settings observer, and
//! every teardown path releases all three.

use std::sync::{Arc, Mutex, MutexGuard};

use butler_core::prelude::*;
use butler_core::{AlertSession, AudioStream, ForegroundNotice, ServiceKind, VolumeFlags};
use butler_platform::{
    AudioManager, ContentResolver, ObserverHandle, PlatformServices, ServiceHost, Vibrator,
};

use crate::armed::{ArmedStateStore, ArmedSubscriber};

/// Streams forced to max while alerting
const ALERT_STREAMS: [AudioStream; 2] = [AudioStream::Music, AudioStream::Alarm];

#[derive(Debug, Default)]
struct AlertState {
    session: Option<AlertSession>,
    /// Volumes before the alert, restored on stop
    snapshot: Vec<(AudioStream, u32)>,
    observer: Option<ObserverHandle>,
}

pub struct AlertEffect {
    vibrator: Arc<dyn Vibrator>,
    audio: Arc<dyn AudioManager>,
    content: Arc<dyn ContentResolver>,
    host: Arc<dyn ServiceHost>,
    armed: Arc<ArmedStateStore>,
    pattern: Vec<u64>,
    state: Mutex<AlertState>,
}

impl std::fmt::Debug for AlertEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEffect")
            .field("pattern", &self.pattern)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl AlertEffect {
    pub fn new(services: &PlatformServices, armed: Arc<ArmedStateStore>, pattern: Vec<u64>) -> Self {
        Self {
            vibrator: services.vibrator.clone(),
            audio: services.audio.clone(),
            content: services.content.clone(),
            host: services.host.clone(),
            armed,
            pattern,
            state: Mutex::new(AlertState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, AlertState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.state().session.is_some()
    }

    /// Start a session; returns whether one was started
    pub fn start_alert(&self) -> bool {
        let mut state = self.state();

        if !self.armed.get_armed() {
            warn!("start_alert rejected: not armed");
            return false;
        }
        if state.session.is_some() {
            warn!("start_alert rejected: alert already active");
            return false;
        }

        info!("Starting alert");
        if let Err(e) = self
            .host
            .start_foreground(ServiceKind::Alert, &ForegroundNotice::ALERT)
        {
            error!("Alert service foreground promotion failed: {}", e);
        }

        // A stale waveform from a previous owner must not overlap ours
        if let Err(e) = self.vibrator.cancel() {
            error!("Vibration cancel failed: {}", e);
        }
        if let Err(e) = self.vibrator.vibrate_waveform(&self.pattern, Some(0)) {
            error!("Vibration failed, alert continues without it: {}", e);
        }

        state.snapshot = ALERT_STREAMS
            .iter()
            .filter_map(|stream| match self.audio.stream_volume(*stream) {
                Ok(volume) => Some((*stream, volume)),
                Err(e) => {
                    error!("Could not snapshot {:?} volume: {}", stream, e);
                    None
                }
            })
            .collect();
        self.force_max_volume();

        match self.content.register_volume_observer() {
            Ok(handle) => state.observer = Some(handle),
            Err(e) => error!("Volume observer unavailable: {}", e),
        }

        state.session = Some(AlertSession::begin());
        true
    }

    /// Stop the current session; no-op when none is active
    pub fn stop_alert(&self) {
        let mut state = self.state();
        let Some(session) = state.session.take() else {
            debug!("stop_alert: no active alert");
            return;
        };

        info!(
            "Stopping alert after {}s",
            session.duration().num_seconds()
        );
        self.release(&mut state);
        if let Err(e) = self.host.stop_service(ServiceKind::Alert) {
            error!("Alert service stop failed: {}", e);
        }
    }

    /// Unconditional teardown, safe from any state
    pub fn force_stop(&self) {
        let mut state = self.state();
        let had_session = state.session.take().is_some();
        warn!("Force-stopping alert (session active: {})", had_session);

        self.release(&mut state);
        if had_session {
            if let Err(e) = self.host.stop_service(ServiceKind::Alert) {
                error!("Alert service stop failed: {}", e);
            }
        }
    }

    /// Volume settings changed while the observer is installed
    pub fn on_volume_settings_changed(&self) {
        let state = self.state();
        if state.session.is_some() && state.observer.is_some() {
            trace!("Volume settings changed during alert, re-forcing max");
            self.force_max_volume();
        }
    }

    fn force_max_volume(&self) {
        for stream in ALERT_STREAMS {
            let result = self
                .audio
                .stream_max_volume(stream)
                .and_then(|max| {
                    self.audio
                        .set_stream_volume(stream, max, VolumeFlags::RemoveSoundAndVibrate)
                });
            if let Err(e) = result {
                error!("Could not force {:?} volume to max: {}", stream, e);
            }
        }
    }

    /// Cancel vibration, drop the observer, restore the snapshot
    fn release(&self, state: &mut AlertState) {
        if let Err(e) = self.vibrator.cancel() {
            error!("Vibration cancel failed: {}", e);
        }

        if let Some(handle) = state.observer.take() {
            if let Err(e) = self.content.unregister_observer(handle) {
                error!("Volume observer removal failed: {}", e);
            }
        }

        for (stream, volume) in state.snapshot.drain(..) {
            if let Err(e) = self
                .audio
                .set_stream_volume(stream, volume, VolumeFlags::RemoveSoundAndVibrate)
            {
                error!("Could not restore {:?} volume: {}", stream, e);
            }
        }
    }
}

impl ArmedSubscriber for AlertEffect {
    fn name(&self) -> &str {
        "alert"
    }

    fn on_disarmed(&self) {
        self.stop_alert();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use butler_platform::{Fault, MemoryPreferences, SimulatedDevice, DEFAULT_MAX_VOLUME};

    fn setup(armed: bool) -> (Arc<SimulatedDevice>, Arc<ArmedStateStore>, AlertEffect) {
        let prefs = Arc::new(MemoryPreferences::with_value("is_armed", armed));
        let device = SimulatedDevice::with_prefs(DEFAULT_MAX_VOLUME, prefs.clone());
        let store = Arc::new(ArmedStateStore::new(prefs, "is_armed"));
        let alert = AlertEffect::new(&device.services(), store.clone(), vec![0, 800, 400, 800]);
        (device, store, alert)
    }

    #[test]
    fn test_start_while_disarmed_never_activates() {
        let (device, _store, alert) = setup(false);
        assert!(!alert.start_alert());
        assert!(!alert.is_active());
        assert!(!device.is_vibrating());
        assert_eq!(device.vibrate_calls(), 0);
    }

    #[test]
    fn test_start_forces_volume_and_vibrates() {
        let (device, _store, alert) = setup(true);
        device.set_external_volume(AudioStream::Music, 4);
        device.set_external_volume(AudioStream::Alarm, 2);

        assert!(alert.start_alert());
        assert!(alert.is_active());
        assert_eq!(
            device.vibration_pattern(),
            Some((vec![0, 800, 400, 800], Some(0)))
        );
        assert_eq!(device.volume(AudioStream::Music), DEFAULT_MAX_VOLUME);
        assert_eq!(device.volume(AudioStream::Alarm), DEFAULT_MAX_VOLUME);
        assert_eq!(device.observer_count(), 1);
        assert!(device.is_foreground(ServiceKind::Alert));

        alert.stop_alert();
        assert!(!device.is_vibrating());
        assert_eq!(device.volume(AudioStream::Music), 4);
        assert_eq!(device.volume(AudioStream::Alarm), 2);
        assert_eq!(device.observer_count(), 0);
        assert!(!device.is_foreground(ServiceKind::Alert));
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let (device, _store, alert) = setup(true);
        assert!(alert.start_alert());
        assert!(!alert.start_alert());
        assert_eq!(device.vibrate_calls(), 1);
        assert_eq!(device.observer_count(), 1);
    }

    #[test]
    fn test_active_iff_starts_exceed_stops() {
        let (_device, _store, alert) = setup(true);
        let mut accepted = 0i32;
        let mut stopped = 0i32;
        for step in ["start", "start", "stop", "stop", "start", "stop", "start"] {
            match step {
                "start" => {
                    if alert.start_alert() {
                        accepted += 1;
                    }
                }
                _ => {
                    if alert.is_active() {
                        stopped += 1;
                    }
                    alert.stop_alert();
                }
            }
            assert_eq!(alert.is_active(), accepted > stopped);
        }
    }

    #[test]
    fn test_force_stop_from_any_state() {
        let (device, _store, alert) = setup(true);

        alert.force_stop();
        assert!(!alert.is_active());

        alert.start_alert();
        alert.stop_alert();
        alert.force_stop();
        assert!(!alert.is_active());

        alert.start_alert();
        alert.force_stop();
        assert!(!alert.is_active());
        assert!(!device.is_vibrating());
        assert_eq!(device.observer_count(), 0);
    }

    #[test]
    fn test_observer_reforces_max() {
        let (device, _store, alert) = setup(true);
        alert.start_alert();

        device.set_external_volume(AudioStream::Music, 1);
        alert.on_volume_settings_changed();
        assert_eq!(device.volume(AudioStream::Music), DEFAULT_MAX_VOLUME);

        alert.stop_alert();
        device.set_external_volume(AudioStream::Music, 1);
        alert.on_volume_settings_changed();
        assert_eq!(device.volume(AudioStream::Music), 1);
    }

    #[test]
    fn test_vibrator_failure_degrades() {
        let (device, _store, alert) = setup(true);
        device.inject_fault(Fault::Vibrator);

        assert!(alert.start_alert());
        assert_eq!(device.volume(AudioStream::Music), DEFAULT_MAX_VOLUME);
        alert.stop_alert();
        assert!(!alert.is_active());
    }

    #[test]
    fn test_disarm_stops_alert() {
        let (device, _store, alert) = setup(true);
        alert.start_alert();
        alert.on_disarmed();
        assert!(!alert.is_active());
        assert!(!device.is_vibrating());
    }
}
