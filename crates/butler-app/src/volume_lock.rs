//! Media-volume lock
//!
//! Holds the music stream at max with a periodic reassertion loop and reasserts shortly
//! after audio focus is lost. Independent from the alert effect; both may force the
//! same stream and repeated "set to max" converges.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

use butler_core::prelude::*;
use butler_core::{AudioStream, ChannelEvent, FocusChange, FocusRequestResult, VolumeFlags};
use butler_platform::{AudioManager, ChannelBridge};

use crate::armed::ArmedSubscriber;

const LOCKED_STREAM: AudioStream = AudioStream::Music;

#[derive(Debug, Default)]
struct LockState {
    locked: bool,
    baseline: Option<u32>,
    max: u32,
    reassert_task: Option<JoinHandle<()>>,
    focus_task: Option<JoinHandle<()>>,
}

struct Shared {
    audio: Arc<dyn AudioManager>,
    bridge: ChannelBridge,
    state: Mutex<LockState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Retake focus and force max if the stream drifted below it
    ///
    /// The state lock is held for the whole pass so concurrent passes report a drift once.
    fn reassert(&self) -> Option<(u32, u32)> {
        let state = self.state();
        if !state.locked {
            return None;
        }
        let max = state.max;

        match self.audio.request_audio_focus(LOCKED_STREAM) {
            Ok(FocusRequestResult::Granted) => {}
            Ok(other) => debug!("Audio focus not regained ({:?})", other),
            Err(e) => warn!("Audio focus request failed: {}", e),
        }

        let current = match self.audio.stream_volume(LOCKED_STREAM) {
            Ok(volume) => volume,
            Err(e) => {
                error!("Volume lock could not read volume: {}", e);
                return None;
            }
        };
        if current >= max {
            return None;
        }

        if let Err(e) = self
            .audio
            .set_stream_volume(LOCKED_STREAM, max, VolumeFlags::None)
        {
            error!("Volume lock could not force max: {}", e);
            return None;
        }
        debug!("Volume forced {} -> {}", current, max);
        self.bridge.emit(&ChannelEvent::VolumeForced {
            from: current,
            to: max,
        });
        Some((current, max))
    }
}

pub struct VolumeLock {
    shared: Arc<Shared>,
    reassert_interval: Duration,
    focus_delay: Duration,
}

impl std::fmt::Debug for VolumeLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeLock")
            .field("locked", &self.is_locked())
            .field("reassert_interval", &self.reassert_interval)
            .finish_non_exhaustive()
    }
}

impl VolumeLock {
    pub fn new(
        audio: Arc<dyn AudioManager>,
        bridge: ChannelBridge,
        reassert_interval: Duration,
        focus_delay: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                audio,
                bridge,
                state: Mutex::new(LockState::default()),
            }),
            reassert_interval,
            focus_delay,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.shared.state().locked
    }

    /// Lock media volume at max; returns false if the stream could not be read
    ///
    /// Locking while locked keeps the original baseline.
    pub fn lock_volume(&self) -> bool {
        let mut state = self.shared.state();
        if state.locked {
            debug!("Volume already locked");
            return true;
        }

        let audio = &self.shared.audio;
        let (current, max) = match (
            audio.stream_volume(LOCKED_STREAM),
            audio.stream_max_volume(LOCKED_STREAM),
        ) {
            (Ok(current), Ok(max)) => (current, max),
            (Err(e), _) | (_, Err(e)) => {
                error!("Volume lock unavailable: {}", e);
                return false;
            }
        };

        if let Err(e) = audio.set_stream_volume(LOCKED_STREAM, max, VolumeFlags::None) {
            error!("Could not force volume to max: {}", e);
        }
        match audio.request_audio_focus(LOCKED_STREAM) {
            Ok(FocusRequestResult::Granted) => debug!("Audio focus granted"),
            Ok(other) => warn!("Audio focus not granted ({:?}), forcing volume anyway", other),
            Err(e) => error!("Audio focus request failed, forcing volume anyway: {}", e),
        }

        state.locked = true;
        state.baseline = Some(current);
        state.max = max;

        if let Some(task) = state.reassert_task.take() {
            task.abort();
        }
        let shared = self.shared.clone();
        let period = self.reassert_interval;
        state.reassert_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !shared.state().locked {
                    break;
                }
                shared.reassert();
            }
        }));

        info!("Volume locked at {} (baseline {})", max, current);
        true
    }

    /// Release the lock and restore the baseline; no-op when not locked
    pub fn unlock_volume(&self) {
        let mut state = self.shared.state();
        if !state.locked {
            debug!("unlock_volume: not locked");
            return;
        }

        if let Some(task) = state.reassert_task.take() {
            task.abort();
        }
        if let Some(task) = state.focus_task.take() {
            task.abort();
        }
        if let Err(e) = self.shared.audio.abandon_audio_focus() {
            error!("Abandon audio focus failed: {}", e);
        }
        state.locked = false;

        if let Some(baseline) = state.baseline.take() {
            if let Err(e) =
                self.shared
                    .audio
                    .set_stream_volume(LOCKED_STREAM, baseline, VolumeFlags::None)
            {
                error!("Could not restore volume baseline: {}", e);
            }
        }
        info!("Volume unlocked");
    }

    /// Audio focus callback; anything but a gain schedules a reassertion
    pub fn on_focus_change(&self, change: FocusChange) {
        let mut state = self.shared.state();
        if !state.locked || change == FocusChange::Gain {
            return;
        }

        debug!("Audio focus change {:?}, reasserting shortly", change);
        if let Some(task) = state.focus_task.take() {
            task.abort();
        }
        let shared = self.shared.clone();
        let delay = self.focus_delay;
        state.focus_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.reassert();
        }));
    }
}

impl ArmedSubscriber for VolumeLock {
    fn name(&self) -> &str {
        "volume-lock"
    }

    fn on_disarmed(&self) {
        self.unlock_volume();
    }
}
