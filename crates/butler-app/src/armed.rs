//! Armed state and its synchronous broadcast
//!
//! [`ArmedStateStore`] is the persisted source of truth. [`ArmingCoordinator::set_armed`]
//! is the only way to change it: it persists, then calls every registered
//! [`ArmedSubscriber`] in registration order before returning. Once it returns `false`,
//! every component has already run its disengage path.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use butler_core::prelude::*;
use butler_platform::PreferenceStore;

/// Persisted `is_armed` flag with a cached copy for cheap reads
pub struct ArmedStateStore {
    prefs: Arc<dyn PreferenceStore>,
    key: String,
    cached: AtomicBool,
}

impl fmt::Debug for ArmedStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmedStateStore")
            .field("key", &self.key)
            .field("armed", &self.get_armed())
            .finish()
    }
}

impl ArmedStateStore {
    /// Open the store, seeding the cache from persisted storage
    pub fn new(prefs: Arc<dyn PreferenceStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let armed = prefs.get_bool(&key, false);
        Self {
            prefs,
            key,
            cached: AtomicBool::new(armed),
        }
    }

    /// Cheap read of the current value
    pub fn get_armed(&self) -> bool {
        self.cached.load(Ordering::SeqCst)
    }

    /// Read straight from persisted storage
    pub fn read_persisted(&self) -> bool {
        self.prefs.get_bool(&self.key, false)
    }

    /// Persist and cache; a failed write still updates the in-process value
    fn store(&self, armed: bool) {
        self.cached.store(armed, Ordering::SeqCst);
        if let Err(e) = self.prefs.put_bool(&self.key, armed) {
            error!("Failed to persist {}={}: {}", self.key, armed, e);
        }
    }
}

/// A component that reacts to arm/disarm
///
/// Both hooks run synchronously inside [`ArmingCoordinator::set_armed`] and must not
/// block. Each has a default no-op, so components only override what they need.
pub trait ArmedSubscriber: Send + Sync + fmt::Debug {
    /// Name for logging
    fn name(&self) -> &str;

    /// Engage routine, called after the store reads `true`
    fn on_armed(&self) {}

    /// Disengage routine, called after the store reads `false`
    fn on_disarmed(&self) {}
}

/// The single arming entry point
#[derive(Debug)]
pub struct ArmingCoordinator {
    store: Arc<ArmedStateStore>,
    subscribers: Vec<Arc<dyn ArmedSubscriber>>,
}

impl ArmingCoordinator {
    pub fn new(store: Arc<ArmedStateStore>) -> Self {
        Self {
            store,
            subscribers: Vec::new(),
        }
    }

    /// Register a subscriber (composition time only)
    pub fn register(&mut self, subscriber: Arc<dyn ArmedSubscriber>) {
        debug!("Armed subscriber registered: {}", subscriber.name());
        self.subscribers.push(subscriber);
    }

    pub fn store(&self) -> &Arc<ArmedStateStore> {
        &self.store
    }

    pub fn is_armed(&self) -> bool {
        self.store.get_armed()
    }

    /// Persist `armed` and fan it out to every subscriber
    pub fn set_armed(&self, armed: bool) {
        info!("Armed state changed: {}", armed);
        self.store.store(armed);
        self.broadcast(armed);
    }

    /// Push the persisted value through the fan-out (startup restore)
    pub fn restore(&self) {
        let armed = self.store.read_persisted();
        info!("Restoring persisted armed state: {}", armed);
        self.store.cached.store(armed, Ordering::SeqCst);
        self.broadcast(armed);
    }

    fn broadcast(&self, armed: bool) {
        for subscriber in &self.subscribers {
            trace!("Notifying {} (armed={})", subscriber.name(), armed);
            if armed {
                subscriber.on_armed();
            } else {
                subscriber.on_disarmed();
            }
        }
    }
}
