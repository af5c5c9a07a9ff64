//! Method-channel commands and request tracking
//!
//! This module provides:
//! - [`Command`]: typed view of an inbound method call, with per-channel routing
//! - [`RequestTracker`]: matches replies to requests the core sent to the policy layer
//! - [`ChannelBridge`]: outbound queue for replies, events and requests
//! - [`PinVerifier`]: the asynchronous PIN round trip used by the overlay

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::Instant;

use butler_core::prelude::*;
use butler_core::{
    ChannelEvent, ALERT_CHANNEL, AUDIO_VOLUME_CHANNEL, CLASSIC_BT_CHANNEL, POWER_OFF_CHANNEL,
    SECURE_OVERLAY_CHANNEL, SHUTDOWN_CHANNEL,
};

use crate::protocol::{MethodCall, OutboundMessage};

// ─────────────────────────────────────────────────────────────────
// Inbound commands
// ─────────────────────────────────────────────────────────────────

/// Commands the policy layer can issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartAlert,
    StopAlert,
    IsAlertActive,
    SetArmed { armed: bool },
    IsProtectionActive,
    TriggerEmergencyAlarm,
    OnShutdownAttempt { trigger_type: String },
    OpenAccessibilitySettings,
    LockVolume,
    UnlockVolume,
    IsVolumeLocked,
    IsClassicDeviceConnected { device_mac: String },
}

/// Methods each channel answers; anything else is "not implemented"
fn channel_methods(channel: &str) -> &'static [&'static str] {
    match channel {
        ALERT_CHANNEL => &["startAlert", "stopAlert", "isAlertActive"],
        POWER_OFF_CHANNEL => &["setArmed", "isProtectionActive", "triggerEmergencyAlarm"],
        SHUTDOWN_CHANNEL => &["setArmed", "onShutdownAttempt", "openAccessibilitySettings"],
        AUDIO_VOLUME_CHANNEL => &["lockVolume", "unlockVolume", "isVolumeLocked"],
        CLASSIC_BT_CHANNEL => &["isClassicDeviceConnected"],
        _ => &[],
    }
}

impl Command {
    /// Parse a method call into a command
    ///
    /// Unknown methods (or methods sent to a channel that does not carry them) yield
    /// [`Error::NotImplemented`]; a missing required argument yields
    /// [`Error::InvalidArgument`].
    pub fn parse(call: &MethodCall) -> Result<Self> {
        if let Some(channel) = call.channel.as_deref() {
            if !channel_methods(channel).contains(&call.method.as_str()) {
                return Err(Error::not_implemented(format!("{}#{}", channel, call.method)));
            }
        }

        let command = match call.method.as_str() {
            "startAlert" => Command::StartAlert,
            "stopAlert" => Command::StopAlert,
            "isAlertActive" => Command::IsAlertActive,
            "setArmed" => Command::SetArmed {
                armed: call.arg_bool("armed").unwrap_or(false),
            },
            "isProtectionActive" => Command::IsProtectionActive,
            "triggerEmergencyAlarm" => Command::TriggerEmergencyAlarm,
            "onShutdownAttempt" => Command::OnShutdownAttempt {
                trigger_type: call.arg_str("triggerType").unwrap_or("UNKNOWN").to_string(),
            },
            "openAccessibilitySettings" => Command::OpenAccessibilitySettings,
            "lockVolume" => Command::LockVolume,
            "unlockVolume" => Command::UnlockVolume,
            "isVolumeLocked" => Command::IsVolumeLocked,
            "isClassicDeviceConnected" => match call.arg_str("deviceMac") {
                Some(mac) if !mac.is_empty() => Command::IsClassicDeviceConnected {
                    device_mac: mac.to_string(),
                },
                _ => return Err(Error::invalid_argument("deviceMac is required")),
            },
            other => return Err(Error::not_implemented(other)),
        };
        Ok(command)
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Command::StartAlert => "start alert",
            Command::StopAlert => "stop alert",
            Command::IsAlertActive => "query alert active",
            Command::SetArmed { .. } => "set armed",
            Command::IsProtectionActive => "query protection active",
            Command::TriggerEmergencyAlarm => "trigger emergency alarm",
            Command::OnShutdownAttempt { .. } => "shutdown attempt notice",
            Command::OpenAccessibilitySettings => "open accessibility settings",
            Command::LockVolume => "lock volume",
            Command::UnlockVolume => "unlock volume",
            Command::IsVolumeLocked => "query volume locked",
            Command::IsClassicDeviceConnected { .. } => "query classic device",
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Outbound request tracking
// ─────────────────────────────────────────────────────────────────

/// A pending request awaiting response
struct PendingRequest {
    response_tx: oneshot::Sender<RequestResponse>,
    created_at: Instant,
    description: String,
}

/// Reply from the policy layer to a core request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResponse {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl RequestResponse {
    pub fn from_reply(id: u64, result: Option<Value>, error: Option<Value>) -> Self {
        Self {
            id,
            result,
            error: error.map(|e| match e {
                Value::String(s) => s,
                other => other.to_string(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(id: u64, message: &str) -> Self {
        Self {
            id,
            result: None,
            error: Some(message.to_string()),
        }
    }
}

/// Tracks pending requests and matches responses
pub struct RequestTracker {
    pending: Arc<RwLock<HashMap<u64, PendingRequest>>>,
    next_id: AtomicU64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new pending request
    /// Returns (request_id, receiver for response)
    pub async fn register(&self, description: &str) -> (u64, oneshot::Receiver<RequestResponse>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        let pending = PendingRequest {
            response_tx: tx,
            created_at: Instant::now(),
            description: description.to_string(),
        };
        self.pending.write().await.insert(id, pending);

        (id, rx)
    }

    /// Route a reply to its request
    /// Returns true if the reply was matched to a pending request
    pub async fn handle_response(
        &self,
        id: u64,
        result: Option<Value>,
        error: Option<Value>,
    ) -> bool {
        if let Some(pending) = self.pending.write().await.remove(&id) {
            trace!("Reply for #{} ({})", id, pending.description);
            let _ = pending
                .response_tx
                .send(RequestResponse::from_reply(id, result, error));
            true
        } else {
            false
        }
    }

    /// Forget a single request without answering it
    pub async fn remove(&self, id: u64) {
        self.pending.write().await.remove(&id);
    }

    /// Cancel all pending requests (e.g., on shutdown)
    pub async fn cancel_all(&self) {
        let mut pending = self.pending.write().await;
        for (id, req) in pending.drain() {
            let _ = req
                .response_tx
                .send(RequestResponse::failed(id, "Request cancelled"));
        }
    }

    /// Remove stale requests that have timed out
    pub async fn cleanup_stale(&self, timeout: Duration) -> Vec<u64> {
        let mut pending = self.pending.write().await;
        let now = Instant::now();

        let stale: Vec<u64> = pending
            .iter()
            .filter(|(_, req)| now.duration_since(req.created_at) > timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            if let Some(req) = pending.remove(id) {
                let _ = req
                    .response_tx
                    .send(RequestResponse::failed(*id, "Request timed out"));
            }
        }

        stale
    }

    /// Get the number of pending requests
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────
// Bridge
// ─────────────────────────────────────────────────────────────────

/// Default wait for a policy-layer reply
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound side of the method channels
///
/// Cheap to clone; every clone feeds the same queue and tracker.
#[derive(Clone)]
pub struct ChannelBridge {
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    tracker: Arc<RequestTracker>,
    request_timeout: Duration,
}

impl std::fmt::Debug for ChannelBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBridge")
            .field("outbound_tx", &"<channel>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ChannelBridge {
    pub fn new(
        outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            outbound_tx,
            tracker: Arc::new(RequestTracker::new()),
            request_timeout,
        }
    }

    /// Create a bridge together with the receiving end of its queue
    pub fn channel(request_timeout: Duration) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx, request_timeout), rx)
    }

    /// Fire-and-forget notification; a closed host is logged, never propagated
    pub fn emit(&self, event: &ChannelEvent) {
        debug!("Event {}#{}", event.channel(), event.method());
        if self.outbound_tx.send(OutboundMessage::event(event)).is_err() {
            warn!(
                "Dropping {} event: host channel closed",
                event.method()
            );
        }
    }

    /// Answer an inbound method call
    pub fn reply(&self, id: u64, result: Result<Value>) {
        if let Err(e) = &result {
            debug!("Call #{} failed: {}", id, e);
        }
        if self
            .outbound_tx
            .send(OutboundMessage::reply(id, result))
            .is_err()
        {
            warn!("Dropping reply #{}: host channel closed", id);
        }
    }

    /// Invoke a method on the policy layer and wait for its reply
    pub async fn invoke(&self, channel: &str, method: &str, params: Value) -> Result<Value> {
        let (id, response_rx) = self.tracker.register(method).await;

        debug!("Sending request #{}: {}#{}", id, channel, method);
        let request = OutboundMessage::Request {
            id,
            channel: channel.to_string(),
            method: method.to_string(),
            params,
        };
        if self.outbound_tx.send(request).is_err() {
            self.tracker.remove(id).await;
            return Err(Error::channel_send(format!("{} request", method)));
        }

        match tokio::time::timeout(self.request_timeout, response_rx).await {
            Ok(Ok(response)) => match response.error {
                None => Ok(response.result.unwrap_or(Value::Null)),
                Some(message) => Err(Error::platform(format!("{} failed: {}", method, message))),
            },
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                self.tracker.remove(id).await;
                Err(Error::timeout(format!(
                    "'{}' timed out after {:?}",
                    method, self.request_timeout
                )))
            }
        }
    }

    /// Route a reply received from the host
    pub async fn handle_response(
        &self,
        id: u64,
        result: Option<Value>,
        error: Option<Value>,
    ) -> bool {
        let matched = self.tracker.handle_response(id, result, error).await;
        if !matched {
            warn!("Reply #{} matches no pending request", id);
        }
        matched
    }

    /// Fail every request still waiting for a reply
    pub async fn shutdown(&self) {
        self.tracker.cancel_all().await;
    }

    pub fn tracker(&self) -> &Arc<RequestTracker> {
        &self.tracker
    }
}

// ─────────────────────────────────────────────────────────────────
// PIN verification
// ─────────────────────────────────────────────────────────────────

/// Asks the policy layer whether a PIN is correct
///
/// The PIN itself is never stored or compared on this side.
#[trait_variant::make(PinVerifier: Send)]
pub trait LocalPinVerifier {
    /// `Ok(true)` only for a confirmed match; errors mean "no answer"
    async fn verify_pin(&self, pin: &str) -> Result<bool>;
}

impl PinVerifier for ChannelBridge {
    async fn verify_pin(&self, pin: &str) -> Result<bool> {
        let result = self
            .invoke(SECURE_OVERLAY_CHANNEL, "verifyPin", json!({ "pin": pin }))
            .await?;
        // Anything but a literal `true` is a rejection
        Ok(result.as_bool().unwrap_or(false))
    }
}
