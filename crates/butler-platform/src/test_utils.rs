//! Test utilities for platform types
//!
//! Provides a scripted PIN verifier and helpers for building signals and reading the
//! outbound queue.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::mpsc;

use butler_core::prelude::*;
use butler_core::{AccessibilityEvent, AccessibilityEventType};

use crate::commands::PinVerifier;
use crate::protocol::OutboundMessage;

/// Scripted answer for one verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinAnswer {
    Accept,
    Reject,
    /// The policy layer answered with an error
    Fail,
}

/// PIN verifier with a scripted answer queue; records every PIN it was asked about
///
/// When the queue runs dry it falls back to comparing against `correct_pin`.
#[derive(Debug)]
pub struct ScriptedVerifier {
    correct_pin: String,
    script: Mutex<VecDeque<PinAnswer>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedVerifier {
    pub fn new(correct_pin: &str) -> Self {
        Self {
            correct_pin: correct_pin.to_string(),
            script: Mutex::new(VecDeque::new()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn push_answer(&self, answer: PinAnswer) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl PinVerifier for ScriptedVerifier {
    async fn verify_pin(&self, pin: &str) -> Result<bool> {
        self.asked.lock().unwrap().push(pin.to_string());
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(PinAnswer::Accept) => Ok(true),
            Some(PinAnswer::Reject) => Ok(false),
            Some(PinAnswer::Fail) => Err(Error::platform("verifyPin failed: scripted")),
            None => Ok(pin == self.correct_pin),
        }
    }
}

/// A window-state-changed event for the given package and class
pub fn window_event(package: &str, class: &str) -> AccessibilityEvent {
    AccessibilityEvent::new(AccessibilityEventType::WindowStateChanged, package, class)
}

/// The system power menu as most devices report it
pub fn power_menu_event() -> AccessibilityEvent {
    window_event("com.android.systemui", "com.android.systemui.GlobalActionsDialog")
}

/// Everything currently queued, without waiting
pub fn drain_outbound(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

/// Names of the events among `messages`, in order
pub fn event_names(messages: &[OutboundMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|msg| match msg {
            OutboundMessage::Event { event, .. } => Some(event.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ChannelBridge;
    use butler_core::{ChannelEvent, TriggerType};
    use std::time::Duration;

    #[tokio::test]
    async fn test_scripted_verifier() {
        let verifier = ScriptedVerifier::new("1234");
        verifier.push_answer(PinAnswer::Fail);

        assert!(PinVerifier::verify_pin(&verifier, "1234").await.is_err());
        assert!(PinVerifier::verify_pin(&verifier, "1234").await.unwrap());
        assert!(!PinVerifier::verify_pin(&verifier, "9999").await.unwrap());
        assert_eq!(verifier.asked(), vec!["1234", "1234", "9999"]);
    }

    #[test]
    fn test_drain_and_names() {
        let (bridge, mut rx) = ChannelBridge::channel(Duration::from_secs(1));
        bridge.emit(&ChannelEvent::VolumeForced { from: 1, to: 15 });
        bridge.emit(&ChannelEvent::emergency_alarm(TriggerType::FlutterTrigger));

        let messages = drain_outbound(&mut rx);
        assert_eq!(event_names(&messages), vec!["volumeForced", "emergencyAlarm"]);
        assert!(drain_outbound(&mut rx).is_empty());
    }
}
