//! Method-call handling
//!
//! Turns a parsed [`Command`] into engine operations and a JSON reply value. Setters answer
//! `null`, queries answer a boolean.

use serde_json::Value;

use butler_core::prelude::*;
use butler_core::TriggerType;
use butler_platform::{Command, MethodCall, PinVerifier};

use crate::engine::Engine;

/// Run one command against the engine
pub fn handle_command<V>(engine: &Engine<V>, command: Command) -> Result<Value>
where
    V: PinVerifier + Sync + 'static,
{
    debug!("Command: {}", command.description());

    let reply = match command {
        Command::StartAlert => {
            engine.alert().start_alert();
            Value::Null
        }
        Command::StopAlert => {
            engine.alert().stop_alert();
            Value::Null
        }
        Command::IsAlertActive => Value::Bool(engine.alert().is_active()),
        Command::SetArmed { armed } => {
            engine.set_armed(armed);
            Value::Null
        }
        Command::IsProtectionActive => Value::Bool(engine.protection().is_active()),
        Command::TriggerEmergencyAlarm => {
            engine
                .orchestrator()
                .trigger_emergency_alarm(TriggerType::FlutterTrigger);
            Value::Null
        }
        Command::OnShutdownAttempt { trigger_type } => {
            warn!("Shutdown attempt reported by policy layer: {}", trigger_type);
            Value::Null
        }
        Command::OpenAccessibilitySettings => {
            if let Err(e) = engine.services().navigator.open_accessibility_settings() {
                error!("Could not open accessibility settings: {}", e);
            }
            Value::Null
        }
        Command::LockVolume => Value::Bool(engine.volume_lock().lock_volume()),
        Command::UnlockVolume => {
            engine.volume_lock().unlock_volume();
            Value::Null
        }
        Command::IsVolumeLocked => Value::Bool(engine.volume_lock().is_locked()),
        Command::IsClassicDeviceConnected { device_mac } => {
            let connected = engine
                .services()
                .bluetooth
                .is_device_connected(&device_mac)
                .unwrap_or_else(|e| {
                    warn!("Bluetooth check for {} failed: {}", device_mac, e);
                    false
                });
            Value::Bool(connected)
        }
    };
    Ok(reply)
}

/// Parse and run a method call, then send the reply over the bridge
pub fn handle_call<V>(engine: &Engine<V>, id: u64, call: &MethodCall)
where
    V: PinVerifier + Sync + 'static,
{
    let result = Command::parse(call).and_then(|command| handle_command(engine, command));
    match &result {
        Err(e) if e.is_recoverable() => debug!("Call {} ({}) failed: {}", id, call.method, e),
        Err(e) => error!("Call {} ({}) failed: {}", id, call.method, e),
        Ok(_) => {}
    }
    engine.bridge().reply(id, result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use butler_core::{
        ALERT_CHANNEL, AUDIO_VOLUME_CHANNEL, CLASSIC_BT_CHANNEL, POWER_OFF_CHANNEL,
        SHUTDOWN_CHANNEL,
    };
    use butler_platform::test_utils::drain_outbound;
    use butler_platform::{
        ChannelBridge, Fault, MemoryPreferences, OutboundMessage, SimulatedDevice,
        DEFAULT_MAX_VOLUME,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn setup(armed: bool) -> (
        Arc<SimulatedDevice>,
        mpsc::UnboundedReceiver<OutboundMessage>,
        Engine,
    ) {
        let prefs = Arc::new(MemoryPreferences::with_value("is_armed", armed));
        let device = SimulatedDevice::with_prefs(DEFAULT_MAX_VOLUME, prefs);
        let (bridge, rx) = ChannelBridge::channel(Duration::from_secs(1));
        let engine = Engine::with_bridge(Settings::default(), device.services(), bridge).unwrap();
        (device, rx, engine)
    }

    fn call(
        engine: &Engine,
        rx: &mut mpsc::UnboundedReceiver<OutboundMessage>,
        channel: &str,
        method: &str,
        args: Value,
    ) -> OutboundMessage {
        handle_call(engine, 1, &MethodCall::new(channel, method, args));
        drain_outbound(rx)
            .into_iter()
            .find(|msg| matches!(msg, OutboundMessage::Reply { .. } | OutboundMessage::ErrorReply { .. }))
            .expect("reply")
    }

    fn result_of(msg: OutboundMessage) -> Value {
        match msg {
            OutboundMessage::Reply { result, .. } => result,
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_armed_then_query_protection() {
        let (_device, mut rx, engine) = setup(false);

        let reply = call(&engine, &mut rx, SHUTDOWN_CHANNEL, "setArmed", json!({"armed": true}));
        assert_eq!(result_of(reply), Value::Null);

        let reply = call(&engine, &mut rx, POWER_OFF_CHANNEL, "isProtectionActive", json!({}));
        assert_eq!(result_of(reply), json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_start_stop_and_query() {
        let (device, mut rx, engine) = setup(true);

        call(&engine, &mut rx, ALERT_CHANNEL, "startAlert", Value::Null);
        assert!(device.is_vibrating());
        let reply = call(&engine, &mut rx, ALERT_CHANNEL, "isAlertActive", Value::Null);
        assert_eq!(result_of(reply), json!(true));

        call(&engine, &mut rx, ALERT_CHANNEL, "stopAlert", Value::Null);
        assert!(!device.is_vibrating());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flutter_trigger_emits_alarm_event() {
        let (device, mut rx, engine) = setup(true);

        handle_call(
            &engine,
            5,
            &MethodCall::new(POWER_OFF_CHANNEL, "triggerEmergencyAlarm", Value::Null),
        );
        let messages = drain_outbound(&mut rx);
        assert!(messages.iter().any(|msg| matches!(
            msg,
            OutboundMessage::Event { event, params, .. }
                if event == "emergencyAlarm" && params["triggerType"] == "FLUTTER_TRIGGER"
        )));
        assert!(device.torch_on());
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_lock_commands() {
        let (_device, mut rx, engine) = setup(true);

        let reply = call(&engine, &mut rx, AUDIO_VOLUME_CHANNEL, "lockVolume", Value::Null);
        assert_eq!(result_of(reply), json!(true));
        let reply = call(&engine, &mut rx, AUDIO_VOLUME_CHANNEL, "isVolumeLocked", Value::Null);
        assert_eq!(result_of(reply), json!(true));

        call(&engine, &mut rx, AUDIO_VOLUME_CHANNEL, "unlockVolume", Value::Null);
        assert!(!engine.volume_lock().is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_classic_bluetooth_query() {
        let (device, mut rx, engine) = setup(false);
        device.set_bluetooth_connected("aa:bb:cc:dd:ee:ff", true);

        let reply = call(
            &engine,
            &mut rx,
            CLASSIC_BT_CHANNEL,
            "isClassicDeviceConnected",
            json!({"deviceMac": "AA:BB:CC:DD:EE:FF"}),
        );
        assert_eq!(result_of(reply), json!(true));

        device.inject_fault(Fault::Bluetooth);
        let reply = call(
            &engine,
            &mut rx,
            CLASSIC_BT_CHANNEL,
            "isClassicDeviceConnected",
            json!({"deviceMac": "AA:BB:CC:DD:EE:FF"}),
        );
        assert_eq!(result_of(reply), json!(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_become_error_replies() {
        let (_device, mut rx, engine) = setup(false);

        match call(&engine, &mut rx, CLASSIC_BT_CHANNEL, "isClassicDeviceConnected", json!({})) {
            OutboundMessage::ErrorReply { error, .. } => assert_eq!(error.code, "INVALID_ARGUMENT"),
            other => panic!("unexpected {:?}", other),
        }
        match call(&engine, &mut rx, ALERT_CHANNEL, "selfDestruct", Value::Null) {
            OutboundMessage::ErrorReply { error, .. } => assert_eq!(error.code, "NOT_IMPLEMENTED"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_settings_and_shutdown_attempt() {
        let (device, mut rx, engine) = setup(false);

        call(&engine, &mut rx, SHUTDOWN_CHANNEL, "openAccessibilitySettings", Value::Null);
        assert_eq!(device.settings_opened(), 1);

        let reply = call(
            &engine,
            &mut rx,
            SHUTDOWN_CHANNEL,
            "onShutdownAttempt",
            json!({"triggerType": "ACTION_SHUTDOWN"}),
        );
        assert_eq!(result_of(reply), Value::Null);
    }
}
