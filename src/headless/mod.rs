//! Headless mode - channel protocol over stdio
//!
//! Every line in either direction is one JSON object (NDJSON).
//!
//! # Input
//!
//! ```json
//! {"id":1,"channel":"flutter_butler_flutter/shutdown","method":"setArmed","args":{"armed":true}}
//! {"signal":"closeSystemDialogs","reason":"globalactions"}
//! {"id":1,"result":true}
//! {"simulate":"setVolume","stream":"music","volume":3}
//! ```
//!
//! # Output
//!
//! ```json
//! {"id":1,"result":null}
//! {"channel":"flutter_butler_flutter/audio_volume","event":"volumeForced","params":{"from":3,"to":15}}
//! {"id":1,"channel":"flutter_butler_flutter/secure_overlay","method":"verifyPin","params":{"pin":"1234"}}
//! ```

pub mod runner;

use butler_core::ComponentName;
use butler_platform::{SimAction, SimulatedDevice};
use tracing::debug;

pub use runner::{run_headless, serve, HeadlessOptions};

/// Apply a host-side simulation step to the device
pub fn apply_simulation(device: &SimulatedDevice, action: SimAction) {
    debug!("Simulate: {:?}", action);
    match action {
        SimAction::SetVolume { stream, volume } => device.set_external_volume(stream, volume),
        SimAction::SetTopActivity {
            package_name,
            class_name,
        } => {
            let component = match (package_name, class_name) {
                (None, None) => None,
                (package, class) => Some(ComponentName::new(
                    package.unwrap_or_default(),
                    class.unwrap_or_default(),
                )),
            };
            device.set_top_activity(component);
        }
        SimAction::SetBluetooth {
            device_mac,
            connected,
        } => device.set_bluetooth_connected(&device_mac, connected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use butler_core::AudioStream;
    use butler_platform::{ClassicBluetooth, TaskInspector};

    #[test]
    fn test_set_volume_bypasses_core() {
        let device = SimulatedDevice::new();
        apply_simulation(
            &device,
            SimAction::SetVolume {
                stream: AudioStream::Music,
                volume: 2,
            },
        );
        assert_eq!(device.volume(AudioStream::Music), 2);
    }

    #[test]
    fn test_top_activity_set_and_cleared() {
        let device = SimulatedDevice::new();
        apply_simulation(
            &device,
            SimAction::SetTopActivity {
                package_name: Some("com.android.systemui".to_string()),
                class_name: Some("GlobalActionsDialog".to_string()),
            },
        );
        let top = device.top_activity().unwrap().unwrap();
        assert_eq!(top.class, "GlobalActionsDialog");

        apply_simulation(
            &device,
            SimAction::SetTopActivity {
                package_name: None,
                class_name: None,
            },
        );
        assert!(device.top_activity().unwrap().is_none());
    }

    #[test]
    fn test_bluetooth_toggle() {
        let device = SimulatedDevice::new();
        apply_simulation(
            &device,
            SimAction::SetBluetooth {
                device_mac: "00:11:22:33:44:55".to_string(),
                connected: true,
            },
        );
        assert!(device.is_device_connected("00:11:22:33:44:55").unwrap());
    }
}
