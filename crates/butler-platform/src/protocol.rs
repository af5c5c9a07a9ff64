//! Line protocol between the core and its host
//!
//! Every message is one JSON object per line. Inbound lines are method calls from the
//! policy layer, replies to requests the core made, OS signals, and simulator actions.
//! Outbound lines are replies, channel events and requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use butler_core::prelude::*;
use butler_core::{AudioStream, ChannelEvent, PlatformSignal};

/// A method call addressed to a channel
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    /// Channel name; `None` lets the method name alone pick the handler
    pub channel: Option<String>,
    pub method: String,
    pub args: Value,
}

impl MethodCall {
    pub fn new(channel: impl Into<String>, method: impl Into<String>, args: Value) -> Self {
        Self {
            channel: Some(channel.into()),
            method: method.into(),
            args,
        }
    }

    /// Boolean argument, `None` when missing or not a bool
    pub fn arg_bool(&self, name: &str) -> Option<bool> {
        self.args.get(name).and_then(Value::as_bool)
    }

    /// String argument, `None` when missing or not a string
    pub fn arg_str(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }
}

/// Actions only a simulated device understands (the host's stand-in for the outside world)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "simulate", rename_all = "camelCase")]
pub enum SimAction {
    /// Someone changes a stream volume behind the core's back
    SetVolume { stream: AudioStream, volume: u32 },
    /// Foreground activity seen by the OEM fallback detector
    #[serde(rename_all = "camelCase")]
    SetTopActivity {
        package_name: Option<String>,
        class_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SetBluetooth { device_mac: String, connected: bool },
}

/// A parsed inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Call { id: u64, call: MethodCall },
    /// Reply to a request the core sent
    Response {
        id: u64,
        result: Option<Value>,
        error: Option<Value>,
    },
    Signal(PlatformSignal),
    Simulate(SimAction),
}

/// Wire shape, tried in declaration order
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInbound {
    Signal(PlatformSignal),
    Simulate(SimAction),
    Call {
        id: u64,
        #[serde(default)]
        channel: Option<String>,
        method: String,
        #[serde(default)]
        args: Value,
    },
    Response {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    },
}

/// Parse one inbound line
pub fn parse_inbound(line: &str) -> Result<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::protocol("empty line"));
    }
    let raw: RawInbound = serde_json::from_str(line)
        .map_err(|e| Error::protocol(format!("unrecognized message: {}", e)))?;

    Ok(match raw {
        RawInbound::Signal(signal) => InboundMessage::Signal(signal),
        RawInbound::Simulate(action) => InboundMessage::Simulate(action),
        RawInbound::Call {
            id,
            channel,
            method,
            args,
        } => InboundMessage::Call {
            id,
            call: MethodCall {
                channel,
                method,
                args,
            },
        },
        RawInbound::Response { id, result, error } => {
            InboundMessage::Response { id, result, error }
        }
    })
}

/// Error body of a failed reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for WireError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Everything the core writes to its host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Reply {
        id: u64,
        result: Value,
    },
    ErrorReply {
        id: u64,
        error: WireError,
    },
    Event {
        channel: String,
        event: String,
        params: Value,
    },
    Request {
        id: u64,
        channel: String,
        method: String,
        params: Value,
    },
}

impl OutboundMessage {
    pub fn event(event: &ChannelEvent) -> Self {
        OutboundMessage::Event {
            channel: event.channel().to_string(),
            event: event.method().to_string(),
            params: event.params(),
        }
    }

    pub fn reply(id: u64, result: Result<Value>) -> Self {
        match result {
            Ok(result) => OutboundMessage::Reply { id, result },
            Err(e) => OutboundMessage::ErrorReply {
                id,
                error: WireError::from(&e),
            },
        }
    }

    /// Serialize as a single NDJSON line (no trailing newline)
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn summary(&self) -> String {
        match self {
            OutboundMessage::Reply { id, .. } => format!("Reply #{}: ok", id),
            OutboundMessage::ErrorReply { id, error } => {
                format!("Reply #{}: {}", id, error.code)
            }
            OutboundMessage::Event { event, .. } => format!("Event: {}", event),
            OutboundMessage::Request { id, method, .. } => format!("Request #{}: {}", id, method),
        }
    }
}
