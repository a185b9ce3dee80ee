//! Inbound/outbound JSON message shapes for the WebSocket dispatch
//! facade.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Inbound {
    Scan,
    Connect { address: String },
    Disconnect,
    ReadKey,
    ReadEvents {
        #[serde(default)]
        clear: bool,
    },
    ClearEvents,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Log { message: String, level: String },
    Error { message: String },
    Status {
        connected: bool,
        authenticated: bool,
        device: String,
    },
    Devices { devices: Vec<rayonics_protocol::device::ScannedDevice> },
    KeyInfo { data: rayonics_protocol::command::KeyInfo },
    Events { data: Vec<rayonics_protocol::command::EventSlot> },
}

impl Outbound {
    pub fn log(message: impl Into<String>) -> Self {
        Outbound::Log {
            message: message.into(),
            level: "info".to_string(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Outbound::Log {
            message: message.into(),
            level: "warn".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outbound::Error {
            message: message.into(),
        }
    }
}
