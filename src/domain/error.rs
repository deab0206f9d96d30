use crate::domain::models::ConnectionType;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to a device over any transport
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Unknown device ID format: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid coordinate: {latitude}, {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Not connected to any device")]
    NotConnected,

    #[error("Operation not supported over {0}")]
    Unsupported(ConnectionType),

    #[error("No Bluetooth adapter available")]
    NoAdapter,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Characteristic {0} not found on device")]
    CharacteristicNotFound(String),

    #[error("Connection to device lost")]
    LinkLost,

    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    #[error("{program} exited with {status}: {stderr}")]
    Tool {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("{program} did not finish within {timeout:?}")]
    ToolTimeout { program: String, timeout: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed tool output: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConnectionError {
    /// True when the link dropped and a reconnect might recover
    pub fn is_link_error(&self) -> bool {
        matches!(
            self,
            Self::LinkLost | Self::NotConnected | Self::Bluetooth(btleplug::Error::NotConnected)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
