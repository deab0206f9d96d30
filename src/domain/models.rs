use crate::domain::error::ConnectionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Transport used to reach a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Usb,
    Wifi,
    Bluetooth,
    None,
}

impl ConnectionType {
    /// Transports that can actually carry a connection
    pub const TRANSPORTS: [ConnectionType; 3] = [Self::Bluetooth, Self::Usb, Self::Wifi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Wifi => "wifi",
            Self::Bluetooth => "bluetooth",
            Self::None => "none",
        }
    }

    /// Prefix used in device ids ("bt_AA:BB:..", "usb_<udid>")
    pub fn id_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Usb => Some("usb_"),
            Self::Wifi => Some("wifi_"),
            Self::Bluetooth => Some("bt_"),
            Self::None => None,
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-qualified device identifier, written as `<prefix><address>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub transport: ConnectionType,
    pub address: String,
}

impl DeviceId {
    pub fn new(transport: ConnectionType, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
        }
    }
}

impl FromStr for DeviceId {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for transport in ConnectionType::TRANSPORTS {
            if let Some(prefix) = transport.id_prefix() {
                if let Some(address) = s.strip_prefix(prefix) {
                    if address.is_empty() {
                        break;
                    }
                    return Ok(Self::new(transport, address));
                }
            }
        }
        Err(ConnectionError::InvalidDeviceId(s.to_string()))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.transport.id_prefix().unwrap_or_default();
        write!(f, "{}{}", prefix, self.address)
    }
}

/// A device found during a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl DiscoveredDevice {
    pub fn new(
        name: Option<String>,
        address: impl Into<String>,
        connection_type: ConnectionType,
    ) -> Self {
        Self {
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            address: address.into(),
            rssi: None,
            connection_type,
            details: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> DeviceId {
        DeviceId::new(self.connection_type, self.address.clone())
    }
}

/// A validated GPS coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ConnectionError> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(ConnectionError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedLocation {
    pub name: String,
    pub coordinate: Coordinate,
}

impl NamedLocation {
    pub fn san_francisco() -> Self {
        Self {
            name: "San Francisco".to_string(),
            coordinate: Coordinate {
                latitude: 37.7749,
                longitude: -122.4194,
            },
        }
    }

    pub fn new_york() -> Self {
        Self {
            name: "New York".to_string(),
            coordinate: Coordinate {
                latitude: 40.7128,
                longitude: -74.0060,
            },
        }
    }
}

/// Snapshot of the manager's current connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub connected: bool,
    pub connection_type: ConnectionType,
    pub device_id: Option<String>,
    pub device_info: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    DeviceFound(DiscoveredDevice),
    ConnectionStatus(ConnectionStatus),
    LocationSet(Coordinate),
    LocationCleared,
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_parsing() {
        let id: DeviceId = "bt_AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(id.transport, ConnectionType::Bluetooth);
        assert_eq!(id.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(id.to_string(), "bt_AA:BB:CC:DD:EE:FF");

        let id: DeviceId = "usb_00008030-001A".parse().unwrap();
        assert_eq!(id.transport, ConnectionType::Usb);

        let id: DeviceId = "wifi_00008030-001A".parse().unwrap();
        assert_eq!(id.transport, ConnectionType::Wifi);

        // Peripheral ids from CoreBluetooth and BlueZ
        let id: DeviceId = "bt_5A3B1C0E-7D2F-4E11-9A6B-0C8D2E4F6A10".parse().unwrap();
        assert_eq!(id.address, "5A3B1C0E-7D2F-4E11-9A6B-0C8D2E4F6A10");
        let id: DeviceId = "bt_hci0/dev_AA_BB_CC_DD_EE_FF".parse().unwrap();
        assert_eq!(id.address, "hci0/dev_AA_BB_CC_DD_EE_FF");
    }

    #[test]
    fn test_device_id_rejects_unknown_prefix() {
        assert!(matches!(
            "serial_1234".parse::<DeviceId>(),
            Err(ConnectionError::InvalidDeviceId(_))
        ));
        assert!("bt_".parse::<DeviceId>().is_err());
        assert!("".parse::<DeviceId>().is_err());
    }

    #[test]
    fn test_coordinate_bounds() {
        assert!(Coordinate::new(37.7749, -122.4194).is_ok());
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(90.5, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.1).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_unnamed_device_defaults_to_unknown() {
        let device = DiscoveredDevice::new(None, "AA", ConnectionType::Bluetooth);
        assert_eq!(device.name, "Unknown");
        let device = DiscoveredDevice::new(Some("  ".into()), "AA", ConnectionType::Bluetooth);
        assert_eq!(device.name, "Unknown");
        assert_eq!(device.id().to_string(), "bt_AA");
    }

    #[test]
    fn test_connection_type_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionType::Bluetooth).unwrap();
        assert_eq!(json, "\"bluetooth\"");
    }
}
