//! BLE Connection Module
//!
//! Handles the GATT connection, service discovery and characteristic lookup.

use crate::domain::error::{ConnectionError, Result};
use crate::domain::models::{AppEvent, MessageSeverity, StatusMessage};
use crate::domain::settings::BluetoothSettings;
use crate::infrastructure::bluetooth::protocol;
use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum connect attempts
    pub max_retries: u32,
    /// Delay between connect attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Service that carries the location characteristic
    pub service_uuid: String,
    /// Characteristic the location payload is written to
    pub location_char_uuid: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            service_uuid: protocol::LOCATION_SERVICE_UUID.to_string(),
            location_char_uuid: protocol::LOCATION_CHAR_UUID.to_string(),
        }
    }
}

impl From<&BluetoothSettings> for ConnectionConfig {
    fn from(s: &BluetoothSettings) -> Self {
        Self {
            max_retries: s.connect_max_retries,
            retry_delay_ms: s.connect_retry_delay_ms,
            service_uuid: s.location_service_uuid.clone(),
            location_char_uuid: s.location_char_uuid.clone(),
        }
    }
}

/// BLE Connection handler
pub struct BleConnection {
    event_sender: mpsc::UnboundedSender<AppEvent>,
    config: ConnectionConfig,
}

impl BleConnection {
    pub fn new(event_sender: mpsc::UnboundedSender<AppEvent>, config: ConnectionConfig) -> Self {
        Self {
            event_sender,
            config,
        }
    }

    /// Connect and discover services, returning a summary of the GATT table
    pub async fn connect(&self, peripheral: &Peripheral) -> Result<BTreeMap<String, String>> {
        let address = peripheral.id();
        info!("Connecting to device: {}", address);
        self.send_log("Connecting to device...", MessageSeverity::Info);

        // Step 1: Connect with retry
        self.connect_with_retry(peripheral).await?;

        if !peripheral.is_connected().await? {
            error!("Failed to connect to {}", address);
            return Err(ConnectionError::LinkLost);
        }
        info!("Successfully connected to {}", address);

        // Step 2: Discover services
        peripheral.discover_services().await?;
        let info = self.log_services(peripheral);

        self.send_log("Connection established!", MessageSeverity::Success);
        Ok(info)
    }

    async fn connect_with_retry(&self, peripheral: &Peripheral) -> Result<()> {
        let attempts = self.config.max_retries.max(1);

        for attempt in 1..=attempts {
            match peripheral.connect().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempt, e);
                    if attempt < attempts {
                        info!("Retrying in {} ms...", self.config.retry_delay_ms);
                        tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms))
                            .await;
                    } else {
                        error!("Failed to connect after {} attempts", attempt);
                        return Err(e.into());
                    }
                }
            }
        }

        Err(ConnectionError::LinkLost)
    }

    /// Log every service and characteristic the device exposes
    fn log_services(&self, peripheral: &Peripheral) -> BTreeMap<String, String> {
        let services = peripheral.services();
        info!("Services available: {}", services.len());

        let service_uuid = protocol::parse_uuid(&self.config.service_uuid).ok();
        let mut has_location_service = false;

        for service in &services {
            info!("Service: {}", service.uuid);
            for characteristic in &service.characteristics {
                info!(
                    "  Characteristic: {} ({:?})",
                    characteristic.uuid, characteristic.properties
                );
            }
            has_location_service |= Some(service.uuid) == service_uuid;
        }

        let mut info = BTreeMap::new();
        info.insert("id".to_string(), peripheral.id().to_string());
        info.insert("mac".to_string(), peripheral.address().to_string());
        info.insert("services".to_string(), services.len().to_string());
        info.insert(
            "location_service".to_string(),
            has_location_service.to_string(),
        );
        info
    }

    /// Locate the configured location characteristic on a connected device
    pub fn find_location_characteristic(&self, peripheral: &Peripheral) -> Result<Characteristic> {
        let char_uuid = protocol::parse_uuid(&self.config.location_char_uuid)?;
        if protocol::is_placeholder(&char_uuid) {
            warn!("Location characteristic UUID is still the placeholder");
        }
        find_characteristic(peripheral.characteristics(), char_uuid)
    }

    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

fn find_characteristic(
    characteristics: impl IntoIterator<Item = Characteristic>,
    uuid: Uuid,
) -> Result<Characteristic> {
    characteristics
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| ConnectionError::CharacteristicNotFound(uuid.to_string()))
}
