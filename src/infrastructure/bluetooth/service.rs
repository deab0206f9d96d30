//! Bluetooth Connector
//!
//! [`Connector`] implementation that coordinates scanning, connection and
//! location writes over BLE.

use crate::domain::connector::Connector;
use crate::domain::error::{ConnectionError, Result};
use crate::domain::models::{
    AppEvent, ConnectionType, Coordinate, DiscoveredDevice, MessageSeverity, StatusMessage,
};
use crate::domain::settings::BluetoothSettings;
use crate::infrastructure::bluetooth::{
    connection::{BleConnection, ConnectionConfig},
    protocol,
    scanner::{BleScanner, ScanResult},
};
use async_trait::async_trait;
use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub struct BluetoothConnector {
    peripheral: Option<Peripheral>,
    discovered: BTreeMap<String, ScanResult>,
    scanner: BleScanner,
    connection: BleConnection,
    settings: BluetoothSettings,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl BluetoothConnector {
    pub fn new(settings: BluetoothSettings, event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            peripheral: None,
            discovered: BTreeMap::new(),
            scanner: BleScanner::new(event_sender.clone()),
            connection: BleConnection::new(event_sender.clone(), ConnectionConfig::from(&settings)),
            settings,
            event_sender,
        }
    }

    /// Scan for `timeout`, replacing the cache of discovered devices
    pub async fn discover_devices_for(&mut self, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        let filter = if self.settings.show_all_devices {
            None
        } else {
            Some(protocol::parse_uuid(&self.settings.location_service_uuid)?)
        };

        let results = self.scanner.scan(timeout, filter).await?;

        self.discovered.clear();
        for result in results {
            self.discovered.insert(result.device.address.clone(), result);
        }

        Ok(self.discovered.values().map(|r| r.device.clone()).collect())
    }

    /// Peripheral for `address`, scanning once if it is not cached
    async fn resolve(&mut self, address: &str) -> Result<Peripheral> {
        if let Some(result) = self.lookup(address) {
            return Ok(result.peripheral.clone());
        }

        info!("{} not in scan cache, scanning...", address);
        self.discover_devices().await?;
        self.lookup(address)
            .map(|r| r.peripheral.clone())
            .ok_or_else(|| ConnectionError::DeviceNotFound(address.to_string()))
    }

    fn lookup(&self, address: &str) -> Option<&ScanResult> {
        self.discovered
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(address))
            .map(|(_, result)| result)
    }

    fn send_log(&self, message: impl Into<String>, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

/// A peripheral that drops mid-write reports `NotConnected`
fn write_error(e: btleplug::Error) -> ConnectionError {
    match e {
        btleplug::Error::NotConnected => ConnectionError::LinkLost,
        other => ConnectionError::Bluetooth(other),
    }
}

#[async_trait]
impl Connector for BluetoothConnector {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Bluetooth
    }

    async fn discover_devices(&mut self) -> Result<Vec<DiscoveredDevice>> {
        let timeout = Duration::from_secs(self.settings.scan_timeout_secs);
        self.discover_devices_for(timeout).await
    }

    async fn connect(&mut self, address: &str) -> Result<BTreeMap<String, String>> {
        self.disconnect().await?;

        let peripheral = self.resolve(address).await?;
        let mut info = self.connection.connect(&peripheral).await?;

        if let Some(result) = self.lookup(address) {
            info.insert("name".to_string(), result.device.name.clone());
        }
        self.peripheral = Some(peripheral);
        Ok(info)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(peripheral) = self.peripheral.take() {
            if peripheral.is_connected().await.unwrap_or(false) {
                if let Err(e) = peripheral.disconnect().await {
                    error!("Error disconnecting: {}", e);
                    self.peripheral = Some(peripheral);
                    return Err(e.into());
                }
            }
            info!("Device disconnected");
            self.send_log("Device disconnected", MessageSeverity::Info);
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        match &self.peripheral {
            Some(peripheral) => peripheral.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    async fn send_location(&mut self, coordinate: Coordinate) -> Result<()> {
        let Some(peripheral) = &self.peripheral else {
            error!("Not connected to any device");
            return Err(ConnectionError::NotConnected);
        };

        if !peripheral.is_connected().await.unwrap_or(false) {
            warn!("Peripheral {} dropped the connection", peripheral.id());
            return Err(ConnectionError::LinkLost);
        }

        let characteristic = self.connection.find_location_characteristic(peripheral)?;
        let write_type = protocol::choose_write_type(characteristic.properties).ok_or_else(|| {
            ConnectionError::CharacteristicNotFound(format!(
                "{} (not writable)",
                characteristic.uuid
            ))
        })?;

        let payload = protocol::encode_location(&coordinate);
        peripheral
            .write(&characteristic, &payload, write_type)
            .await
            .map_err(write_error)?;

        info!("Location sent: {}", coordinate);
        Ok(())
    }
}
