//! BLE Scanner Module
//!
//! Time-boxed Bluetooth LE discovery on the first available adapter.

use crate::domain::error::{ConnectionError, Result};
use crate::domain::models::{
    AppEvent, ConnectionType, DiscoveredDevice, MessageSeverity, StatusMessage,
};
use btleplug::api::{Central, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// A scan hit together with the handle needed to connect to it
pub struct ScanResult {
    pub peripheral: Peripheral,
    pub device: DiscoveredDevice,
}

pub struct BleScanner {
    adapter: Option<Adapter>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl BleScanner {
    pub fn new(event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            adapter: None,
            event_sender,
        }
    }

    /// First system adapter, resolved once
    async fn adapter(&mut self) -> Result<Adapter> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }

        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(ConnectionError::NoAdapter)?;

        if let Ok(info) = adapter.adapter_info().await {
            info!("Using Bluetooth adapter: {}", info);
        }
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    /// Scan for `timeout` and return every peripheral seen.
    ///
    /// With `service_filter` set, only advertisers of that service are reported.
    pub async fn scan(
        &mut self,
        timeout: Duration,
        service_filter: Option<Uuid>,
    ) -> Result<Vec<ScanResult>> {
        let adapter = self.adapter().await?;

        info!("Scanning for Bluetooth devices (timeout: {}s)...", timeout.as_secs());
        self.send_log("Scanning for Bluetooth devices...", MessageSeverity::Info);

        let filter = ScanFilter {
            services: service_filter.into_iter().collect(),
        };
        adapter.start_scan(filter).await?;
        tokio::time::sleep(timeout).await;
        adapter.stop_scan().await?;

        let mut results = Vec::new();
        for peripheral in adapter.peripherals().await? {
            let Some(properties) = peripheral.properties().await? else {
                continue;
            };
            if let Some(service) = service_filter {
                if !properties.services.contains(&service) {
                    continue;
                }
            }

            let device = to_discovered_device(&peripheral.id().to_string(), &properties);
            info!("Found device: {} ({})", device.name, device.address);
            let _ = self.event_sender.send(AppEvent::DeviceFound(device.clone()));
            results.push(ScanResult { peripheral, device });
        }

        debug!("Scan complete: {} device(s)", results.len());
        Ok(results)
    }

    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

/// Flatten advertisement properties into a device record keyed by `id`.
///
/// `id` is the platform peripheral id. CoreBluetooth hides the MAC and reports
/// 00:00:00:00:00:00 for every device, so the address cannot serve as a key.
pub fn to_discovered_device(id: &str, properties: &PeripheralProperties) -> DiscoveredDevice {
    let mut device =
        DiscoveredDevice::new(properties.local_name.clone(), id, ConnectionType::Bluetooth);
    device.rssi = properties.rssi;
    device
        .details
        .insert("mac".to_string(), properties.address.to_string());

    if !properties.services.is_empty() {
        let services: Vec<String> = properties.services.iter().map(|u| u.to_string()).collect();
        device
            .details
            .insert("services".to_string(), services.join(","));
    }
    if !properties.manufacturer_data.is_empty() {
        let mut ids: Vec<u16> = properties.manufacturer_data.keys().copied().collect();
        ids.sort_unstable();
        let ids: Vec<String> = ids.iter().map(|id| format!("{:#06x}", id)).collect();
        device
            .details
            .insert("manufacturer_ids".to_string(), ids.join(","));
    }
    if let Some(tx_power) = properties.tx_power_level {
        device
            .details
            .insert("tx_power".to_string(), tx_power.to_string());
    }

    device
}
