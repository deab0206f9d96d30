//! Console flows
//!
//! Interactive checks that walk a device through scan, connect, location
//! writes and disconnect, printing progress the way a person at the terminal
//! wants to read it.

use crate::domain::connection_manager::ConnectionManager;
use crate::domain::connector::Connector;
use crate::domain::models::{
    AppEvent, ConnectionType, DiscoveredDevice, MessageSeverity, NamedLocation,
};
use crate::infrastructure::bluetooth::BluetoothConnector;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Print status messages from connectors until the channel closes
pub fn spawn_event_printer(mut events: mpsc::UnboundedReceiver<AppEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                AppEvent::LogMessage(status) => {
                    let marker = match status.severity {
                        MessageSeverity::Info => "·",
                        MessageSeverity::Success => "✓",
                        MessageSeverity::Warning => "⚠️",
                        MessageSeverity::Error => "❌",
                    };
                    println!("{} {}", marker, status.message);
                }
                other => debug!("Event: {:?}", other),
            }
        }
    })
}

/// 0-based index from a 1-based answer. Blank, invalid or out of range picks the first.
pub fn parse_selection(input: &str, count: usize) -> usize {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => n - 1,
        _ => 0,
    }
}

async fn prompt_selection(count: usize) -> Result<usize> {
    if count <= 1 {
        return Ok(0);
    }

    let answer = tokio::task::spawn_blocking(|| -> std::io::Result<String> {
        print!("\nSelect a device by number (or press Enter for first): ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .context("Selection prompt panicked")??;

    Ok(parse_selection(&answer, count))
}

pub fn print_devices(devices: &BTreeMap<String, DiscoveredDevice>) {
    println!("\nAvailable devices:");
    for (idx, (device_id, device)) in devices.iter().enumerate() {
        let signal = device
            .rssi
            .map(|rssi| format!(" - Signal: {} dBm", rssi))
            .unwrap_or_default();
        println!(
            "{}. {} ({}) - Type: {}{}",
            idx + 1,
            device.name,
            device_id,
            device.connection_type,
            signal
        );
    }
}

pub async fn run_scan(manager: &mut ConnectionManager, transport: Option<ConnectionType>) -> bool {
    let devices = manager.scan_devices(transport).await;
    if devices.is_empty() {
        println!("No devices found");
        return false;
    }
    println!("Found {} device(s)", devices.len());
    print_devices(&devices);
    true
}

async fn set_named(manager: &mut ConnectionManager, location: &NamedLocation) -> bool {
    let c = location.coordinate;
    println!(
        "Setting location to {}, {} ({})",
        c.latitude, c.longitude, location.name
    );
    match manager.set_location(c.latitude, c.longitude).await {
        Ok(()) => {
            println!("\n✓ Location set successfully!");
            true
        }
        Err(e) => {
            println!("\n❌ Failed to set location: {}", e);
            false
        }
    }
}

/// Scan, select, connect, set two locations five seconds apart, disconnect
pub async fn run_connection_test(
    manager: &mut ConnectionManager,
    transport: Option<ConnectionType>,
) -> Result<bool> {
    let label = transport.map_or("all".to_string(), |t| t.to_string());
    println!("Testing {} connections...", label);

    println!("\n1. Scanning for devices...");
    let devices = manager.scan_devices(transport).await;
    if devices.is_empty() {
        println!("\n❌ No devices found");
        return Ok(false);
    }
    println!("\n✓ Found {} device(s)", devices.len());
    print_devices(&devices);

    let selection = prompt_selection(devices.len()).await?;
    let Some((device_id, device)) = devices.iter().nth(selection) else {
        return Ok(false);
    };

    println!("\n2. Connecting to {} ({})...", device.name, device_id);
    if let Err(e) = manager.connect(device_id).await {
        println!("\n❌ Failed to connect to the selected device: {}", e);
        return Ok(false);
    }
    println!("\n✓ Connected successfully!");

    println!("\n3. Testing location setting...");
    set_named(manager, &NamedLocation::san_francisco()).await;

    println!("\nWaiting 5 seconds for location to take effect...");
    tokio::time::sleep(Duration::from_secs(5)).await;

    println!("\n4. Testing another location...");
    let location_set = set_named(manager, &NamedLocation::new_york()).await;

    println!("\n5. Disconnecting...");
    manager.disconnect().await?;
    println!("✓ Device disconnected");

    if location_set {
        println!("\n🎉 Connection test completed successfully!");
    } else {
        println!("\n⚠️ Connection established but location setting may have failed");
    }
    Ok(location_set)
}

/// Discovery, connect and one location write against the bare BLE connector
pub async fn run_bluetooth_test(
    connector: &mut BluetoothConnector,
    timeout: Duration,
) -> Result<bool> {
    println!("Testing Bluetooth connectivity...");

    println!("\n1. Scanning for Bluetooth devices...");
    let devices: BTreeMap<String, DiscoveredDevice> = connector
        .discover_devices_for(timeout)
        .await?
        .into_iter()
        .map(|d| (d.id().to_string(), d))
        .collect();

    if devices.is_empty() {
        println!("\n❌ No Bluetooth devices found nearby");
        return Ok(false);
    }
    println!("\n✓ Found {} device(s)", devices.len());
    print_devices(&devices);

    let selection = prompt_selection(devices.len()).await?;
    let Some(device) = devices.values().nth(selection) else {
        return Ok(false);
    };

    println!(
        "\n2. Attempting to connect to {} ({})...",
        device.name, device.address
    );
    if let Err(e) = connector.connect(&device.address).await {
        println!("\n❌ Failed to connect to the selected device: {}", e);
        return Ok(false);
    }
    println!("\n✓ Connected successfully to {}", device.name);

    println!("\n3. Testing location sending capability...");
    let location = NamedLocation::san_francisco();
    println!(
        "Sending test location: {}, {}",
        location.coordinate.latitude, location.coordinate.longitude
    );
    let sent = match connector.send_location(location.coordinate).await {
        Ok(()) => {
            println!("\n✓ Location data sent successfully");
            true
        }
        Err(e) => {
            println!("\n❌ Failed to send location data: {}", e);
            false
        }
    };

    println!("\n4. Disconnecting...");
    connector.disconnect().await?;
    println!("✓ Device disconnected");

    if sent {
        println!("\n🎉 Bluetooth test completed successfully!");
    } else {
        println!("\n⚠️ Bluetooth connected but location services may not be available");
    }
    Ok(sent)
}

/// Connect to the first USB device, set a location, then restore the real GPS
pub async fn run_usb_test(manager: &mut ConnectionManager) -> Result<bool> {
    println!("Testing iPhone connection...");

    let devices = manager.scan_devices(Some(ConnectionType::Usb)).await;
    let Some(device_id) = devices.keys().next().cloned() else {
        println!("\n❌ No USB devices found");
        return Ok(false);
    };

    manager.connect(&device_id).await?;
    let info = manager.get_current_connection_info().device_info;
    let field = |key: &str, fallback: &str| {
        info.get(key).cloned().unwrap_or_else(|| fallback.to_string())
    };
    println!("✓ Connected to: {}", field("DeviceName", "Unknown Device"));
    println!("✓ iOS Version: {}", field("ProductVersion", "Unknown"));
    println!("✓ Device UDID: {}", field("UniqueDeviceID", "Unknown"));

    let location = NamedLocation::san_francisco();
    println!(
        "Testing location set to: {}, {}",
        location.coordinate.latitude, location.coordinate.longitude
    );
    manager
        .set_location(location.coordinate.latitude, location.coordinate.longitude)
        .await?;
    println!("✓ Location set successfully");

    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("Restoring real GPS...");
    manager.clear_location().await?;
    println!("✓ Real GPS restored");

    manager.disconnect().await?;
    println!("\n🎉 All tests passed! Your setup is working correctly.");
    Ok(true)
}
