//! pymobiledevice3 command lines and output parsing

use crate::domain::error::Result;
use crate::domain::models::{ConnectionType, Coordinate, DiscoveredDevice};
use crate::domain::settings::MobileDeviceSettings;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Lockdown keys surfaced as device info
pub const INFO_KEYS: &[&str] = &[
    "DeviceName",
    "ProductVersion",
    "ProductType",
    "BuildVersion",
    "DeviceClass",
    "UniqueDeviceID",
];

/// One entry of `usbmux list`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UsbmuxRecord {
    device_name: Option<String>,
    #[serde(rename = "UniqueDeviceID")]
    unique_device_id: Option<String>,
    identifier: Option<String>,
    product_version: Option<String>,
    product_type: Option<String>,
    connection_type: Option<String>,
}

/// Value of the `ConnectionType` field for a transport
fn usbmux_connection_type(transport: ConnectionType) -> Option<&'static str> {
    match transport {
        ConnectionType::Usb => Some("USB"),
        ConnectionType::Wifi => Some("Network"),
        _ => None,
    }
}

pub fn list_args(settings: &MobileDeviceSettings, transport: ConnectionType) -> Vec<String> {
    let mut args = settings.list_args.clone();
    match transport {
        ConnectionType::Usb if !settings.usb_flag.is_empty() => args.push(settings.usb_flag.clone()),
        ConnectionType::Wifi if !settings.network_flag.is_empty() => {
            args.push(settings.network_flag.clone())
        }
        _ => {}
    }
    args
}

pub fn info_args(settings: &MobileDeviceSettings, udid: &str) -> Vec<String> {
    with_udid(&settings.info_args, udid)
}

pub fn set_args(settings: &MobileDeviceSettings, udid: &str, coordinate: &Coordinate) -> Vec<String> {
    let mut args = with_udid(&settings.set_args, udid);
    // "--" keeps negative coordinates from being read as options
    args.push("--".to_string());
    args.push(coordinate.latitude.to_string());
    args.push(coordinate.longitude.to_string());
    args
}

pub fn clear_args(settings: &MobileDeviceSettings, udid: &str) -> Vec<String> {
    with_udid(&settings.clear_args, udid)
}

fn with_udid(base: &[String], udid: &str) -> Vec<String> {
    let mut args = base.to_vec();
    args.push("--udid".to_string());
    args.push(udid.to_string());
    args
}

/// Parse `usbmux list` output, keeping devices attached over `transport`
pub fn parse_device_list(output: &str, transport: ConnectionType) -> Result<Vec<DiscoveredDevice>> {
    let records: Vec<UsbmuxRecord> = serde_json::from_str(output.trim())?;
    let wanted = usbmux_connection_type(transport);

    let devices = records
        .into_iter()
        .filter(|r| match (wanted, r.connection_type.as_deref()) {
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            _ => true,
        })
        .filter_map(|r| {
            let udid = r.unique_device_id.or(r.identifier)?;
            let mut device = DiscoveredDevice::new(r.device_name, udid, transport);
            if let Some(version) = r.product_version {
                device.details.insert("ProductVersion".to_string(), version);
            }
            if let Some(product) = r.product_type {
                device.details.insert("ProductType".to_string(), product);
            }
            Some(device)
        })
        .collect();

    Ok(devices)
}

/// Parse `lockdown info` output into the [`INFO_KEYS`] subset
pub fn parse_device_info(output: &str) -> Result<BTreeMap<String, String>> {
    let values: serde_json::Map<String, serde_json::Value> = serde_json::from_str(output.trim())?;

    let info = INFO_KEYS
        .iter()
        .filter_map(|key| {
            let value = match values.get(*key)? {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.to_string(), value))
        })
        .collect();

    Ok(info)
}
