pub mod bluetooth;
pub mod logging;
pub mod mobiledevice;

use crate::domain::connector::Connector;
use crate::domain::models::{AppEvent, ConnectionType};
use crate::domain::settings::Settings;
use bluetooth::BluetoothConnector;
use mobiledevice::UsbmuxConnector;
use tokio::sync::mpsc;

/// One connector per transport, configured from `settings`
pub fn default_connectors(
    settings: &Settings,
    event_sender: &mpsc::UnboundedSender<AppEvent>,
) -> Vec<Box<dyn Connector>> {
    vec![
        Box::new(BluetoothConnector::new(
            settings.bluetooth.clone(),
            event_sender.clone(),
        )),
        Box::new(UsbmuxConnector::new(
            ConnectionType::Usb,
            settings.mobile_device.clone(),
            event_sender.clone(),
        )),
        Box::new(UsbmuxConnector::new(
            ConnectionType::Wifi,
            settings.mobile_device.clone(),
            event_sender.clone(),
        )),
    ]
}
