//! USB and Wi-Fi connector
//!
//! Talks to usbmuxd-attached devices through the pymobiledevice3 tool. USB and
//! network-paired devices share this connector and differ only in the listing
//! flag. Nothing stays open between commands, so "connected" means the device
//! answered a lockdown query.

use crate::domain::connector::Connector;
use crate::domain::error::{ConnectionError, Result};
use crate::domain::models::{
    AppEvent, ConnectionType, Coordinate, DiscoveredDevice, MessageSeverity, StatusMessage,
};
use crate::domain::settings::MobileDeviceSettings;
use crate::infrastructure::mobiledevice::protocol;
use crate::infrastructure::mobiledevice::runner::{CommandRunner, ProcessRunner};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

pub struct UsbmuxConnector<R = ProcessRunner> {
    transport: ConnectionType,
    udid: Option<String>,
    runner: R,
    settings: MobileDeviceSettings,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl UsbmuxConnector<ProcessRunner> {
    pub fn new(
        transport: ConnectionType,
        settings: MobileDeviceSettings,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let runner = ProcessRunner::new(
            settings.program.clone(),
            Duration::from_secs(settings.command_timeout_secs),
        );
        Self::with_runner(transport, settings, runner, event_sender)
    }
}

impl<R: CommandRunner> UsbmuxConnector<R> {
    pub fn with_runner(
        transport: ConnectionType,
        settings: MobileDeviceSettings,
        runner: R,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            transport,
            udid: None,
            runner,
            settings,
            event_sender,
        }
    }

    fn connected_udid(&self) -> Result<&str> {
        self.udid.as_deref().ok_or_else(|| {
            error!("Not connected to any device");
            ConnectionError::NotConnected
        })
    }

    fn send_log(&self, message: impl Into<String>, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

#[async_trait]
impl<R: CommandRunner> Connector for UsbmuxConnector<R> {
    fn connection_type(&self) -> ConnectionType {
        self.transport
    }

    async fn discover_devices(&mut self) -> Result<Vec<DiscoveredDevice>> {
        info!("Scanning for {} devices...", self.transport);
        let output = self
            .runner
            .run(&protocol::list_args(&self.settings, self.transport))
            .await?;

        let devices = protocol::parse_device_list(&output, self.transport)?;
        for device in &devices {
            info!("Found device: {} ({})", device.name, device.address);
        }
        Ok(devices)
    }

    async fn connect(&mut self, address: &str) -> Result<BTreeMap<String, String>> {
        self.udid = None;
        info!("Querying lockdown on {}", address);

        let output = self
            .runner
            .run(&protocol::info_args(&self.settings, address))
            .await?;
        let info = protocol::parse_device_info(&output)?;

        let name = info.get("DeviceName").map(String::as_str).unwrap_or("Unknown Device");
        let version = info.get("ProductVersion").map(String::as_str).unwrap_or("Unknown");
        info!("Connected to: {} (iOS {})", name, version);
        self.send_log(
            format!("Connected to {} (iOS {})", name, version),
            MessageSeverity::Success,
        );

        self.udid = Some(address.to_string());
        Ok(info)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.udid.take().is_some() {
            info!("Device disconnected");
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.udid.is_some()
    }

    async fn send_location(&mut self, coordinate: Coordinate) -> Result<()> {
        let udid = self.connected_udid()?;
        let args = protocol::set_args(&self.settings, udid, &coordinate);
        self.runner.run(&args).await?;
        info!("Location set: {}", coordinate);
        Ok(())
    }

    async fn clear_location(&mut self) -> Result<()> {
        let udid = self.connected_udid()?;
        let args = protocol::clear_args(&self.settings, udid);
        self.runner.run(&args).await?;
        info!("Real GPS restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Replies with canned output keyed by the subcommand
    #[derive(Clone, Default)]
    struct ScriptedRunner {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        fail_set: bool,
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, args: &[String]) -> Result<String> {
            self.calls.lock().unwrap().push(args.to_vec());
            match args.first().map(String::as_str) {
                Some("usbmux") => Ok(r#"[
                    {"ConnectionType": "USB", "DeviceName": "Test iPhone", "UniqueDeviceID": "UDID-1"},
                    {"ConnectionType": "Network", "DeviceName": "Desk iPad", "UniqueDeviceID": "UDID-2"}
                ]"#
                .to_string()),
                Some("lockdown") => {
                    Ok(r#"{"DeviceName": "Test iPhone", "ProductVersion": "16.6"}"#.to_string())
                }
                Some("developer") if self.fail_set => Err(ConnectionError::Tool {
                    program: "pymobiledevice3".into(),
                    status: 1,
                    stderr: "DeveloperDiskImage not mounted".into(),
                }),
                _ => Ok(String::new()),
            }
        }
    }

    fn connector(runner: ScriptedRunner) -> UsbmuxConnector<ScriptedRunner> {
        let (tx, _rx) = mpsc::unbounded_channel();
        UsbmuxConnector::with_runner(
            ConnectionType::Usb,
            MobileDeviceSettings::default(),
            runner,
            tx,
        )
    }

    #[tokio::test]
    async fn test_discover_keeps_usb_devices() {
        let mut usb = connector(ScriptedRunner::default());
        let devices = usb.discover_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "UDID-1");
    }

    #[tokio::test]
    async fn test_connect_then_set_and_clear() {
        let runner = ScriptedRunner::default();
        let mut usb = connector(runner.clone());

        let info = usb.connect("UDID-1").await.unwrap();
        assert_eq!(info["DeviceName"], "Test iPhone");
        assert!(usb.is_connected().await);

        usb.send_location(Coordinate::new(37.7749, -122.4194).unwrap())
            .await
            .unwrap();
        usb.clear_location().await.unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].last().map(String::as_str), Some("-122.4194"));
        assert_eq!(calls[2][2], "clear");
    }

    #[tokio::test]
    async fn test_set_without_connect_fails() {
        let runner = ScriptedRunner::default();
        let mut usb = connector(runner.clone());

        let result = usb.send_location(Coordinate::new(1.0, 1.0).unwrap()).await;

        assert!(matches!(result, Err(ConnectionError::NotConnected)));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tool_failure_surfaces_stderr() {
        let runner = ScriptedRunner {
            fail_set: true,
            ..Default::default()
        };
        let mut usb = connector(runner);
        usb.connect("UDID-1").await.unwrap();

        let err = usb
            .send_location(Coordinate::new(1.0, 1.0).unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("DeveloperDiskImage"));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut usb = connector(ScriptedRunner::default());
        usb.disconnect().await.unwrap();
        usb.connect("UDID-1").await.unwrap();
        usb.disconnect().await.unwrap();
        assert!(!usb.is_connected().await);
    }
}
