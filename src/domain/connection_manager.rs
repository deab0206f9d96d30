//! Connection Manager
//!
//! Dispatches scan, connect and location commands to the transport-specific
//! [`Connector`] that owns the device. Only one device is connected at a time.

use crate::domain::connector::Connector;
use crate::domain::error::{ConnectionError, Result};
use crate::domain::models::{
    AppEvent, ConnectionInfo, ConnectionStatus, ConnectionType, Coordinate, DeviceId,
    DiscoveredDevice, MessageSeverity, StatusMessage,
};
use crate::domain::settings::SettingsService;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

struct ActiveConnection {
    device_id: DeviceId,
    device_info: BTreeMap<String, String>,
}

pub struct ConnectionManager {
    connectors: Vec<Box<dyn Connector>>,
    current: Option<ActiveConnection>,
    status: ConnectionStatus,
    settings: Arc<Mutex<SettingsService>>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl ConnectionManager {
    /// Manager over an explicit set of connectors, one per transport
    pub fn with_connectors(
        connectors: Vec<Box<dyn Connector>>,
        settings: Arc<Mutex<SettingsService>>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            connectors,
            current: None,
            status: ConnectionStatus::Disconnected,
            settings,
            event_sender,
        }
    }

    /// Scan one transport, or every registered transport concurrently.
    ///
    /// Devices are keyed by their prefixed id (`bt_...`, `usb_...`). A transport
    /// that fails to scan is logged and skipped.
    pub async fn scan_devices(
        &mut self,
        connection_type: Option<ConnectionType>,
    ) -> BTreeMap<String, DiscoveredDevice> {
        let scans = self
            .connectors
            .iter_mut()
            .filter(|c| connection_type.map_or(true, |t| t == c.connection_type()))
            .map(|c| async move {
                let transport = c.connection_type();
                (transport, c.discover_devices().await)
            });

        let results = join_all(scans).await;

        let mut devices = BTreeMap::new();
        for (transport, result) in results {
            match result {
                Ok(found) => {
                    info!("{} scan found {} device(s)", transport, found.len());
                    for device in found {
                        let _ = self.event_sender.send(AppEvent::DeviceFound(device.clone()));
                        devices.insert(device.id().to_string(), device);
                    }
                }
                Err(e) => {
                    error!("Error scanning for {} devices: {}", transport, e);
                    self.send_log(
                        format!("{} scan failed: {}", transport, e),
                        MessageSeverity::Warning,
                    );
                }
            }
        }

        devices
    }

    /// Connect to a device by prefixed id, dropping any existing connection first
    pub async fn connect(&mut self, device_id: &str) -> Result<()> {
        let id: DeviceId = device_id.parse().map_err(|e| {
            error!("{}", e);
            e
        })?;

        if self.current.is_some() {
            self.disconnect().await?;
        }

        self.set_status(ConnectionStatus::Connecting);
        info!("Connecting to {} over {}", id.address, id.transport);

        let result = match self.connector_mut(id.transport) {
            Ok(connector) => connector.connect(&id.address).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(device_info) => {
                self.current = Some(ActiveConnection {
                    device_id: id.clone(),
                    device_info,
                });
                self.set_status(ConnectionStatus::Connected);
                self.send_log(format!("Connected to {}", id), MessageSeverity::Success);

                if let Err(e) = self.lock_settings().remember_device(&id.to_string()) {
                    warn!("Could not record device {}: {}", id, e);
                }
                Ok(())
            }
            Err(e) => {
                error!("Error connecting to device {}: {}", id, e);
                self.current = None;
                self.set_status(ConnectionStatus::Error);
                self.set_status(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    /// Disconnect the current device. Succeeds immediately when idle.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(transport) = self.current.as_ref().map(|c| c.device_id.transport) else {
            return Ok(());
        };

        if let Err(e) = self.connector_mut(transport)?.disconnect().await {
            error!("Error disconnecting: {}", e);
            return Err(e);
        }

        self.current = None;
        self.set_status(ConnectionStatus::Disconnected);
        self.send_log("Device disconnected", MessageSeverity::Info);
        Ok(())
    }

    /// Push a location to the connected device.
    ///
    /// A write that fails because the link dropped triggers up to
    /// `reconnect_attempts` reconnects, each followed by a fresh write.
    pub async fn set_location(&mut self, latitude: f64, longitude: f64) -> Result<()> {
        let Some((transport, address)) = self
            .current
            .as_ref()
            .map(|c| (c.device_id.transport, c.device_id.address.clone()))
        else {
            error!("Not connected to any device");
            return Err(ConnectionError::NotConnected);
        };

        let coordinate = Coordinate::new(latitude, longitude)?;
        let max_reconnects = self.lock_settings().get().reconnect_attempts;

        let mut result = self.connector_mut(transport)?.send_location(coordinate).await;
        let mut reconnects = 0;

        while let Err(e) = &result {
            if !e.is_link_error() || reconnects >= max_reconnects {
                break;
            }
            reconnects += 1;
            warn!(
                "Location write failed ({}), reconnect attempt {}/{}",
                e, reconnects, max_reconnects
            );
            self.set_status(ConnectionStatus::Connecting);

            let connector = self.connector_mut(transport)?;
            result = match connector.connect(&address).await {
                Ok(device_info) => {
                    let sent = connector.send_location(coordinate).await;
                    if let Some(active) = self.current.as_mut() {
                        active.device_info = device_info;
                    }
                    self.set_status(ConnectionStatus::Connected);
                    sent
                }
                Err(e) => Err(e),
            };
        }

        match result {
            Ok(()) => {
                info!("Location set: {}", coordinate);
                let _ = self.event_sender.send(AppEvent::LocationSet(coordinate));
                Ok(())
            }
            Err(e) => {
                error!("Error setting location: {}", e);
                if e.is_link_error() {
                    if let Ok(connector) = self.connector_mut(transport) {
                        if let Err(e) = connector.disconnect().await {
                            warn!("Error releasing dropped link: {}", e);
                        }
                    }
                    self.current = None;
                    self.set_status(ConnectionStatus::Disconnected);
                }
                Err(e)
            }
        }
    }

    /// Stop simulating and restore the device's real GPS
    pub async fn clear_location(&mut self) -> Result<()> {
        let Some(transport) = self.current.as_ref().map(|c| c.device_id.transport) else {
            error!("Not connected to any device");
            return Err(ConnectionError::NotConnected);
        };

        self.connector_mut(transport)?.clear_location().await?;
        info!("Real GPS restored");
        let _ = self.event_sender.send(AppEvent::LocationCleared);
        Ok(())
    }

    pub fn get_current_connection_info(&self) -> ConnectionInfo {
        match &self.current {
            Some(active) => ConnectionInfo {
                connected: true,
                connection_type: active.device_id.transport,
                device_id: Some(active.device_id.to_string()),
                device_info: active.device_info.clone(),
            },
            None => ConnectionInfo {
                connected: false,
                connection_type: ConnectionType::None,
                device_id: None,
                device_info: BTreeMap::new(),
            },
        }
    }

    pub fn is_connected(&self) -> bool {
        self.current.is_some()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    fn connector_mut(&mut self, transport: ConnectionType) -> Result<&mut dyn Connector> {
        self.connectors
            .iter_mut()
            .find(|c| c.connection_type() == transport)
            .map(|c| c.as_mut() as &mut dyn Connector)
            .ok_or(ConnectionError::Unsupported(transport))
    }

    fn lock_settings(&self) -> MutexGuard<'_, SettingsService> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
        let _ = self.event_sender.send(AppEvent::ConnectionStatus(status));
    }

    fn send_log(&self, message: impl Into<String>, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MockState {
        devices: Vec<DiscoveredDevice>,
        fail_scan: bool,
        fail_connect: bool,
        send_failures: VecDeque<ConnectionError>,
        connected: bool,
        calls: Vec<String>,
    }

    struct MockConnector {
        transport: ConnectionType,
        state: Arc<Mutex<MockState>>,
    }

    impl MockConnector {
        fn new(transport: ConnectionType) -> (Self, Arc<Mutex<MockState>>) {
            let state = Arc::new(Mutex::new(MockState::default()));
            (
                Self {
                    transport,
                    state: state.clone(),
                },
                state,
            )
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        fn connection_type(&self) -> ConnectionType {
            self.transport
        }

        async fn discover_devices(&mut self) -> Result<Vec<DiscoveredDevice>> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("scan".into());
            if state.fail_scan {
                return Err(ConnectionError::NoAdapter);
            }
            Ok(state.devices.clone())
        }

        async fn connect(&mut self, address: &str) -> Result<BTreeMap<String, String>> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("connect {}", address));
            if state.fail_connect {
                return Err(ConnectionError::DeviceNotFound(address.to_string()));
            }
            state.connected = true;
            Ok(BTreeMap::from([("DeviceName".to_string(), "iPhone".to_string())]))
        }

        async fn disconnect(&mut self) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("disconnect".into());
            state.connected = false;
            Ok(())
        }

        async fn is_connected(&self) -> bool {
            self.state.lock().unwrap().connected
        }

        async fn send_location(&mut self, coordinate: Coordinate) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("send {}", coordinate));
            match state.send_failures.pop_front() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn clear_location(&mut self) -> Result<()> {
            self.state.lock().unwrap().calls.push("clear".into());
            Ok(())
        }
    }

    struct Harness {
        manager: ConnectionManager,
        bt: Arc<Mutex<MockState>>,
        usb: Arc<Mutex<MockState>>,
        settings: Arc<Mutex<SettingsService>>,
        events: mpsc::UnboundedReceiver<AppEvent>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(Mutex::new(SettingsService::with_path(
            dir.path().join("settings.json"),
        )));
        let (bt_connector, bt) = MockConnector::new(ConnectionType::Bluetooth);
        let (usb_connector, usb) = MockConnector::new(ConnectionType::Usb);
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::with_connectors(
            vec![Box::new(bt_connector), Box::new(usb_connector)],
            settings.clone(),
            tx,
        );
        Harness {
            manager,
            bt,
            usb,
            settings,
            events: rx,
            _dir: dir,
        }
    }

    /// Status and location events received so far, log messages skipped
    fn drain_events(events: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<AppEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            if matches!(
                event,
                AppEvent::ConnectionStatus(_) | AppEvent::LocationSet(_)
            ) {
                drained.push(event);
            }
        }
        drained
    }

    fn device(name: &str, address: &str, transport: ConnectionType) -> DiscoveredDevice {
        DiscoveredDevice::new(Some(name.to_string()), address, transport)
    }

    #[tokio::test]
    async fn test_scan_all_transports_prefixes_ids() {
        let mut h = harness();
        h.bt.lock().unwrap().devices = vec![device("Phone", "AA:BB", ConnectionType::Bluetooth)];
        h.usb.lock().unwrap().devices = vec![device("iPhone", "0000-1111", ConnectionType::Usb)];

        let devices = h.manager.scan_devices(None).await;

        let ids: Vec<_> = devices.keys().cloned().collect();
        assert_eq!(ids, vec!["bt_AA:BB", "usb_0000-1111"]);
        assert_eq!(devices["bt_AA:BB"].connection_type, ConnectionType::Bluetooth);
    }

    #[tokio::test]
    async fn test_scan_failure_is_isolated() {
        let mut h = harness();
        h.bt.lock().unwrap().fail_scan = true;
        h.usb.lock().unwrap().devices = vec![device("iPhone", "0000-1111", ConnectionType::Usb)];

        let devices = h.manager.scan_devices(None).await;

        assert_eq!(devices.len(), 1);
        assert!(devices.contains_key("usb_0000-1111"));
    }

    #[tokio::test]
    async fn test_scan_single_transport() {
        let mut h = harness();
        h.manager.scan_devices(Some(ConnectionType::Usb)).await;

        assert!(h.bt.lock().unwrap().calls.is_empty());
        assert_eq!(h.usb.lock().unwrap().calls, vec!["scan"]);
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_id_format() {
        let mut h = harness();
        let result = h.manager.connect("serial_42").await;

        assert!(matches!(result, Err(ConnectionError::InvalidDeviceId(_))));
        assert!(!h.manager.get_current_connection_info().connected);
    }

    #[tokio::test]
    async fn test_connect_records_transport_and_device() {
        let mut h = harness();
        h.manager.connect("bt_AA:BB").await.unwrap();

        let info = h.manager.get_current_connection_info();
        assert!(info.connected);
        assert_eq!(info.connection_type, ConnectionType::Bluetooth);
        assert_eq!(info.device_id.as_deref(), Some("bt_AA:BB"));
        assert_eq!(info.device_info["DeviceName"], "iPhone");
        assert_eq!(h.manager.status(), ConnectionStatus::Connected);
        assert_eq!(
            h.settings.lock().unwrap().get().last_connected_device.as_deref(),
            Some("bt_AA:BB")
        );
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_manager_idle() {
        let mut h = harness();
        h.usb.lock().unwrap().fail_connect = true;

        assert!(h.manager.connect("usb_0000").await.is_err());

        let info = h.manager.get_current_connection_info();
        assert!(!info.connected);
        assert_eq!(info.connection_type, ConnectionType::None);
        assert_eq!(h.manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_unregistered_transport_is_unsupported() {
        let mut h = harness();
        let result = h.manager.connect("wifi_0000").await;
        assert!(matches!(
            result,
            Err(ConnectionError::Unsupported(ConnectionType::Wifi))
        ));
    }

    #[tokio::test]
    async fn test_set_location_requires_connection() {
        let mut h = harness();
        let result = h.manager.set_location(37.7749, -122.4194).await;
        assert!(matches!(result, Err(ConnectionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_set_location_validates_before_sending() {
        let mut h = harness();
        h.manager.connect("bt_AA:BB").await.unwrap();

        let result = h.manager.set_location(120.0, 0.0).await;

        assert!(matches!(result, Err(ConnectionError::InvalidCoordinate { .. })));
        assert!(!h
            .bt
            .lock()
            .unwrap()
            .calls
            .iter()
            .any(|c| c.starts_with("send")));
    }

    #[tokio::test]
    async fn test_set_location_reconnects_after_link_loss() {
        let mut h = harness();
        h.manager.connect("bt_AA:BB").await.unwrap();
        h.bt.lock().unwrap().send_failures.push_back(ConnectionError::LinkLost);

        h.manager.set_location(40.7128, -74.006).await.unwrap();

        let calls = h.bt.lock().unwrap().calls.clone();
        assert_eq!(
            calls,
            vec![
                "connect AA:BB",
                "send 40.7128, -74.006",
                "connect AA:BB",
                "send 40.7128, -74.006",
            ]
        );
        assert!(h.manager.is_connected());
    }

    #[tokio::test]
    async fn test_persistent_link_loss_drops_connection() {
        let mut h = harness();
        h.manager.connect("bt_AA:BB").await.unwrap();
        {
            let mut state = h.bt.lock().unwrap();
            state.send_failures.push_back(ConnectionError::LinkLost);
            state.send_failures.push_back(ConnectionError::LinkLost);
        }

        let result = h.manager.set_location(40.7128, -74.006).await;

        assert!(matches!(result, Err(ConnectionError::LinkLost)));
        assert!(!h.manager.is_connected());
        assert_eq!(h.manager.status(), ConnectionStatus::Disconnected);

        let state = h.bt.lock().unwrap();
        assert_eq!(state.calls.last().map(String::as_str), Some("disconnect"));
        assert!(!state.connected);
    }

    #[tokio::test]
    async fn test_connect_and_set_emit_events_in_order() {
        let mut h = harness();
        h.manager.connect("bt_AA:BB").await.unwrap();
        h.manager.set_location(37.7749, -122.4194).await.unwrap();

        let events = drain_events(&mut h.events);
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            AppEvent::ConnectionStatus(ConnectionStatus::Connecting)
        ));
        assert!(matches!(
            events[1],
            AppEvent::ConnectionStatus(ConnectionStatus::Connected)
        ));
        match &events[2] {
            AppEvent::LocationSet(c) => {
                assert_eq!(c.latitude, 37.7749);
                assert_eq!(c.longitude, -122.4194);
            }
            other => panic!("expected LocationSet, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_connect_emits_error_then_disconnected() {
        let mut h = harness();
        h.usb.lock().unwrap().fail_connect = true;

        assert!(h.manager.connect("usb_0000").await.is_err());

        let events = drain_events(&mut h.events);
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            AppEvent::ConnectionStatus(ConnectionStatus::Connecting)
        ));
        assert!(matches!(
            events[1],
            AppEvent::ConnectionStatus(ConnectionStatus::Error)
        ));
        assert!(matches!(
            events[2],
            AppEvent::ConnectionStatus(ConnectionStatus::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_write_error_does_not_reconnect() {
        let mut h = harness();
        h.manager.connect("bt_AA:BB").await.unwrap();
        h.bt.lock()
            .unwrap()
            .send_failures
            .push_back(ConnectionError::CharacteristicNotFound("FFFF".into()));

        assert!(h.manager.set_location(1.0, 2.0).await.is_err());

        let connects = h
            .bt
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with("connect"))
            .count();
        assert_eq!(connects, 1);
        assert!(h.manager.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_succeeds() {
        let mut h = harness();
        h.manager.disconnect().await.unwrap();
        assert!(h.bt.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn test_switching_transport_disconnects_previous() {
        let mut h = harness();
        h.manager.connect("bt_AA:BB").await.unwrap();
        h.manager.connect("usb_0000").await.unwrap();

        assert_eq!(
            h.bt.lock().unwrap().calls,
            vec!["connect AA:BB", "disconnect"]
        );
        assert_eq!(
            h.manager.get_current_connection_info().connection_type,
            ConnectionType::Usb
        );
    }

    #[tokio::test]
    async fn test_clear_location_dispatches_to_current_transport() {
        let mut h = harness();
        assert!(matches!(
            h.manager.clear_location().await,
            Err(ConnectionError::NotConnected)
        ));

        h.manager.connect("usb_0000").await.unwrap();
        h.manager.clear_location().await.unwrap();
        assert!(h.usb.lock().unwrap().calls.contains(&"clear".to_string()));
    }
}
