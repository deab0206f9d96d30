use crate::domain::error::{ConnectionError, Result};
use crate::domain::models::{ConnectionType, Coordinate, DiscoveredDevice};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A transport able to find devices and push locations to one of them
#[async_trait]
pub trait Connector: Send + Sync {
    fn connection_type(&self) -> ConnectionType;

    async fn discover_devices(&mut self) -> Result<Vec<DiscoveredDevice>>;

    /// Connect to `address` and return whatever the device reports about itself
    async fn connect(&mut self, address: &str) -> Result<BTreeMap<String, String>>;

    /// Disconnecting an idle connector is a no-op
    async fn disconnect(&mut self) -> Result<()>;

    async fn is_connected(&self) -> bool;

    async fn send_location(&mut self, coordinate: Coordinate) -> Result<()>;

    /// Restore the device's real GPS
    async fn clear_location(&mut self) -> Result<()> {
        Err(ConnectionError::Unsupported(self.connection_type()))
    }
}
