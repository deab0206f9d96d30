//! Bluetooth Module
//!
//! Pushes locations to a device over a BLE GATT write.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  BluetoothConnector                      │
//! │        (Connector implementation for the manager)        │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │  Scanner  │  │ Connection │  │ Protocol │
//! │           │  │            │  │          │
//! │ - BLE     │  │ - Retry    │  │ - UUIDs  │
//! │  discovery│  │ - GATT     │  │ - Payload│
//! │           │  │   lookup   │  │ - Writes │
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - UUIDs, location payload encoding, write mode selection
//! - [`scanner`] - BLE device discovery
//! - [`connection`] - Device connection and GATT characteristic lookup
//! - [`service`] - The connector tying them together

pub mod connection;
pub mod protocol;
pub mod scanner;
pub mod service;

pub use service::BluetoothConnector;
