//! Location Spoofer
//!
//! Sets a simulated GPS location on iOS devices over USB, Wi-Fi or Bluetooth LE.
//!
//! - [`domain`] - device model, settings, the [`domain::connector::Connector`]
//!   trait and the [`domain::connection_manager::ConnectionManager`]
//! - [`infrastructure`] - BLE and usbmux transports, logging
//! - [`presentation`] - command line and console flows

pub mod domain;
pub mod infrastructure;
pub mod presentation;
