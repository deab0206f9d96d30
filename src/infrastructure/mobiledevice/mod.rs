//! Mobile Device Module
//!
//! USB and Wi-Fi location simulation through the pymobiledevice3 tool.
//!
//! - [`protocol`] - command lines and output parsing
//! - [`runner`] - child process execution with a timeout
//! - [`service`] - the connector

pub mod protocol;
pub mod runner;
pub mod service;

pub use service::UsbmuxConnector;
