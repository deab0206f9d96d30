use crate::domain::models::ConnectionType;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "location-spoofer",
    version,
    about = "Simulate GPS location on iOS devices over USB, Wi-Fi or Bluetooth"
)]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    All,
    Bluetooth,
    Usb,
    Wifi,
}

impl TransportArg {
    /// `None` means every transport
    pub fn connection_type(self) -> Option<ConnectionType> {
        match self {
            Self::All => None,
            Self::Bluetooth => Some(ConnectionType::Bluetooth),
            Self::Usb => Some(ConnectionType::Usb),
            Self::Wifi => Some(ConnectionType::Wifi),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List reachable devices
    Scan {
        #[arg(long = "type", value_enum, default_value_t = TransportArg::All)]
        transport: TransportArg,
        /// Bluetooth scan duration in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Set the device location
    Set {
        /// Device id as printed by `scan` (bt_..., usb_..., wifi_...)
        device_id: String,
        #[arg(allow_negative_numbers = true, required_unless_present = "preset")]
        latitude: Option<f64>,
        #[arg(allow_negative_numbers = true, required_unless_present = "preset")]
        longitude: Option<f64>,
        /// Use a named location from the settings instead of coordinates
        #[arg(long, conflicts_with_all = ["latitude", "longitude"])]
        preset: Option<String>,
    },
    /// Restore the device's real GPS
    Clear { device_id: String },
    /// Connect and print what the device reports
    Info { device_id: String },
    /// Scan, pick a device, set two locations, then disconnect
    Test {
        #[arg(long = "type", value_enum, default_value_t = TransportArg::All)]
        transport: TransportArg,
    },
    /// Exercise discovery, connect and a location write on Bluetooth only
    TestBluetooth {
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Set a location on the first USB device, then restore the real GPS
    TestUsb,
}
