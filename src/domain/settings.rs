use crate::domain::models::NamedLocation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "location_spoofer".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BluetoothSettings {
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    // Placeholder until the iOS location service is identified
    #[serde(default = "default_placeholder_uuid")]
    pub location_service_uuid: String,
    #[serde(default = "default_placeholder_uuid")]
    pub location_char_uuid: String,
    #[serde(default = "default_connect_max_retries")]
    pub connect_max_retries: u32,
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
    /// List every advertiser instead of only those exposing the location service
    #[serde(default = "default_true")]
    pub show_all_devices: bool,
}

impl Default for BluetoothSettings {
    fn default() -> Self {
        Self {
            scan_timeout_secs: default_scan_timeout_secs(),
            location_service_uuid: default_placeholder_uuid(),
            location_char_uuid: default_placeholder_uuid(),
            connect_max_retries: default_connect_max_retries(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
            show_all_devices: default_true(),
        }
    }
}

fn default_scan_timeout_secs() -> u64 {
    5
}
fn default_placeholder_uuid() -> String {
    "FFFFFFFF-FFFF-FFFF-FFFF-FFFFFFFFFFFF".to_string()
}
fn default_connect_max_retries() -> u32 {
    3
}
fn default_connect_retry_delay_ms() -> u64 {
    1000
}

/// How the pymobiledevice3 tool is invoked for USB and Wi-Fi devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileDeviceSettings {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_list_args")]
    pub list_args: Vec<String>,
    #[serde(default = "default_info_args")]
    pub info_args: Vec<String>,
    #[serde(default = "default_set_args")]
    pub set_args: Vec<String>,
    #[serde(default = "default_clear_args")]
    pub clear_args: Vec<String>,
    #[serde(default = "default_usb_flag")]
    pub usb_flag: String,
    #[serde(default = "default_network_flag")]
    pub network_flag: String,
}

impl Default for MobileDeviceSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            command_timeout_secs: default_command_timeout_secs(),
            list_args: default_list_args(),
            info_args: default_info_args(),
            set_args: default_set_args(),
            clear_args: default_clear_args(),
            usb_flag: default_usb_flag(),
            network_flag: default_network_flag(),
        }
    }
}

fn default_program() -> String {
    "pymobiledevice3".to_string()
}
fn default_command_timeout_secs() -> u64 {
    30
}
fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
fn default_list_args() -> Vec<String> {
    args(&["usbmux", "list"])
}
fn default_info_args() -> Vec<String> {
    args(&["lockdown", "info"])
}
fn default_set_args() -> Vec<String> {
    args(&["developer", "simulate-location", "set"])
}
fn default_clear_args() -> Vec<String> {
    args(&["developer", "simulate-location", "clear"])
}
fn default_usb_flag() -> String {
    "--usb".to_string()
}
fn default_network_flag() -> String {
    "--network".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    #[serde(default)]
    pub bluetooth: BluetoothSettings,

    #[serde(default)]
    pub mobile_device: MobileDeviceSettings,

    // Reconnects attempted when a write hits a dropped link
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    #[serde(default = "default_presets")]
    pub presets: Vec<NamedLocation>,

    #[serde(default)]
    pub known_devices: Vec<String>,
    #[serde(default)]
    pub last_connected_device: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            bluetooth: BluetoothSettings::default(),
            mobile_device: MobileDeviceSettings::default(),
            reconnect_attempts: default_reconnect_attempts(),
            presets: default_presets(),
            known_devices: Vec::new(),
            last_connected_device: None,
        }
    }
}

fn default_reconnect_attempts() -> u32 {
    1
}
fn default_presets() -> Vec<NamedLocation> {
    vec![NamedLocation::san_francisco(), NamedLocation::new_york()]
}

impl Settings {
    /// Look up a preset by case-insensitive name
    pub fn preset(&self, name: &str) -> Option<&NamedLocation> {
        self.presets
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
    load_warning: Option<String>,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Use an explicit settings file. A missing or unreadable file yields defaults.
    ///
    /// Settings load before logging is up, so an unreadable file is recorded
    /// rather than logged; see [`SettingsService::take_load_warning`].
    pub fn with_path(settings_path: impl Into<PathBuf>) -> Self {
        let settings_path = settings_path.into();
        let mut load_warning = None;
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                if settings_path.exists() {
                    load_warning = Some(format!(
                        "Could not read settings from {}: {}. Using defaults.",
                        settings_path.display(),
                        e
                    ));
                }
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
            load_warning,
        }
    }

    /// The problem hit while loading the settings file, if any
    pub fn take_load_warning(&mut self) -> Option<String> {
        self.load_warning.take()
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("LocationSpoofer");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn remember_device(&mut self, device_id: &str) -> anyhow::Result<()> {
        if !self.settings.known_devices.iter().any(|d| d == device_id) {
            self.settings.known_devices.push(device_id.to_string());
        }
        self.settings.last_connected_device = Some(device_id.to_string());
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "bluetooth": { "scan_timeout_secs": 12 } }"#).unwrap();
        assert_eq!(settings.bluetooth.scan_timeout_secs, 12);
        assert_eq!(settings.bluetooth.connect_max_retries, 3);
        assert_eq!(settings.mobile_device.program, "pymobiledevice3");
        assert_eq!(settings.reconnect_attempts, 1);
        assert_eq!(settings.presets.len(), 2);
    }

    #[test]
    fn test_preset_lookup_ignores_case() {
        let settings = Settings::default();
        let preset = settings.preset("new york").unwrap();
        assert_eq!(preset.coordinate.latitude, 40.7128);
        assert!(settings.preset("Atlantis").is_none());
    }

    #[test]
    fn test_remember_device_persists_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut service = SettingsService::with_path(&path);
        service.remember_device("bt_AA:BB").unwrap();
        service.remember_device("bt_AA:BB").unwrap();
        service.remember_device("usb_0001").unwrap();

        let reloaded = SettingsService::with_path(&path);
        assert_eq!(reloaded.get().known_devices, vec!["bt_AA:BB", "usb_0001"]);
        assert_eq!(
            reloaded.get().last_connected_device.as_deref(),
            Some("usb_0001")
        );
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let mut service = SettingsService::with_path(&path);
        assert_eq!(service.get().bluetooth.scan_timeout_secs, 5);

        let warning = service.take_load_warning().unwrap();
        assert!(warning.contains("settings.json"));
        assert!(service.take_load_warning().is_none());
    }

    #[test]
    fn test_missing_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = SettingsService::with_path(dir.path().join("settings.json"));
        assert!(service.take_load_warning().is_none());
    }
}
