use anyhow::{anyhow, Context, Result};
use clap::Parser;
use location_spoofer::domain::connection_manager::ConnectionManager;
use location_spoofer::domain::models::AppEvent;
use location_spoofer::domain::settings::{Settings, SettingsService};
use location_spoofer::infrastructure::bluetooth::BluetoothConnector;
use location_spoofer::infrastructure::{default_connectors, logging};
use location_spoofer::presentation::cli::{Cli, Command};
use location_spoofer::presentation::console;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings_service = match &cli.config {
        Some(path) => SettingsService::with_path(path),
        None => match SettingsService::new() {
            Ok(service) => service,
            Err(e) => {
                eprintln!("Failed to locate settings: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    if let Command::Scan {
        timeout: Some(secs),
        ..
    } = &cli.command
    {
        settings_service.get_mut().bluetooth.scan_timeout_secs = *secs;
    }

    let _logging_guard = logging::init_logger(&settings_service.get().log_settings, cli.verbose)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting Location Spoofer");
    if let Some(warning) = settings_service.take_load_warning() {
        warn!("{}", warning);
    }

    match run(cli.command, settings_service).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("\n❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, settings_service: SettingsService) -> Result<bool> {
    let settings = settings_service.get().clone();
    let settings_service = Arc::new(Mutex::new(settings_service));

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let printer = console::spawn_event_printer(event_rx);

    let connectors = default_connectors(&settings, &event_tx);
    let mut manager =
        ConnectionManager::with_connectors(connectors, settings_service, event_tx.clone());
    let result = dispatch(command, &mut manager, &settings, &event_tx).await;
    if manager.is_connected() {
        let _ = manager.disconnect().await;
    }
    drop(manager);
    drop(event_tx);

    // Every sender is dropped by now, so the printer drains and exits
    let _ = printer.await;
    result
}

async fn dispatch(
    command: Command,
    manager: &mut ConnectionManager,
    settings: &Settings,
    event_tx: &mpsc::UnboundedSender<AppEvent>,
) -> Result<bool> {
    match command {
        Command::Scan { transport, .. } => {
            Ok(console::run_scan(manager, transport.connection_type()).await)
        }
        Command::Set {
            device_id,
            latitude,
            longitude,
            preset,
        } => {
            let (latitude, longitude) = match (preset, latitude, longitude) {
                (Some(name), _, _) => {
                    let location = settings
                        .preset(&name)
                        .ok_or_else(|| anyhow!("Unknown preset: {}", name))?;
                    (location.coordinate.latitude, location.coordinate.longitude)
                }
                (None, Some(lat), Some(lng)) => (lat, lng),
                _ => return Err(anyhow!("Latitude and longitude are required")),
            };

            manager
                .connect(&device_id)
                .await
                .with_context(|| format!("Failed to connect to {}", device_id))?;
            manager
                .set_location(latitude, longitude)
                .await
                .context("Failed to set location")?;
            println!("✓ Location set to {}, {}", latitude, longitude);
            Ok(true)
        }
        Command::Clear { device_id } => {
            manager
                .connect(&device_id)
                .await
                .with_context(|| format!("Failed to connect to {}", device_id))?;
            manager
                .clear_location()
                .await
                .context("Failed to restore real GPS")?;
            println!("✓ Real GPS restored");
            Ok(true)
        }
        Command::Info { device_id } => {
            manager
                .connect(&device_id)
                .await
                .with_context(|| format!("Failed to connect to {}", device_id))?;
            let info = manager.get_current_connection_info();
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(true)
        }
        Command::Test { transport } => {
            console::run_connection_test(manager, transport.connection_type()).await
        }
        Command::TestUsb => console::run_usb_test(manager).await,
        Command::TestBluetooth { timeout } => {
            let mut connector = BluetoothConnector::new(settings.bluetooth.clone(), event_tx.clone());
            console::run_bluetooth_test(&mut connector, Duration::from_secs(timeout)).await
        }
    }
}
