use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use clap::Parser;
use futures::stream::StreamExt;
use log::{debug, info, trace, warn};
use tokio::time;
use uuid::Uuid;

mod args;
mod config;
mod engine;
mod measurement;
mod osc;
mod utils;

use engine::PulseEngine;
use osc::{PulseSink, VrcOscSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = args::Cli::parse();
    // Default to info; each -v raises the level one step further.
    pretty_env_logger::formatted_timed_builder()
        .filter_level(utils::convert_verbose_level_to_log_level(
            cli.verbose.saturating_add(2),
        ))
        .init();
    info!("Starting pulse_osc...");

    match cli.command {
        args::Command::Run(opts) => run_bridge(opts).await,
        args::Command::DryRun(opts) => dry_run(opts).await,
        args::Command::ListAdapters {} => list_adapters().await,
        args::Command::ListDevices(opts) => list_devices(opts).await,
    }
}

async fn run_bridge(opts: args::Run) -> anyhow::Result<()> {
    let sink = VrcOscSink::connect(&opts.osc).await?;
    let engine = PulseEngine::new(sink);

    let manager = Manager::new().await?;
    let central = pick_adapter(&manager, opts.adapter).await?;

    tokio::select! {
        _ = session_loop(central, &opts, engine.clone()) => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
    }
    engine.stop();
    Ok(())
}

/// Outer reconnect loop: a session ends when the notification stream closes
/// or any BLE step fails, and is retried after a short backoff. The pacing
/// engine survives across sessions.
async fn session_loop<S: PulseSink>(
    central: Adapter,
    opts: &args::Run,
    engine: PulseEngine<S>,
) {
    loop {
        match bridge_session(&central, opts, &engine).await {
            Ok(()) => warn!("Notification stream ended, reconnecting..."),
            Err(err) => warn!("Session failed: {:#}, retrying...", err),
        }
        time::sleep(Duration::from_secs(5)).await;
    }
}

async fn bridge_session<S: PulseSink>(
    central: &Adapter,
    opts: &args::Run,
    engine: &PulseEngine<S>,
) -> anyhow::Result<()> {
    // Start scanning for devices
    info!("Scanning for heart-rate devices...");
    let scanfilter = ScanFilter {
        services: vec![create_uuid!("0000180d-0000-1000-8000-00805f9b34fb")],
    };
    central
        .start_scan(scanfilter)
        .await
        .context("failed to start scanning")?;
    time::sleep(Duration::from_secs(10)).await;

    let device = select_device(central, opts).await?;
    if let Err(err) = central.stop_scan().await {
        debug!("Failed to stop scan: {}", err);
    }

    let local_name = device
        .properties()
        .await?
        .and_then(|p| p.local_name)
        .unwrap_or_else(|| String::from("(peripheral name unknown)"));

    /* Connect To Device */
    if !device.is_connected().await? {
        debug!("Connecting to peripheral {:?}...", &local_name);
        device
            .connect()
            .await
            .context("error connecting to peripheral")?;
    }
    info!("Connected to {}", local_name);

    debug!("Info: Discovering Services...");
    device.discover_services().await?;

    let hr_measure_uuid = create_uuid!("00002a37-0000-1000-8000-00805f9b34fb");
    let mut subscribed = false;
    for characteristic in device.characteristics() {
        if characteristic.uuid == hr_measure_uuid {
            trace!("Subscribing to characteristic {:?}", characteristic);
            device.subscribe(&characteristic).await?;
            subscribed = true;
        }
    }
    if !subscribed {
        bail!("peripheral exposes no Heart Rate Measurement characteristic");
    }
    info!("Subscribed to Heart Rate");

    // Read Heartrate
    let mut notification_stream = device.notifications().await?;
    while let Some(data) = notification_stream.next().await {
        trace!("Received data from [{:?}]: {:?}", data.uuid, data.value);
        if data.uuid != hr_measure_uuid {
            continue;
        }
        match measurement::decode(&data.value) {
            Ok(m) => {
                debug!("Heart Rate: {} ({} interval(s))", m.bpm, m.intervals.len());
                engine.handle_measurement(&m);
            }
            Err(err) => warn!("Dropping malformed notification: {}", err),
        }
    }

    Ok(())
}

async fn select_device(central: &Adapter, opts: &args::Run) -> anyhow::Result<Peripheral> {
    let devices = central
        .peripherals()
        .await
        .context("failed to get peripherals")?;
    info!("Available Devices -> {}", devices.len());

    for device in devices {
        let properties = match device.properties().await {
            Ok(Some(p)) => p,
            Ok(None) => continue,
            Err(err) => {
                warn!("Failed to get properties: {}, skipping device...", err);
                continue;
            }
        };
        let local_name = properties
            .local_name
            .clone()
            .unwrap_or_else(|| String::from("(peripheral name unknown)"));

        if let Some(wanted) = &opts.device_mac {
            if properties.address.to_string().eq_ignore_ascii_case(wanted) {
                return Ok(device);
            }
            continue;
        }
        if let Some(wanted) = &opts.device_name {
            if &local_name == wanted {
                return Ok(device);
            }
            continue;
        }
        // Scan filter already restricted results to the Heart Rate service.
        return Ok(device);
    }

    bail!("no matching heart-rate peripheral found")
}

async fn pick_adapter(manager: &Manager, index: u8) -> anyhow::Result<Adapter> {
    let adapters = manager.adapters().await?;
    if adapters.is_empty() {
        bail!("No Bluetooth Adapter Found!");
    }
    adapters.get(index as usize).cloned().ok_or_else(|| {
        anyhow!(
            "adapter {} not found ({} available, see list_adapters)",
            index,
            adapters.len()
        )
    })
}

async fn dry_run(opts: args::DryRun) -> anyhow::Result<()> {
    let sink = VrcOscSink::connect(&opts.osc).await?;
    let engine = PulseEngine::new(sink);
    info!("Dry run: synthesizing heart-rate telemetry");

    tokio::select! {
        _ = utils::dry_run_loop(engine.clone()) => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
    }
    engine.stop();
    Ok(())
}

async fn list_adapters() -> anyhow::Result<()> {
    let manager = Manager::new().await?;
    for (index, adapter) in manager.adapters().await?.iter().enumerate() {
        let info = adapter
            .adapter_info()
            .await
            .unwrap_or_else(|_| String::from("(unknown adapter)"));
        info!("[{}] {}", index, info);
    }
    Ok(())
}

async fn list_devices(opts: args::ListDevices) -> anyhow::Result<()> {
    let manager = Manager::new().await?;
    let central = pick_adapter(&manager, opts.adapter).await?;

    info!("Scanning for devices...");
    central
        .start_scan(ScanFilter::default())
        .await
        .context("failed to start scanning")?;
    time::sleep(Duration::from_secs(10)).await;

    let devices = central.peripherals().await?;
    info!("Available Devices -> {}", devices.len());
    for device in devices {
        let properties = match device.properties().await {
            Ok(Some(p)) => p,
            _ => continue,
        };
        let local_name = properties
            .local_name
            .unwrap_or_else(|| String::from("(peripheral name unknown)"));
        info!("{} [{}]", local_name, properties.address);
    }
    Ok(())
}
