use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_OSC_TARGET;

#[derive(Debug, Parser)]
#[command(name = "pulse_osc")]
#[command(about = "Bridge a BLE heart-rate monitor to VRChat avatar OSC", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help = "Sets the level of verbosity", global(true))]
    pub(crate) verbose: u8,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    #[command(name = "run")]
    Run(Run),
    #[command(name = "dry_run")]
    DryRun(DryRun),
    #[command(name = "list_adapters")]
    ListAdapters {},
    #[command(name = "list_devices")]
    ListDevices(ListDevices),
}

#[derive(Debug, Args)]
pub(crate) struct Run {
    #[arg(
        long = "adapter",
        help = "The adapter number to use. Use list_adapters to get the list of adapters",
        default_value = "0"
    )]
    pub(crate) adapter: u8,
    #[arg(
        conflicts_with = "device_mac",
        long = "device_name",
        help = "The device name to use. Use list_devices to get the list of devices"
    )]
    pub(crate) device_name: Option<String>,
    #[arg(
        long = "device_mac",
        help = "The device mac address to use. Use list_devices to get the list of devices"
    )]
    pub(crate) device_mac: Option<String>,
    #[arg(
        long = "osc",
        help = "The OSC endpoint VRChat listens on",
        default_value = DEFAULT_OSC_TARGET
    )]
    pub(crate) osc: String,
}

#[derive(Debug, Args)]
pub(crate) struct DryRun {
    #[arg(
        long = "osc",
        help = "The OSC endpoint VRChat listens on",
        default_value = DEFAULT_OSC_TARGET
    )]
    pub(crate) osc: String,
}

#[derive(Debug, Args)]
pub(crate) struct ListDevices {
    #[arg(
        long = "adapter",
        help = "The adapter number to use. Use list_adapters to get the list of adapters",
        default_value = "0"
    )]
    pub(crate) adapter: u8,
}
