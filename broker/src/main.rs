mod error;
mod overrides;
mod updates;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use nix::unistd::getuid;
use voltepatch::adb::{AdbShell, DelegateStatus};
use voltepatch::broker::ConfigBroker;
use voltepatch::bundle::BundleValue;
use voltepatch::carrier::{CarrierConfigService, SubscriptionId};

use crate::error::VoltepatchError;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Pin to this adb device serial.
    #[arg(long, global = true)]
    serial: Option<String>,

    /// Exit nonzero when the operation fails, instead of just logging it.
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a persistent carrier config override for a subscription.
    Apply(ApplyArgs),
    /// Remove any standing carrier config override for a subscription.
    Clear(ClearArgs),
    /// Report delegation status and read back config values.
    Status(StatusArgs),
    /// Check whether a newer release of this tool is available.
    CheckUpdate,
}

#[derive(Parser, Debug)]
struct ApplyArgs {
    /// Target subscription id.
    #[arg(short, long)]
    sub_id: i32,

    /// TOML file of override values.
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Override values; VALUE is typed by KEY's suffix (_bool, _int,
    /// _long, _double, _string and their _array forms).
    #[arg(value_name = "KEY=VALUE")]
    values: Vec<String>,
}

#[derive(Parser, Debug)]
struct ClearArgs {
    /// Target subscription id.
    #[arg(short, long)]
    sub_id: i32,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    /// Target subscription id.
    #[arg(short, long)]
    sub_id: i32,

    /// Config keys to read back.
    #[arg(value_name = "KEY")]
    keys: Vec<String>,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => info!("finished"),
        Err(err) => {
            error!("{err}");
            // the host contract is a bare "finished" signal with exit 0
            // either way; --strict opts into a distinguishable exit
            if args.strict {
                std::process::exit(1);
            }
        }
    }
}

fn run(args: &Args) -> Result<(), VoltepatchError> {
    let shell = AdbShell::new(args.serial.clone());
    match &args.command {
        Command::Apply(apply) => {
            let mut bundle = overrides::collect(apply.overrides.as_deref(), &apply.values)?;
            // the control keys ride along in the coerced set, like the rest
            // of the raw arguments; the service ignores keys it doesn't know
            bundle.insert("subId", BundleValue::Int(apply.sub_id));
            bundle.insert("clear", BundleValue::Bool(false));
            let broker = ConfigBroker::new(&shell, &shell, getuid());
            broker.apply_config(SubscriptionId(apply.sub_id), &bundle)?;
        }
        Command::Clear(clear) => {
            let broker = ConfigBroker::new(&shell, &shell, getuid());
            broker.clear_config(SubscriptionId(clear.sub_id))?;
        }
        Command::Status(status) => {
            let delegation = match shell.delegate_status() {
                DelegateStatus::Granted => "granted",
                DelegateStatus::NotGranted => "not granted",
                DelegateStatus::Stopped => "stopped",
            };
            println!("delegation: {delegation}");
            for key in &status.keys {
                let value = shell.query_config(SubscriptionId(status.sub_id), key)?;
                println!("{key}: {value}");
            }
        }
        Command::CheckUpdate => {
            let current = env!("CARGO_PKG_VERSION");
            let latest = updates::latest_release_tag();
            if updates::is_newer(&latest, current) {
                println!("update available: {latest} (running {current})");
            } else {
                println!("up to date (running {current}, latest release {latest})");
            }
        }
    }
    Ok(())
}
