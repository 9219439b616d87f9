//! apvland - AP VLAN Interface Daemon
//!
//! Entry point for the apvland daemon.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use apvland::{
    dispatch_batch, ApVlanConfig, GroupContextTable, IpLinkDriver, LinkEventListener,
    VlanController, DEFAULT_CONFIG_PATH,
};

/// VLAN interface lifecycle daemon for wireless access points
#[derive(Parser, Debug)]
#[command(name = "apvland")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter (trace, debug, info, warn, error or a RUST_LOG directive)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

/// Initializes tracing/logging subsystem
///
/// The CLI filter wins over `RUST_LOG`, which wins over the config file.
fn init_logging(cli_level: Option<&str>, config_level: &str) -> anyhow::Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(config_level)?,
        },
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("apvland: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.check {
        println!("apvland: Configuration {} is valid", args.config.display());
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_logging(args.log_level.as_deref(), &config.logging.level) {
        eprintln!("apvland: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting apvland ---");

    match run_daemon(config).await {
        Ok(()) => {
            info!("apvland: Daemon exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("apvland: Daemon exiting with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<ApVlanConfig> {
    let config = ApVlanConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Main daemon loop
async fn run_daemon(config: ApVlanConfig) -> anyhow::Result<()> {
    let driver = IpLinkDriver::new(
        config.interface.iface.clone(),
        config.interface.station_iface_type.clone(),
    );
    let group_keys = GroupContextTable::new(config.interface.wpa);
    let settings = config.settings();
    let full_dynamic = settings.full_dynamic;

    let mut controller = VlanController::new(driver, group_keys, settings);
    for entry in config.initial_entries()? {
        controller.add_entry(entry);
    }

    // Subscribe before bringing interfaces up so no notification is missed.
    let mut listener = if full_dynamic {
        Some(LinkEventListener::new().context("Failed to open link event socket")?)
    } else {
        None
    };

    if let Err(e) = controller.start().await {
        controller.shutdown().await;
        return Err(e).context("Failed to initialize VLAN interfaces");
    }

    info!(
        entries = controller.vlans().len(),
        full_dynamic, "apvland: Listening to link events..."
    );

    match listener.as_mut() {
        Some(listener) => loop {
            tokio::select! {
                batch = listener.next_batch() => match batch {
                    Ok(events) => dispatch_batch(&mut controller, &events).await,
                    Err(e) => warn!("apvland: Error receiving link events: {}", e),
                },
                _ = signal::ctrl_c() => {
                    info!("apvland: Received SIGINT");
                    break;
                }
            }
        },
        None => {
            signal::ctrl_c()
                .await
                .context("Failed to wait for shutdown signal")?;
            info!("apvland: Received SIGINT");
        }
    }

    controller.shutdown().await;
    info!("apvland: Graceful shutdown complete");
    Ok(())
}
