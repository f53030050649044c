use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use tdble::Config;
use tdble::Coordinator;
use tdble::DeviceUpdater;
use tdble::UpdateError;
use tdble::device::BtleplugOptions;
use tdble::device::BtleplugTransport;
use tdble::device::Transport;
use tracing::info;
use tracing::warn;

#[derive(Parser)]
#[command(version, about = "Poll TDWLB Bluetooth pressure sensors")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "tdble.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan for advertising sensors and identify each one
    Scan,

    /// Poll one sensor on the configured interval until interrupted
    Poll {
        /// Overrides `device.address` from the configuration
        address: Option<String>,
    },

    /// Read one sensor once and print the result
    Read { address: Option<String> },
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    Config::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn resolve_address(cli: Option<String>, config: &Config) -> anyhow::Result<String> {
    cli.or_else(|| config.device.address.clone())
        .context("no device address given on the command line or in device.address")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    tdble::logging::init(&config.logging);

    if !cli.config.exists() {
        warn!("{} not found, using defaults", cli.config.display());
    }

    let transport = BtleplugTransport::new(BtleplugOptions {
        locate_timeout: config.device.locate_timeout(),
        ..BtleplugOptions::default()
    })
    .await
    .context("opening Bluetooth adapter")?;

    match cli.command {
        Command::Scan => scan(&transport, &config).await,
        Command::Poll { address } => {
            let address = resolve_address(address, &config)?;
            poll(transport, address, &config).await
        }
        Command::Read { address } => {
            let address = resolve_address(address, &config)?;
            read(transport, &address, &config).await
        }
    }
}

async fn scan(transport: &BtleplugTransport, config: &Config) -> anyhow::Result<()> {
    let duration = config.device.scan_duration();
    info!("Scanning for {:?}", duration);

    let found = tdble::device::discover(
        transport,
        &config.advertisement,
        duration,
        &config.device.discovery_options(),
    )
    .await?;

    if found.is_empty() {
        println!("No sensors found");
    }
    for discovery in &found {
        match &discovery.result {
            Ok(_) => println!("{}", discovery.title()),
            Err(e) => println!("{} (unreachable: {})", discovery.title(), e),
        }
    }
    Ok(())
}

async fn read(
    transport: BtleplugTransport,
    address: &str,
    config: &Config,
) -> anyhow::Result<()> {
    let mut updater = DeviceUpdater::new(transport, config.device.discovery_options());
    let device = updater
        .transport()
        .locate(address)
        .await?
        .with_context(|| format!("device {} not found", address))?;

    let result = updater.update_device(&device).await;
    updater.disconnect(address).await;

    let snapshot = result?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn poll(
    transport: BtleplugTransport,
    address: String,
    config: &Config,
) -> anyhow::Result<()> {
    let (mut coordinator, mut state) = Coordinator::new(transport, address, &config.device);
    let interval = config.device.update_interval();

    // A sensor that is out of range or asleep is retried on the poll interval
    match coordinator.setup().await {
        Ok(()) => {
            if coordinator.update().await.is_err() {
                warn!("{} is not ready, retrying every {:?}", coordinator.address(), interval);
            }
        }
        Err(UpdateError::NotReady(address)) => {
            warn!("{} not found, retrying every {:?}", address, interval);
        }
        Err(e) => return Err(e).context("setting up coordinator"),
    }

    let printer = tokio::spawn(async move {
        loop {
            let line = serde_json::to_string(&*state.borrow_and_update());
            match line {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Unable to encode state: {}", e),
            }
            if state.changed().await.is_err() {
                break;
            }
        }
    });

    coordinator
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for ctrl-c: {}", e);
            }
            info!("Shutting down");
        })
        .await;

    printer.await?;
    Ok(())
}
