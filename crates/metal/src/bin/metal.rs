//! Metal CLI - declarative lifecycle for Packet bare metal devices.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use packet_metal::device::SENSITIVE_ATTRIBUTES;
use packet_metal::providers::memory::MemoryApi;
use packet_metal::providers::packet::{PacketClient, API_BASE_URL};
use packet_metal::providers::DeviceApi;
use packet_metal::{
    check_destroyed, validate_all, Deadline, DeviceError, DeviceResource, DeviceSpec, DeviceState,
    EngineConfig, Refresh,
};

/// Metal CLI - bare metal device lifecycle for Packet.
#[derive(Parser)]
#[command(name = "metal")]
#[command(about = "Create, refresh, update and destroy bare metal devices")]
struct Cli {
    /// Packet API token (or set `PACKET_AUTH_TOKEN` env var).
    #[arg(long, env = "PACKET_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Packet API root (or set `PACKET_API_URL` env var).
    #[arg(long, env = "PACKET_API_URL", default_value = API_BASE_URL)]
    api_url: String,

    /// Engine config file (YAML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run against an in-process simulated provider.
    #[arg(long, default_value = "false")]
    simulate: bool,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a device spec without calling the provider.
    Validate {
        /// Device spec file (YAML or JSON).
        spec: PathBuf,
    },

    /// Create a device and wait until it is active.
    Create {
        /// Device spec file (YAML or JSON).
        spec: PathBuf,

        /// Seconds to wait for `active` (defaults to config).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show the current attributes of a device.
    Get {
        /// Device ID.
        #[arg(long)]
        id: String,
    },

    /// Refresh a device and report drift against a cached state file.
    Refresh {
        /// Device ID.
        #[arg(long)]
        id: String,

        /// Previously saved device state (YAML or JSON).
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Apply in-place changes between two spec files.
    Update {
        /// Device ID.
        #[arg(long)]
        id: String,

        /// Spec the device was created from.
        #[arg(long)]
        prior: PathBuf,

        /// Desired spec.
        #[arg(long)]
        desired: PathBuf,
    },

    /// Delete a device and wait until it is gone.
    Delete {
        /// Device ID.
        #[arg(long)]
        id: String,

        /// Seconds to wait for removal (defaults to config).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List all devices in a project.
    List {
        /// Project ID.
        #[arg(long)]
        project_id: String,
    },

    /// Verify that none of the given devices still exist.
    CheckDestroy {
        /// Device IDs (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,
    },
}

/// Read a YAML or JSON document from disk.
fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_state(state: &DeviceState) {
    println!("\nDevice Details:");
    for (name, value) in state.attributes() {
        if SENSITIVE_ATTRIBUTES.contains(&name) {
            let shown = if value.is_empty() { "" } else { "(sensitive)" };
            println!("  {name:<24} {shown}");
        } else {
            println!("  {name:<24} {value}");
        }
    }
}

/// Deadline that also ends on Ctrl-C.
fn interruptible(secs: u64) -> Deadline {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning wait");
            child.cancel();
        }
    });
    Deadline::after_secs(secs).with_cancellation(token)
}

fn build_api(cli: &Cli, config: &EngineConfig) -> Result<Arc<dyn DeviceApi>> {
    if cli.simulate {
        info!("Using simulated provider");
        return Ok(Arc::new(MemoryApi::new()));
    }

    let token = cli
        .auth_token
        .as_deref()
        .context("An auth token is required (--auth-token or PACKET_AUTH_TOKEN)")?;
    let client = PacketClient::with_base_url(token, &cli.api_url, config.request_timeout_secs)
        .context("Failed to create Packet client")?;
    Ok(Arc::new(client))
}

fn validate_file(path: &Path) -> Result<()> {
    let spec: DeviceSpec = load(path)?;
    let errors = validate_all(&spec);
    if errors.is_empty() {
        println!("✅ {} is valid", spec.hostname);
        return Ok(());
    }
    for error in &errors {
        println!("❌ {error}");
    }
    anyhow::bail!("{} validation error(s)", errors.len());
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = EngineConfig::load(cli.config.as_deref())?;

    // Validation never needs credentials
    if let Commands::Validate { spec } = &cli.command {
        return validate_file(spec);
    }

    let api = build_api(&cli, &config)?;
    let resource = DeviceResource::new(api.clone(), &config);

    match cli.command {
        Commands::Validate { spec } => validate_file(&spec)?,

        Commands::Create { spec, timeout } => {
            let spec: DeviceSpec = load(&spec)?;
            let deadline = interruptible(timeout.unwrap_or(config.create_timeout_secs));
            info!("Creating device: {}", spec.hostname);

            match resource.create(&spec, &deadline).await {
                Ok(device) => {
                    println!(
                        "\n✅ Device {} is active after {}s",
                        device.state.id,
                        deadline.elapsed_secs()
                    );
                    print_state(&device.state);
                }
                Err(e) => {
                    if let Some(id) = e.partial_id() {
                        println!("\n⚠️  Device {id} was created but did not become active");
                        println!("   Run `metal delete --id {id}` to clean it up");
                    }
                    return Err(e).context("Create failed");
                }
            }
        }

        Commands::Get { id } => match resource.read(&id, None).await? {
            Refresh::Present { state, .. } => print_state(&state),
            Refresh::Gone { id } => println!("Device {id} does not exist"),
        },

        Commands::Refresh { id, state } => {
            let cached: Option<DeviceState> = state.as_deref().map(load::<DeviceState>).transpose()?;
            match resource.read(&id, cached.as_ref()).await? {
                Refresh::Present { state, drift } => {
                    if drift.is_empty() {
                        println!("✅ No drift");
                    } else {
                        println!("\nDrift ({} attribute(s)):", drift.len());
                        for d in &drift {
                            println!("  {d}");
                        }
                    }
                    print_state(&state);
                }
                Refresh::Gone { id } => {
                    println!("Device {id} is gone; remove it from local state");
                }
            }
        }

        Commands::Update { id, prior, desired } => {
            let prior: DeviceSpec = load(&prior)?;
            let desired: DeviceSpec = load(&desired)?;
            match resource.update(&id, &prior, &desired).await {
                Ok(state) => {
                    println!("✅ Device {id} updated");
                    print_state(&state);
                }
                Err(DeviceError::RequiresReplacement { fields, .. }) => {
                    println!("❌ Changing {} requires a new device", fields.join(", "));
                    anyhow::bail!("Update requires replacement");
                }
                Err(e) => return Err(e).context("Update failed"),
            }
        }

        Commands::Delete { id, timeout } => {
            let deadline = interruptible(timeout.unwrap_or(config.delete_timeout_secs));
            info!("Deleting device: {id}");
            resource.delete(&id, &deadline).await?;
            println!("✅ Device {id} deleted");
        }

        Commands::List { project_id } => {
            let devices = resource.list(&project_id).await?;
            println!(
                "\n{:<38} {:<24} {:<14} {:<16}",
                "ID", "HOSTNAME", "STATE", "IPv4"
            );
            println!("{}", "-".repeat(92));
            for device in devices {
                println!(
                    "{:<38} {:<24} {:<14} {:<16}",
                    device.id, device.hostname, device.state, device.access_public_ipv4
                );
            }
        }

        Commands::CheckDestroy { ids } => {
            check_destroyed(api.as_ref(), &ids).await?;
            println!("✅ {} device(s) destroyed", ids.len());
        }
    }

    Ok(())
}
