use anyhow::{anyhow, bail, Context, Result};
use azprov::azure::auth::{self, AzureCredentials};
use azprov::azure::client::format_azure_error;
use azprov::azure::models::VnetParams;
use azprov::azure::{compute, network, resources, AzureClient};
use azprov::config::Config;
use azprov::provision::{naming, ProvisionError, ProvisioningPipeline, ProvisioningRequest};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Provision Azure virtual machines
#[derive(Parser, Debug)]
#[command(name = "azprov", version = azprov::VERSION, about, long_about = None)]
struct Args {
    /// Azure subscription id
    #[arg(short, long, global = true)]
    subscription: Option<String>,

    /// Service principal tenant id
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// Service principal application id
    #[arg(long, global = true)]
    client_id: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision a VM from a YAML or JSON request file
    Provision {
        request: PathBuf,

        /// Stop waiting after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print the resource names derived for a prefix and ordinal
    Names {
        #[arg(long)]
        prefix: String,

        #[arg(long)]
        number: String,
    },

    /// Inspect, start and stop virtual machines
    #[command(subcommand)]
    Vm(VmCommand),

    /// Resource groups
    #[command(subcommand)]
    Group(GroupCommand),

    /// Storage accounts
    #[command(subcommand)]
    Storage(StorageCommand),

    /// Virtual networks
    #[command(subcommand)]
    Vnet(VnetCommand),

    /// Show or update the saved configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum VmCommand {
    Show {
        #[arg(short = 'g', long)]
        resource_group: String,
        name: String,
    },
    Start {
        #[arg(short = 'g', long)]
        resource_group: String,
        name: String,
    },
    /// Stop and deallocate
    Stop {
        #[arg(short = 'g', long)]
        resource_group: String,
        name: String,
    },
    List {
        #[arg(short = 'g', long)]
        resource_group: String,
    },
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
    Create {
        name: String,
        #[arg(short, long)]
        location: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum StorageCommand {
    Create {
        #[arg(short = 'g', long)]
        resource_group: String,
        name: String,
        #[arg(short, long)]
        location: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum VnetCommand {
    Create {
        #[arg(short = 'g', long)]
        resource_group: String,
        name: String,
        #[arg(short, long)]
        location: Option<String>,
        /// Address space, repeatable (default 10.0.0.0/16)
        #[arg(long = "address-prefix")]
        address_prefixes: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    Set {
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        poll_interval: Option<u64>,
        #[arg(long)]
        operation_timeout: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("azprov started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("azprov").join("azprov.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".azprov").join("azprov.log");
    }
    PathBuf::from("azprov.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let mut config = Config::load();

    match &args.command {
        Command::Names { prefix, number } => {
            let names = naming::derive(prefix, number);
            println!("{}", serde_json::to_string_pretty(&names)?);
            return Ok(());
        }
        Command::Config(command) => return run_config(command, &args, &mut config),
        _ => {}
    }

    let client = connect(&args, &config)?;

    match args.command {
        Command::Provision { request, timeout } => provision(&client, &request, timeout).await,
        Command::Vm(command) => run_vm(&client, command).await,
        Command::Group(GroupCommand::Create { name, location }) => {
            let location = config.effective_location(location.as_deref());
            let group = resources::create_resource_group(&client, &name, &location)
                .await
                .map_err(|e| anyhow!(format_azure_error(&e)))?;
            println!("{}", group.id);
            Ok(())
        }
        Command::Storage(StorageCommand::Create {
            resource_group,
            name,
            location,
        }) => {
            let location = config.effective_location(location.as_deref());
            let account =
                resources::create_storage_account(&client, &resource_group, &name, &location, None)
                    .await
                    .map_err(|e| anyhow!(format_azure_error(&e)))?;
            println!("{}", account.id);
            Ok(())
        }
        Command::Vnet(VnetCommand::Create {
            resource_group,
            name,
            location,
            address_prefixes,
        }) => {
            let location = config.effective_location(location.as_deref());
            let params = (!address_prefixes.is_empty()).then(|| VnetParams {
                address_prefixes,
                ..VnetParams::with_defaults(&location)
            });
            let vnet = network::create_vnet(&client, &resource_group, &name, &location, params)
                .await
                .map_err(|e| anyhow!(format_azure_error(&e)))?;
            println!("{}", vnet.id);
            Ok(())
        }
        Command::Names { .. } | Command::Config(_) => Ok(()),
    }
}

/// Build an authenticated client from flags, environment and config
fn connect(args: &Args, config: &Config) -> Result<AzureClient> {
    let subscription = config
        .effective_subscription(args.subscription.as_deref())
        .context(
            "No Azure subscription configured. Set AZURE_SUBSCRIPTION_ID or use --subscription",
        )?;
    if !auth::validate_subscription_id(&subscription) {
        bail!("Invalid subscription id: {}", subscription);
    }

    let tenant = config.effective_tenant(args.tenant.as_deref());
    let client_id = config.effective_client_id(args.client_id.as_deref());
    let credentials = AzureCredentials::from_env(tenant.as_deref(), client_id.as_deref())
        .map_err(|e| anyhow!("{} ({})", format_azure_error(&e), e))?;

    let mut client =
        AzureClient::new(credentials, &subscription)?.with_poll_settings(config.poll_settings());
    if let Ok(endpoint) = std::env::var("AZURE_RESOURCE_MANAGER_ENDPOINT") {
        client = client.with_endpoint(&endpoint);
    }

    tracing::info!("Using subscription: {}", subscription);
    Ok(client)
}

async fn provision(client: &AzureClient, path: &Path, timeout: Option<u64>) -> Result<()> {
    let request = ProvisioningRequest::load(path)?;
    let pipeline = ProvisioningPipeline::new(client);
    let run = pipeline.execute(&request);

    let outcome = match timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run)
            .await
            .map_err(|_| {
                anyhow!(
                    "Provisioning did not finish within {}s. Operations already submitted keep running on Azure.",
                    secs
                )
            })?,
        None => run.await,
    };

    match outcome {
        Ok(provisioned) => {
            println!("{}", serde_json::to_string_pretty(&provisioned)?);
            Ok(())
        }
        Err(err) => bail!(describe_failure(&err)),
    }
}

fn describe_failure(err: &ProvisionError) -> String {
    match (err.step(), err.azure_error()) {
        (Some(step), Some(source)) => format!("{} failed: {}", step, format_azure_error(source)),
        (None, Some(source)) => format!("Cannot start provisioning: {}", format_azure_error(source)),
        _ => err.to_string(),
    }
}

async fn run_vm(client: &AzureClient, command: VmCommand) -> Result<()> {
    match command {
        VmCommand::Show {
            resource_group,
            name,
        } => {
            let vm = compute::get_vm(client, &resource_group, &name)
                .await
                .map_err(|e| anyhow!(format_azure_error(&e)))?;
            let summary = json!({
                "id": vm.id,
                "name": vm.name,
                "provisioningState": vm.provisioning_state(),
                "powerState": compute::power_state(&vm),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        VmCommand::Start {
            resource_group,
            name,
        } => {
            compute::start_vm(client, &resource_group, &name)
                .await
                .map_err(|e| anyhow!(format_azure_error(&e)))?;
            println!("Started {}", name);
        }
        VmCommand::Stop {
            resource_group,
            name,
        } => {
            compute::stop_vm(client, &resource_group, &name)
                .await
                .map_err(|e| anyhow!(format_azure_error(&e)))?;
            println!("Deallocated {}", name);
        }
        VmCommand::List { resource_group } => {
            let vms = compute::list_vms(client, &resource_group)
                .await
                .map_err(|e| anyhow!(format_azure_error(&e)))?;
            for vm in vms {
                println!(
                    "{}\t{}",
                    vm.name,
                    vm.provisioning_state().unwrap_or("Unknown")
                );
            }
        }
    }
    Ok(())
}

fn run_config(command: &ConfigCommand, args: &Args, config: &mut Config) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
            if let Some(path) = Config::config_path() {
                println!("# {}", path.display());
            }
        }
        ConfigCommand::Set {
            location,
            poll_interval,
            operation_timeout,
        } => {
            if let Some(subscription) = &args.subscription {
                if !auth::validate_subscription_id(subscription) {
                    bail!("Invalid subscription id: {}", subscription);
                }
                config.subscription_id = Some(subscription.clone());
            }
            if let Some(tenant) = &args.tenant {
                config.tenant_id = Some(tenant.clone());
            }
            if let Some(client_id) = &args.client_id {
                config.client_id = Some(client_id.clone());
            }
            if let Some(location) = location {
                config.location = Some(location.clone());
            }
            if let Some(secs) = poll_interval {
                config.poll_interval_secs = Some(*secs);
            }
            if let Some(secs) = operation_timeout {
                config.operation_timeout_secs = Some(*secs);
            }
            config.save()?;
            tracing::info!("Saved configuration");
        }
    }
    Ok(())
}
