//! kioskctl - administration CLI for the kiosk session broker.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kiosk_broker::BrokerConfig;
use kiosk_security::{FilePolicySource, PermissionModel, SecurityDescriptorStore};
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod check_cmd;
mod policy_cmd;

use check_cmd::{CheckArgs, RightsArgs};
use policy_cmd::PolicyCli;

/// Kiosk broker administration
#[derive(Parser)]
#[command(name = "kioskctl")]
#[command(about = "Inspect and edit the kiosk session access policy")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "KIOSK_CONFIG", default_value = "kiosk.toml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Show or edit the access policy
    Policy(PolicyCli),

    /// Print the effective rights of a caller
    Check(CheckArgs),

    /// List every right with its code and bits
    Rights(RightsArgs),

    /// Print the broker settings read from the config file
    Config,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn open_store(path: &Path) -> Result<Arc<SecurityDescriptorStore>> {
    let store = SecurityDescriptorStore::open(FilePolicySource::new(path))
        .with_context(|| format!("Failed to load policy from {}", path.display()))?;
    Ok(Arc::new(store))
}

fn run(args: Args) -> Result<()> {
    debug!(config = %args.config.display(), "kioskctl starting");
    match args.command {
        Command::Policy(cli) => cli.run(&*open_store(&args.config)?),
        Command::Check(check) => {
            let permissions = PermissionModel::new(open_store(&args.config)?);
            check_cmd::run_check(check, &permissions)
        }
        Command::Rights(rights) => check_cmd::run_rights(rights),
        Command::Config => {
            let config = BrokerConfig::load(&args.config)
                .with_context(|| format!("Failed to load {}", args.config.display()))?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    setup_logging(&args.log_level, args.json_logs);

    if let Err(e) = run(args) {
        error!("{e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
