use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use zbx_provisioner::discovery::{CustomConfig, DiscoveryFilter, Protocol, discover};
use zbx_provisioner::error::ProvisionResult;
use zbx_provisioner::version::VERSION;

/// External check for the monitoring agent: lists declared web checks.
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// JSON list of web urls
    #[arg(long, default_value = "url_list.json", global = true)]
    config: PathBuf,

    /// Enable debug mode
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// URL discovery
    Discovery {
        /// Limit discovery by url protocol: any, http or https
        #[arg(long, default_value = "any")]
        protocol: Protocol,

        /// Limit discovery by check priority
        #[arg(long)]
        priority: Option<i64>,

        /// Keep one url per scheme and host
        #[arg(long)]
        unique: bool,
    },
}

// Stdout carries the discovery JSON, so logs go to stderr.
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(args: &Args) -> ProvisionResult<String> {
    debug!(config = %args.config.display(), "Reading url list from config file.");
    let config = CustomConfig::load(&args.config)?;
    let Command::Discovery {
        protocol,
        priority,
        unique,
    } = &args.command;
    let filter = DiscoveryFilter {
        protocol: *protocol,
        priority: *priority,
        unique: *unique,
    };
    debug!(?filter, checks = config.web.len(), "Discovering urls.");
    Ok(serde_json::to_string(&discover(&config.web, &filter))?)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    match run(&args) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Discovery failed.");
            ExitCode::FAILURE
        }
    }
}
