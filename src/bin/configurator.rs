use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use zbx_provisioner::api::JsonRpcClient;
use zbx_provisioner::config::ProvisionerConfig;
use zbx_provisioner::config_store::MySqlConfigStore;
use zbx_provisioner::error::{ProvisionError, ProvisionResult};
use zbx_provisioner::grafana;
use zbx_provisioner::provisioner::{Provisioner, resolve_ipv4, wait_for_server};
use zbx_provisioner::reconcile::settle;
use zbx_provisioner::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Monitoring server configurator", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug mode
    #[arg(long)]
    debug: bool,
}

fn init_logging(log_dir: &str, debug: bool) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "configurator.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let default_level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},sqlx::query=warn")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn provision(config: &ProvisionerConfig) -> ProvisionResult<()> {
    let agent_ip = resolve_ipv4(&config.agent_hostname).await?;
    debug!(agent = %config.agent_hostname, %agent_ip, "Resolved agent address.");

    wait_for_server(&config.server_host).await?;

    info!("Connecting to the server database.");
    let store = MySqlConfigStore::connect(&config.database).await?;

    if let Some(settings) = &config.grafana {
        info!(url = %settings.url, "Configuring Grafana.");
        settle("grafana", grafana::configure(settings, config.request_timeout).await)?;
    }

    let api = JsonRpcClient::new(&config.server_url, config.request_timeout)?;
    debug!(endpoint = api.endpoint(), "Using server API.");

    Provisioner::new(&api, &store, config, agent_ip).run().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = ProvisionerConfig::load(args.config.as_deref());
    let log_dir = config.as_ref().map_or("logs", |c| c.log_dir.as_str());
    init_logging(log_dir, args.debug);
    info!("Starting configurator, version: {}", VERSION);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = tokio::select! {
        result = provision(&config) => result,
        _ = tokio::signal::ctrl_c() => Err(ProvisionError::Interrupted),
    };

    match result {
        Ok(()) => {
            info!("Configuration finished.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Configuration failed.");
            ExitCode::FAILURE
        }
    }
}
