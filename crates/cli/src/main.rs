mod config_commands;
mod doctor_commands;
mod simulate_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    hopbus_config::HopbusConfig,
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "hopbus", about = "hopbus: virtual-endpoint routing for a multi-router bus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides `[logging] level`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of the discovered one.
    #[arg(long, global = true, env = "HOPBUS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and audit the routing/security setup.
    Doctor,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Run the routing scenarios against an in-memory topology.
    Simulate(simulate_commands::SimulateArgs),
}

/// Load the config named by `--config`, or the discovered one, then apply
/// `HOPBUS_*` overrides.
fn load_config(cli: &Cli) -> anyhow::Result<HopbusConfig> {
    let mut config = match cli.config.as_deref() {
        Some(path) => hopbus_config::load_config(path)?,
        None => hopbus_config::discover_and_load(),
    };
    hopbus_config::apply_env_overrides(&mut config);
    Ok(config)
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
fn init_telemetry(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    #[cfg(feature = "metrics")]
    let registry = registry.with(hopbus_metrics::tracing_integration::metrics_layer());

    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A broken --config file is reported by `doctor` rather than aborting it.
    let loaded = load_config(&cli);
    let config = match (&loaded, &cli.command) {
        (Err(_), Commands::Doctor) => HopbusConfig::default(),
        (Err(e), _) => anyhow::bail!("{e:#}"),
        (Ok(config), _) => config.clone(),
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_telemetry(level, cli.json_logs || config.logging.json);

    info!(version = env!("CARGO_PKG_VERSION"), "hopbus starting");
    if let Some(path) = cli.config.as_deref() {
        debug!(path = %path.display(), "using explicit config file");
    }

    match cli.command {
        Commands::Doctor => doctor_commands::handle_doctor(cli.config.as_deref(), &config),
        Commands::Config { action } => {
            config_commands::handle_config(action, cli.config.as_deref(), &config)
        },
        Commands::Simulate(args) => simulate_commands::handle_simulate(args, &config).await,
    }
}
