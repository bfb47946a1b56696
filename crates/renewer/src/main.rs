//! autossl - Main entry point
//!
//! Keeps TLS certificates of CDN-hosted domains renewed.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use autossl_common::{init_logging, LogFormat};
use autossl_config::{Config, ConfigStore, ConfigWatcher};
use autossl_renewer::{CycleOrchestrator, DefaultCapabilityFactory, SignalManager};

/// Configuration file used when none is given
const DEFAULT_CONFIG_PATH: &str = "/etc/autossl/autossl.kdl";

/// autossl - Automatic TLS certificate renewal for CDN domains
#[derive(Parser, Debug)]
#[command(name = "autossl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "AUTOSSL_CONFIG")]
    config: Option<String>,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,

    /// Log output format (text or json)
    #[arg(long = "log-format", default_value = "text")]
    log_format: String,

    /// Do not reload the configuration when the file changes
    #[arg(long = "no-watch")]
    no_watch: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration file and exit
    Test {
        /// Configuration file to test
        #[arg(short = 'c', long = "config")]
        config: Option<String>,
    },
    /// Run renewal cycles until stopped (default)
    Run {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<String>,
    },
    /// Run a single renewal cycle and exit
    Once {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<String>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let log_format = LogFormat::from_str_loose(&cli.log_format);

    if cli.test {
        return test_config(&config_path(cli.config));
    }

    match cli.command {
        Some(Commands::Test { config }) => test_config(&config_path(config.or(cli.config))),
        Some(Commands::Run { config }) => {
            init_logging(cli.verbose, log_format);
            run_daemon(&config_path(config.or(cli.config)), !cli.no_watch)
        }
        Some(Commands::Once { config }) => {
            init_logging(cli.verbose, log_format);
            run_once(&config_path(config.or(cli.config)))
        }
        None => {
            init_logging(cli.verbose, log_format);
            run_daemon(&config_path(cli.config), !cli.no_watch)
        }
    }
}

fn config_path(path: Option<String>) -> String {
    path.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Test configuration file and exit
fn test_config(path: &str) -> Result<ExitCode> {
    init_logging(false, LogFormat::Text);

    info!("Testing configuration file: {}", path);
    let config = Config::from_file(path).context("Failed to load configuration file")?;

    info!("Configuration test successful:");
    if let Some(issuer) = &config.issuer {
        info!("  - issuer command: {}", issuer.command.join(" "));
    }
    if let Some(publisher) = &config.publisher {
        info!("  - CDN endpoint: {}", publisher.endpoint);
    }
    match &config.notifier {
        Some(notifier) => info!("  - {} alert recipient(s)", notifier.recipients.len()),
        None => warn!("  - no notifier configured"),
    }
    info!(
        "  - renewing certificates expiring within {} day(s)",
        config.renewal.lookahead_days
    );
    if !config.renewal.exclude.is_empty() {
        info!("  - {} excluded domain(s)", config.renewal.exclude.len());
    }

    println!("autossl: configuration file {} test is successful", path);
    Ok(ExitCode::SUCCESS)
}

/// Load configuration and build the orchestrator.
fn bootstrap(path: &str) -> Result<(Arc<ConfigStore>, CycleOrchestrator)> {
    info!("Loading configuration from: {}", path);
    let store = Arc::new(ConfigStore::load(path).context("Failed to load configuration file")?);
    let orchestrator = CycleOrchestrator::new(store.clone(), Arc::new(DefaultCapabilityFactory));
    Ok((store, orchestrator))
}

/// Run renewal cycles until a shutdown signal arrives
fn run_daemon(path: &str, watch: bool) -> Result<ExitCode> {
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let (store, orchestrator) = bootstrap(path)?;
        let shutdown = CancellationToken::new();

        SignalManager::new(store.clone(), shutdown.clone())
            .spawn()
            .context("Failed to register signal handlers")?;

        // Kept alive for the lifetime of the loop.
        let _watcher = if watch {
            match ConfigWatcher::spawn(store.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "Configuration file watching disabled");
                    None
                }
            }
        } else {
            None
        };

        info!("autossl started");
        orchestrator.run(shutdown).await;
        Ok::<_, anyhow::Error>(ExitCode::SUCCESS)
    })
}

/// Run one cycle; exit with failure when domains remain unrenewed
fn run_once(path: &str) -> Result<ExitCode> {
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let (store, orchestrator) = bootstrap(path)?;
        let shutdown = CancellationToken::new();

        SignalManager::new(store, shutdown.clone())
            .spawn()
            .context("Failed to register signal handlers")?;

        let report = orchestrator.run_cycle(&shutdown).await;
        shutdown.cancel();

        if report.has_residual_failures() {
            for failure in &report.residual {
                warn!(domain = %failure.domain_name, "{}", failure.describe());
            }
            return Ok(ExitCode::FAILURE);
        }
        if let Some(error) = &report.inventory_error {
            warn!(error = %error, "Cycle could not list the CDN inventory");
            return Ok(ExitCode::FAILURE);
        }
        Ok::<_, anyhow::Error>(ExitCode::SUCCESS)
    })
}
