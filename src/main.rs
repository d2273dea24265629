use std::process::ExitCode;
#[cfg(feature = "live")]
use std::sync::Arc;
#[cfg(feature = "live")]
use std::time::Duration;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pipewright::{Cache, Config, Mode, Orchestrator};

#[derive(Parser)]
#[command(name = "pipewright")]
#[command(about = "Static asset pipeline with watch mode and live reload")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, default_value = "pipewright.toml", global = true)]
    config: Utf8PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the output directory and build every asset once
    Build {
        /// Minify and skip source maps
        #[arg(long)]
        production: bool,
    },

    /// Build, serve and rebuild on changes
    #[cfg(feature = "live")]
    Watch,

    /// Serve the current output directory with live reload
    #[cfg(feature = "live")]
    Serve,

    /// Remove the output directory
    Clean,

    /// Remove cached image optimizations
    ClearCache,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Build { production } => {
            let mode = if production {
                Mode::Production
            } else {
                Mode::Development
            };

            let orchestrator = orchestrator(&config)?;
            let report = orchestrator.build(mode)?;
            eprint!("{report}");

            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        #[cfg(feature = "live")]
        Commands::Watch => watch(&config),
        #[cfg(feature = "live")]
        Commands::Serve => serve(&config),
        Commands::Clean => {
            pipewright::remove(&config.paths.dist)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ClearCache => {
            Cache::new(&config.cache.dir).clear()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let graph = pipewright::pipeline::tasks(config)?;
    Ok(Orchestrator::new(graph, Cache::new(&config.cache.dir))?)
}

#[cfg(feature = "live")]
fn watch(config: &Config) -> anyhow::Result<ExitCode> {
    use pipewright::{DevServer, Watcher};

    let graph = pipewright::pipeline::tasks(config)?;
    let bindings = pipewright::pipeline::bindings(config, &graph)?;

    // bind first, a busy port must stop us before any build work
    let server = DevServer::start(&config.server, &config.paths.dist)?;

    let orchestrator = Orchestrator::new(graph, Cache::new(&config.cache.dir))?
        .with_mode(Mode::Development)
        .with_live_port(server.live_port())
        .with_notifier(server.notifier());

    tracing::info!("running initial build...");
    let report = orchestrator.build(Mode::Development)?;
    if !report.is_success() {
        eprint!("{report}");
    }

    let root = std::env::current_dir().context("couldn't read the working directory")?;
    let root = Utf8PathBuf::try_from(root)?;

    let watcher = Watcher::new(
        Arc::new(orchestrator),
        bindings,
        &root,
        Duration::from_millis(config.watch.debounce_ms),
    )?;

    let handle = watcher.shutdown_handle();
    ctrlc::set_handler(move || handle.shutdown()).context("couldn't install Ctrl-C handler")?;

    watcher.watch()?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "live")]
fn serve(config: &Config) -> anyhow::Result<ExitCode> {
    let server = pipewright::DevServer::start(&config.server, &config.paths.dist)?;
    tracing::info!("press Ctrl-C to stop");

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("couldn't install Ctrl-C handler")?;

    let _ = rx.recv();
    drop(server);
    Ok(ExitCode::SUCCESS)
}
