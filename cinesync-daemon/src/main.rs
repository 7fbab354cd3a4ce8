//! # CineSync daemon
//!
//! Host binary for the organizer: loads configuration, opens the record
//! store, restores state and then keeps the symlink library in step with
//! the source folders until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use cinesync_config::{Config, ConfigLoader, ConfigLoaderOptions};
use cinesync_core::{
    Auditor, BatchWriter, Coordinator, CoordinatorParts, DecisionObserver,
    Monitor, NameParser, PathBuilder, RecordStore, Resolver, ResolverCache,
    SqliteStore, SymlinkManager, TmdbProvider, WriterConfig,
};
use cinesync_model::{DecisionKind, PendingDecision, ProcessingStage};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cinesync")]
#[command(about = "Organize downloaded media into a clean symlink library")]
struct Cli {
    /// Config file (TOML or JSON). Defaults to cinesync.toml in the
    /// working directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment file to load before reading configuration.
    #[arg(long)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch the source folders until interrupted (default)
    Run {
        /// Skip the startup walk of the source folders
        #[arg(long, default_value_t = false)]
        no_initial_scan: bool,
    },
    /// Organize everything currently in the source folders and exit
    Scan,
    /// Sweep for broken links once and purge them
    Audit {
        /// Report broken links without deleting them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Print records that ended in failure, one JSON object per line
    Failed,
}

/// Surfaces operator decisions in the log.
#[derive(Debug)]
struct LogObserver;

impl DecisionObserver for LogObserver {
    fn on_pending(&self, decision: &PendingDecision) {
        match &decision.kind {
            DecisionKind::Disambiguation { candidates } => {
                let choices: Vec<String> = candidates
                    .iter()
                    .enumerate()
                    .map(|(i, c)| match c.year() {
                        Some(year) => format!("[{i}] {} ({year}) {}", c.title, c.id),
                        None => format!("[{i}] {} {}", c.title, c.id),
                    })
                    .collect();
                warn!(
                    source = %decision.source_path.display(),
                    candidates = %choices.join("; "),
                    "needs disambiguation"
                );
            }
            DecisionKind::Conflict {
                destination,
                existing_target,
            } => {
                warn!(
                    source = %decision.source_path.display(),
                    destination = %destination.display(),
                    occupant = ?existing_target,
                    "destination occupied"
                );
            }
        }
    }

    fn on_resolved(&self, source: &std::path::Path) {
        info!(source = %source.display(), "decision settled");
    }
}

struct Runtime {
    config: Config,
    writer: Arc<BatchWriter>,
    links: Arc<SymlinkManager>,
    coordinator: Arc<Coordinator>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "info,cinesync::parse=warn,sqlx=warn,notify=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Command::Run {
        no_initial_scan: false,
    }) {
        Command::Run { no_initial_scan } => run(config, !no_initial_scan).await,
        Command::Scan => scan_once(config).await,
        Command::Audit { dry_run } => audit_once(config, dry_run).await,
        Command::Failed => print_failed(config).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let loader = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.config.clone(),
        env_file: cli.env_file.clone(),
        skip_env_file: false,
    });
    let load = loader.load().context("failed to load configuration")?;

    if load.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    info!(source = ?load.metadata.source, "configuration loaded");
    for warning in load.warnings.iter() {
        match &warning.hint {
            Some(hint) => warn!(hint = %hint, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }
    Ok(load.config)
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<SqliteStore>> {
    let url = &config.persistence.database_url;
    let store = SqliteStore::open(url)
        .await
        .with_context(|| format!("failed to open record store at {url}"))?;
    Ok(Arc::new(store))
}

fn audit_dirs(config: &Config) -> Vec<PathBuf> {
    let mut dirs = config.audit.vault_dirs.clone();
    if config.audit.include_destination && !dirs.iter().any(|d| d == config.destination()) {
        dirs.push(config.destination().to_path_buf());
    }
    dirs
}

async fn build_runtime(config: Config) -> anyhow::Result<Runtime> {
    let store = open_store(&config).await?;
    let writer = Arc::new(BatchWriter::spawn(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        WriterConfig::from(&config.persistence),
    ));

    let provider = TmdbProvider::from_config(&config.resolver)
        .context("metadata provider unavailable; set TMDB_API_KEY or resolver.api_key")?;
    let resolver = Arc::new(Resolver::new(
        Arc::new(provider),
        ResolverCache::new(),
        &config.resolver,
    ));
    let links = Arc::new(SymlinkManager::new(config.destination(), &config.links));

    let coordinator = Arc::new(Coordinator::new(
        &config,
        CoordinatorParts {
            parser: NameParser::from_config(&config.paths),
            resolver,
            paths: PathBuilder::new(&config),
            links: Arc::clone(&links),
            writer: Arc::clone(&writer),
            observer: Arc::new(LogObserver),
        },
    ));
    coordinator
        .restore(store.as_ref())
        .await
        .context("failed to restore state from the record store")?;

    Ok(Runtime {
        config,
        writer,
        links,
        coordinator,
    })
}

async fn run(config: Config, initial_scan: bool) -> anyhow::Result<()> {
    let rt = build_runtime(config).await?;
    let cancel = rt.coordinator.shutdown_token();
    rt.coordinator.start(rt.config.workers.pipeline).await;

    if rt.config.audit.enabled {
        let auditor = Arc::new(Auditor::new(
            Arc::clone(&rt.links),
            Some(Arc::clone(&rt.writer)),
        ));
        tokio::spawn(auditor.run_periodic(
            audit_dirs(&rt.config),
            rt.config.audit.interval(),
            cancel.child_token(),
        ));
    }

    if initial_scan && rt.config.monitor.initial_scan {
        rt.coordinator.initial_scan().await;
    }

    if rt.config.monitor.enabled {
        let monitor = Monitor::new(&rt.config);
        let events = monitor
            .start()
            .await
            .context("failed to watch source folders")?;
        let coordinator = Arc::clone(&rt.coordinator);
        tokio::spawn(async move { coordinator.run_monitor(events).await });
    } else {
        info!("monitoring disabled; processing queued work only");
    }

    wait_for_shutdown(&cancel).await;
    info!("shutting down");
    rt.coordinator.shutdown().await;
    rt.writer.shutdown().await;
    Ok(())
}

async fn wait_for_shutdown(cancel: &CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
        }
        _ = cancel.cancelled() => {}
    }
}

async fn scan_once(config: Config) -> anyhow::Result<()> {
    let rt = build_runtime(config).await?;
    rt.coordinator.start(rt.config.workers.pipeline).await;

    let queued = rt.coordinator.initial_scan().await;
    tokio::select! {
        _ = rt.coordinator.wait_idle() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            warn!("interrupted before the scan finished");
        }
    }

    let pending = rt.coordinator.pending_decisions().await.len();
    let failed = rt.coordinator.failed_records().await.len();
    info!(queued, pending, failed, "scan finished");

    rt.coordinator.shutdown().await;
    rt.writer.shutdown().await;
    Ok(())
}

async fn audit_once(config: Config, dry_run: bool) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let writer = Arc::new(BatchWriter::spawn(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        WriterConfig::from(&config.persistence),
    ));
    let links = Arc::new(SymlinkManager::new(config.destination(), &config.links));
    links.index().rebuild(
        store
            .load_links()
            .await
            .context("failed to load link records")?,
    );
    let auditor = Auditor::new(links, Some(Arc::clone(&writer)));

    let entries = auditor.sweep(&audit_dirs(&config)).await;
    if dry_run {
        for entry in &entries {
            println!("{} -> {}", entry.link_path.display(), entry.target.display());
        }
        info!(broken = entries.len(), "dry run; nothing deleted");
    } else {
        let report = auditor.purge(&entries).await;
        info!(
            purged = report.purged.len(),
            spared = report.spared.len(),
            "audit finished"
        );
    }

    writer.shutdown().await;
    Ok(())
}

async fn print_failed(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let failed = store
        .load_records(Some(&[ProcessingStage::Failed]))
        .await
        .context("failed to read records")?;
    for record in &failed {
        println!("{}", serde_json::to_string(record)?);
    }
    info!(count = failed.len(), "failed records");
    Ok(())
}
