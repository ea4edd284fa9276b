//! Command-line interface for registering and monitoring CouchDB backups.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use savemyseat::{
    BackupConfig, BackupError, BackupRegistry, CouchStore, DatabaseBackup, MonitorDaemon,
    PagerDutyNotifier, Result, StatusSnapshot,
};

/// Register CouchDB backups and monitor that they keep working.
#[derive(Parser)]
#[command(name = "savemyseat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, env = "SAVEMYSEAT_CONFIG", default_value = "backup.json")]
    config: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed source databases with the count view and replication filter
    PrepareSource {
        /// Only prepare this target (default: all)
        #[arg(long)]
        target: Option<String>,
    },
    /// Create target databases and register continuous replications
    Init {
        /// Only initialize this target (default: all)
        #[arg(long)]
        target: Option<String>,
    },
    /// Run the monitoring daemon until interrupted
    Monitor {
        /// Deliver alerts even if the config leaves PagerDuty disabled
        #[arg(long)]
        pagerduty: bool,
    },
    /// Print one status snapshot for every target
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "savemyseat=debug".into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "savemyseat=info".into())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = BackupConfig::from_file(&cli.config)?;
    let store = Arc::new(CouchStore::new(&config.couch_url)?);
    let registry = BackupRegistry::load(&config);

    match cli.command {
        Commands::PrepareSource { target } => {
            prepare_source(store, select_targets(registry, target.as_deref())?).await
        }
        Commands::Init { target } => {
            init(store, select_targets(registry, target.as_deref())?).await
        }
        Commands::Monitor { pagerduty } => monitor(store, registry, &config, pagerduty).await,
        Commands::Status => status(store, registry).await,
    }
}

/// Narrow the registry to one target when `--target` was given.
fn select_targets(registry: BackupRegistry, only: Option<&str>) -> Result<BackupRegistry> {
    match only {
        None => Ok(registry),
        Some(name) => match registry.get(name) {
            Some(spec) => Ok(BackupRegistry::from_specs(vec![spec.clone()])),
            None => Err(BackupError::Config(format!("unknown backup target: {name}"))),
        },
    }
}

async fn prepare_source(store: Arc<CouchStore>, registry: BackupRegistry) -> Result<()> {
    registry
        .for_each_sequential(|spec| {
            let store = Arc::clone(&store);
            async move { DatabaseBackup::new(store, spec).prepare_source().await }
        })
        .await?;
    info!("All sources prepared");
    Ok(())
}

async fn init(store: Arc<CouchStore>, registry: BackupRegistry) -> Result<()> {
    registry
        .for_each_sequential(|spec| {
            let store = Arc::clone(&store);
            async move { DatabaseBackup::new(store, spec).initialize().await }
        })
        .await?;
    info!("All backups registered");
    Ok(())
}

async fn monitor(
    store: Arc<CouchStore>,
    registry: BackupRegistry,
    config: &BackupConfig,
    force_pagerduty: bool,
) -> Result<()> {
    let mut pagerduty = config.pagerduty.clone();
    if force_pagerduty {
        pagerduty.enabled = true;
    }

    let mut daemon = MonitorDaemon::new(store, registry, config.monitor.clone());

    if let Some(events) = daemon.take_events() {
        match PagerDutyNotifier::from_config(&pagerduty)? {
            Some(notifier) => {
                tokio::spawn(notifier.run(events));
            }
            None => {
                // Dropping the receiver discards events; the monitor loop
                // logs every transition anyway.
                info!("PagerDuty delivery disabled; health events are log-only");
                drop(events);
            }
        }
    }

    daemon.start()?;
    info!("Monitoring backups; press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    daemon.stop().await;
    Ok(())
}

async fn status(store: Arc<CouchStore>, registry: BackupRegistry) -> Result<()> {
    let snapshot = StatusSnapshot::fetch(store.as_ref()).await?;
    let report = snapshot.cross_reference(&registry);

    let mut entries = Vec::with_capacity(registry.len());
    for spec in registry.iter() {
        let backup = DatabaseBackup::new(Arc::clone(&store), spec.clone());
        let mut entry = serde_json::json!({
            "name": spec.name,
            "source": spec.source,
            "running": report.is_running(&spec.name),
            "write_failures": report.write_failures_for(&spec.name),
        });

        // A target whose counts cannot be read still shows up in the report
        match backup.document_counts().await {
            Ok(counts) => {
                entry["source_count"] = counts.source_count.into();
                entry["dest_count"] = counts.dest_count.into();
                entry["delta"] = counts.delta().into();
            }
            Err(e) => {
                entry["counts_error"] = e.to_string().into();
            }
        }
        entries.push(entry);
    }

    let rendered = serde_json::to_string_pretty(&serde_json::Value::Array(entries))
        .map_err(|e| BackupError::parse("status", e))?;
    println!("{rendered}");

    Ok(())
}
