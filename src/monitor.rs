// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Polling daemon that watches every registered backup and emits
//! edge-triggered health events.
//!
//! The daemon owns one [`BackupHealth`] aggregate per target and runs a
//! fixed cycle:
//!
//! 1. Fetch one `_active_tasks` snapshot and cross-reference it against
//!    the registry.
//! 2. For each target in registry order, fetch source/destination
//!    document counts and fold the observations into the aggregate.
//! 3. Re-evaluate every aggregate and emit [`MonitorEvent::Triggered`] /
//!    [`MonitorEvent::Resolved`] only when a target's error flag flips.
//!
//! A cycle that fails part-way (server unreachable, malformed response)
//! skips the evaluation step, emits [`MonitorEvent::Fault`], and the loop
//! reschedules as normal. The poll interval is measured from cycle
//! completion, so slow cycles never stack.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use savemyseat::config::BackupConfig;
//! use savemyseat::couch::CouchStore;
//! use savemyseat::monitor::MonitorDaemon;
//! use savemyseat::registry::BackupRegistry;
//!
//! #[tokio::main]
//! async fn main() -> savemyseat::error::Result<()> {
//!     let config = BackupConfig::from_file("backup.json")?;
//!     let store = Arc::new(CouchStore::new(&config.couch_url)?);
//!     let registry = BackupRegistry::load(&config);
//!
//!     let mut daemon = MonitorDaemon::new(store, registry, config.monitor.clone());
//!     let mut events = daemon.take_events().expect("events not yet taken");
//!     daemon.start()?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!
//!     daemon.stop().await;
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backup::DatabaseBackup;
use crate::config::MonitorConfig;
use crate::error::{BackupError, Result};
use crate::health::BackupHealth;
use crate::metrics;
use crate::registry::BackupRegistry;
use crate::store::DocumentStore;
use crate::tasks::StatusSnapshot;

/// How long `stop()` waits for an in-flight cycle before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ═══════════════════════════════════════════════════════════════════════════
// Daemon state
// ═══════════════════════════════════════════════════════════════════════════

/// Lifecycle state of the monitoring daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Constructed, not yet started.
    Created,
    /// Poll loop is running.
    Running,
    /// Stopped, either explicitly or after a failed start.
    Stopped,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonState::Created => write!(f, "Created"),
            DaemonState::Running => write!(f, "Running"),
            DaemonState::Stopped => write!(f, "Stopped"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════════

/// Edge-triggered health notifications produced by the poll loop.
///
/// `Triggered` and `Resolved` are emitted exactly once per flip of a
/// target's error flag; steady state produces nothing. `Fault` reports a
/// cycle that could not complete at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A target transitioned from healthy to in-error.
    Triggered {
        /// Registry name of the backup target.
        target: String,
        /// Human-readable reason per failing condition.
        reasons: Vec<String>,
        /// Correlates this trigger with its eventual `Resolved`.
        episode_id: Uuid,
    },
    /// A target transitioned from in-error back to healthy.
    Resolved {
        target: String,
        /// Empty on resolution; kept for symmetry with `Triggered`.
        reasons: Vec<String>,
        episode_id: Uuid,
    },
    /// A whole cycle failed before evaluation could run.
    Fault {
        /// Rendered error from the failed cycle.
        message: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════
// Daemon
// ═══════════════════════════════════════════════════════════════════════════

/// Background monitor over a set of registered backups.
///
/// Construct with [`MonitorDaemon::new`], claim the event stream with
/// [`MonitorDaemon::take_events`], then [`MonitorDaemon::start`]. The
/// first cycle runs immediately; later cycles follow the configured
/// poll interval.
pub struct MonitorDaemon<S: DocumentStore> {
    store: Arc<S>,
    registry: BackupRegistry,
    config: MonitorConfig,

    state_tx: watch::Sender<DaemonState>,
    state_rx: watch::Receiver<DaemonState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    event_tx: mpsc::UnboundedSender<MonitorEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<MonitorEvent>>,

    poll_task: Option<JoinHandle<()>>,
}

impl<S: DocumentStore> MonitorDaemon<S> {
    /// Create a daemon over `registry`, polling through `store`.
    pub fn new(store: Arc<S>, registry: BackupRegistry, config: MonitorConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(DaemonState::Created);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            store,
            registry,
            config,
            state_tx,
            state_rx,
            shutdown_tx,
            shutdown_rx,
            event_tx,
            event_rx: Some(event_rx),
            poll_task: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DaemonState {
        *self.state_rx.borrow()
    }

    /// Whether the poll loop has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.state() == DaemonState::Running
    }

    /// Watch channel for state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<DaemonState> {
        self.state_rx.clone()
    }

    /// Claim the event receiver. Returns `None` after the first call.
    ///
    /// Events sent while no receiver exists are buffered; events sent
    /// after the receiver is dropped are discarded.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<MonitorEvent>> {
        self.event_rx.take()
    }

    /// Start the poll loop. The first cycle runs immediately.
    ///
    /// Fails with [`BackupError::InvalidState`] unless the daemon is in
    /// the `Created` state, so a daemon cannot be started twice.
    pub fn start(&mut self) -> Result<()> {
        let state = self.state();
        if state != DaemonState::Created {
            return Err(BackupError::InvalidState {
                expected: "Created".to_string(),
                actual: state.to_string(),
            });
        }

        info!(
            targets = self.registry.len(),
            poll_interval = %self.config.poll_interval,
            delta_threshold = self.config.delta_threshold,
            "Starting backup monitor"
        );

        let store = Arc::clone(&self.store);
        let registry = self.registry.clone();
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let shutdown_rx = self.shutdown_rx.clone();

        self.poll_task = Some(tokio::spawn(async move {
            run_monitor(store, registry, config, event_tx, shutdown_rx).await;
        }));

        let _ = self.state_tx.send(DaemonState::Running);
        metrics::set_monitor_state("Running");

        Ok(())
    }

    /// Stop the poll loop.
    ///
    /// An in-flight cycle is allowed to finish; only the pending wait
    /// for the next cycle is cancelled. Waits up to [`SHUTDOWN_GRACE`]
    /// for the loop task to exit.
    pub async fn stop(&mut self) {
        info!("Stopping backup monitor");

        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.poll_task.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => debug!("Monitor loop exited cleanly"),
                Ok(Err(e)) => warn!(error = %e, "Monitor loop panicked"),
                Err(_) => warn!("Monitor loop did not exit within grace period"),
            }
        }

        let _ = self.state_tx.send(DaemonState::Stopped);
        metrics::set_monitor_state("Stopped");

        info!("Backup monitor stopped");
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Poll loop
// ═══════════════════════════════════════════════════════════════════════════

/// Long-running poll loop. Owns the per-target health aggregates.
async fn run_monitor<S: DocumentStore>(
    store: Arc<S>,
    registry: BackupRegistry,
    config: MonitorConfig,
    event_tx: mpsc::UnboundedSender<MonitorEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let poll_interval = config.poll_interval_duration();

    // One controller and one health aggregate per target, in registry
    // order. Evaluation iterates the controllers so event order matches
    // registry order, not map order.
    let backups: Vec<DatabaseBackup<S>> = registry
        .iter()
        .map(|spec| DatabaseBackup::new(Arc::clone(&store), spec.clone()))
        .collect();
    let mut health: BTreeMap<String, BackupHealth> = registry
        .iter()
        .map(|spec| {
            (
                spec.name.clone(),
                BackupHealth::new(config.delta_threshold),
            )
        })
        .collect();

    metrics::set_monitored_targets(registry.len());
    info!(
        targets = registry.len(),
        poll_interval = ?poll_interval,
        "Monitor loop running"
    );

    loop {
        let cycle_start = Instant::now();
        match run_cycle(store.as_ref(), &backups, &registry, &mut health, &event_tx).await {
            Ok(()) => {
                metrics::record_monitor_cycle(cycle_start.elapsed());
            }
            Err(e) => {
                warn!(error = %e, "Monitor cycle failed");
                metrics::record_monitor_cycle_error();
                let _ = event_tx.send(MonitorEvent::Fault {
                    message: e.to_string(),
                });
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!("Monitor loop received shutdown signal");
                    break;
                }
            }
        }
    }

    info!("Monitor loop exited");
}

/// One full observe-then-evaluate cycle.
///
/// Any error aborts the cycle before the evaluation step runs, so a
/// partial set of observations never produces trigger/resolve events.
async fn run_cycle<S: DocumentStore>(
    store: &S,
    backups: &[DatabaseBackup<S>],
    registry: &BackupRegistry,
    health: &mut BTreeMap<String, BackupHealth>,
    event_tx: &mpsc::UnboundedSender<MonitorEvent>,
) -> Result<()> {
    let snapshot = StatusSnapshot::fetch(store).await?;
    let report = snapshot.cross_reference(registry);

    // Observe each target sequentially so a flooded server sees one
    // count query pair at a time.
    for backup in backups {
        let name = backup.name();
        let counts = backup.document_counts().await?;

        debug!(
            target = %name,
            source_count = counts.source_count,
            dest_count = counts.dest_count,
            running = report.is_running(name),
            write_failures = report.write_failures_for(name),
            "Observed backup target"
        );
        metrics::set_document_delta(name, counts.delta());
        metrics::set_backup_running(name, report.is_running(name));

        if let Some(state) = health.get_mut(name) {
            state.record_observation(
                report.is_running(name),
                report.write_failures_for(name),
                counts.delta(),
            );
        }
    }

    for backup in backups {
        let name = backup.name();
        let Some(state) = health.get_mut(name) else {
            continue;
        };

        let evaluation = state.evaluate();
        if !evaluation.has_changed {
            continue;
        }

        if evaluation.is_in_error {
            warn!(
                target = %name,
                reasons = ?evaluation.reasons,
                episode_id = %evaluation.episode_id,
                "Backup entered error state"
            );
            metrics::record_monitor_event("triggered");
            let _ = event_tx.send(MonitorEvent::Triggered {
                target: name.to_string(),
                reasons: evaluation.reasons,
                episode_id: evaluation.episode_id,
            });
        } else {
            info!(
                target = %name,
                episode_id = %evaluation.episode_id,
                "Backup recovered"
            );
            metrics::record_monitor_event("resolved");
            let _ = event_tx.send(MonitorEvent::Resolved {
                target: name.to_string(),
                reasons: evaluation.reasons,
                episode_id: evaluation.episode_id,
            });
        }
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
