//! # Savemyseat
//!
//! Registers continuous CouchDB backups and monitors that they keep working.
//!
//! ## Architecture
//!
//! Savemyseat runs next to the backup CouchDB server. It seeds each source
//! database with a design doc (a non-design-document count view plus a
//! replication filter), registers one continuous `_replicator` entry per
//! target, then polls the server to catch silently-broken backups:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               savemyseat                                 │
//! │                                                                          │
//! │  ┌────────────────┐    ┌────────────────┐    ┌────────────────────────┐  │
//! │  │ BackupRegistry │───►│ DatabaseBackup │───►│ CouchStore (reqwest)   │  │
//! │  │ (config order) │    │ (per target)   │    │ docs / views / _tasks  │  │
//! │  └────────────────┘    └────────────────┘    └────────────────────────┘  │
//! │          │                                               │               │
//! │          ▼                                               ▼               │
//! │  ┌────────────────┐    ┌────────────────┐    ┌────────────────────────┐  │
//! │  │ MonitorDaemon  │───►│ BackupHealth   │───►│ PagerDutyNotifier      │  │
//! │  │ (poll loop)    │    │ (edge trigger) │    │ (trigger alerts)       │  │
//! │  └────────────────┘    └────────────────┘    └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two-Phase Operation
//!
//! 1. **Registration**: `prepare_source` seeds the source design doc, then
//!    `initialize` creates the target database and replaces its
//!    `_replicator` entry so replication restarts from a clean slate.
//! 2. **Monitoring**: a poll loop snapshots `_active_tasks`, compares
//!    non-design document counts between source and target, and emits
//!    edge-triggered events when a backup flips into or out of error.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use savemyseat::{BackupConfig, BackupRegistry, CouchStore, DatabaseBackup};
//!
//! #[tokio::main]
//! async fn main() -> savemyseat::Result<()> {
//!     let config = BackupConfig::from_file("backup.json")?;
//!     let store = Arc::new(CouchStore::new(&config.couch_url)?);
//!
//!     for spec in BackupRegistry::load(&config).iter() {
//!         let backup = DatabaseBackup::new(Arc::clone(&store), spec.clone());
//!         backup.prepare_source().await?;
//!         backup.initialize().await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod config;
pub mod couch;
pub mod error;
pub mod health;
pub mod marker;
pub mod metrics;
pub mod monitor;
pub mod notifier;
pub mod registry;
pub mod store;
pub mod tasks;

// Re-exports for convenience
pub use backup::{DatabaseBackup, DocumentCounts};
pub use config::{BackupConfig, MonitorConfig, PagerDutyConfig, TargetConfig};
pub use couch::CouchStore;
pub use error::{BackupError, Result};
pub use health::{BackupHealth, HealthEvaluation};
pub use monitor::{DaemonState, MonitorDaemon, MonitorEvent};
pub use notifier::PagerDutyNotifier;
pub use registry::{BackupRegistry, BackupTargetSpec};
pub use store::{DocumentStore, NoOpStore, TaskRecord};
pub use tasks::{StatusReport, StatusSnapshot};
