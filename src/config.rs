//! Configuration for the backup system.
//!
//! This module defines all configuration types needed to run the backup
//! controller and the monitoring daemon. Configuration is usually
//! deserialized from a JSON file via [`BackupConfig::from_file`], but can be
//! constructed programmatically for embedding.
//!
//! # Quick Start
//!
//! ```rust
//! use savemyseat::config::{BackupConfig, TargetConfig};
//!
//! let config = BackupConfig {
//!     couch_url: "http://localhost:5984".into(),
//!     targets: vec![
//!         TargetConfig::new("docs", "http://remote:5984/docs"),
//!     ],
//!     ..Default::default()
//! };
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! BackupConfig
//! ├── couch_url: String          # Backup server holding the target dbs
//! ├── targets: Vec<TargetConfig> # One entry per backup target, in order
//! │   ├── name: String           # Target db name on the backup server
//! │   └── source: String         # URL of the source db to back up
//! ├── monitor: MonitorConfig     # Poll interval + drift threshold
//! └── pagerduty: PagerDutyConfig # Optional alert delivery
//! ```
//!
//! Target order matters: lifecycle operations and monitor cycles walk the
//! targets strictly in the order listed here.
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "couch_url": "http://backup-host:5984",
//!   "targets": [
//!     { "name": "docs",  "source": "http://prod-host:5984/docs" },
//!     { "name": "users", "source": "http://prod-host:5984/users" }
//!   ],
//!   "monitor": {
//!     "poll_interval": "10s",
//!     "delta_threshold": 100
//!   },
//!   "pagerduty": {
//!     "enabled": true
//!   }
//! }
//! ```

use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config: loaded from file by the CLI, or built by embedders
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object for the backup system.
///
/// # Fields
///
/// - `couch_url`: the backup server; targets and `_replicator` entries live here.
/// - `targets`: the backup targets, in the order they are processed.
/// - `monitor`: monitoring daemon tunables.
/// - `pagerduty`: alert delivery settings (disabled by default).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// URL of the CouchDB server that receives the backups.
    pub couch_url: String,

    /// Backup targets, processed in listed order.
    pub targets: Vec<TargetConfig>,

    /// Monitoring daemon settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// PagerDuty alert delivery settings.
    #[serde(default)]
    pub pagerduty: PagerDutyConfig,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            couch_url: "http://localhost:5984".to_string(),
            targets: Vec::new(),
            monitor: MonitorConfig::default(),
            pagerduty: PagerDutyConfig::default(),
        }
    }
}

impl BackupConfig {
    /// Load and validate a config from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            BackupError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config: at least one target, unique target names.
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(BackupError::Config("no backup targets defined".to_string()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for target in &self.targets {
            if target.name.is_empty() {
                return Err(BackupError::Config("backup target with empty name".to_string()));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(BackupError::Config(format!(
                    "duplicate backup target name: {}",
                    target.name
                )));
            }
        }
        Ok(())
    }

    /// Create a minimal config for testing.
    pub fn for_testing(couch_url: &str) -> Self {
        Self {
            couch_url: couch_url.to_string(),
            targets: Vec::new(),
            monitor: MonitorConfig::default(),
            pagerduty: PagerDutyConfig::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TargetConfig: one entry per backup target
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for a single backup target.
///
/// `name` is the database created on the backup server; `source` is the
/// database being backed up, usually on another server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target database name on the backup server. Must be unique.
    pub name: String,

    /// URL of the source database.
    /// Example: `"http://prod-host:5984/docs"`
    pub source: String,
}

impl TargetConfig {
    /// Create a target config.
    pub fn new(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MonitorConfig: poll cadence and health thresholds
// ═══════════════════════════════════════════════════════════════════════════════

/// Monitoring daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between cycles as a duration string (e.g., "10s").
    /// Measured from the completion of one cycle to the start of the next.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Document count drift tolerated before a target is considered in
    /// error. Strictly-greater comparison: a delta equal to the threshold
    /// is still healthy. Shared by all targets.
    #[serde(default = "default_delta_threshold")]
    pub delta_threshold: i64,
}

fn default_poll_interval() -> String {
    "10s".to_string()
}

fn default_delta_threshold() -> i64 {
    100
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: "10s".to_string(),
            delta_threshold: 100,
        }
    }
}

impl MonitorConfig {
    /// Parse the poll_interval string to a Duration.
    pub fn poll_interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(10))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PagerDutyConfig: alert delivery
// ═══════════════════════════════════════════════════════════════════════════════

/// PagerDuty alert delivery configuration.
///
/// The service key can be left out of the file and supplied via the
/// `PAGER_DUTY_SERVICE_KEY` environment variable instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerDutyConfig {
    /// Whether to deliver alerts at all.
    #[serde(default = "default_false")]
    pub enabled: bool,

    /// PagerDuty generic-events service key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
}

fn default_false() -> bool {
    false
}

impl Default for PagerDutyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_key: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
