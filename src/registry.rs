//! The set of configured backup targets.
//!
//! The registry is loaded once from configuration and never mutated. It
//! preserves configuration order, and every multi-target walk in the system
//! goes through [`BackupRegistry::for_each_sequential`]: one target at a
//! time, first failure aborts the remainder. Sequential processing bounds
//! the load placed on the backing stores; the cost is cycle latency linear
//! in target count.

use crate::config::BackupConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Immutable description of one backup target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupTargetSpec {
    /// Target database name on the backup server. Unique within a registry.
    pub name: String,

    /// Locator of the source database being backed up.
    pub source: String,
}

impl BackupTargetSpec {
    /// Create a spec.
    pub fn new(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
        }
    }
}

/// Ordered collection of backup target specs.
#[derive(Debug, Clone)]
pub struct BackupRegistry {
    targets: Vec<BackupTargetSpec>,
}

impl BackupRegistry {
    /// Build a registry from configuration, preserving target order.
    pub fn load(config: &BackupConfig) -> Self {
        Self {
            targets: config
                .targets
                .iter()
                .map(|t| BackupTargetSpec::new(&t.name, &t.source))
                .collect(),
        }
    }

    /// Build a registry directly from specs.
    pub fn from_specs(targets: Vec<BackupTargetSpec>) -> Self {
        Self { targets }
    }

    /// Ordered list of target names.
    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    /// Look up a target by name. Absent is not an error.
    pub fn get(&self, name: &str) -> Option<&BackupTargetSpec> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Iterate targets in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &BackupTargetSpec> {
        self.targets.iter()
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if the registry has no targets.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Run `action` for every target, one at a time, in order.
    ///
    /// Each target's future is awaited to completion before the next target
    /// starts. The first failure aborts the remaining targets and
    /// propagates.
    pub async fn for_each_sequential<F, Fut>(&self, mut action: F) -> Result<()>
    where
        F: FnMut(BackupTargetSpec) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        for spec in &self.targets {
            action(spec.clone()).await?;
        }
        Ok(())
    }
}
