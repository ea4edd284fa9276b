// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Active-task snapshots and per-cycle status reports.
//!
//! Each monitor cycle starts by snapshotting the backup server's running
//! tasks and cross-referencing them against the registry. The result is a
//! [`StatusReport`]: which registered targets have no replication task
//! running, and which running replications are accumulating write failures.
//!
//! Cross-referencing is deliberately lenient. The task list contains
//! compactions, indexer jobs, and replications for databases we never
//! registered; all of those are ignored, never errors. Only the *absence*
//! of an expected replication is meaningful.

use crate::error::Result;
use crate::registry::BackupRegistry;
use crate::store::{DocumentStore, TaskRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A point-in-time capture of the store's running tasks.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    tasks: Vec<TaskRecord>,
}

impl StatusSnapshot {
    /// Fetch the current task list from the store.
    pub async fn fetch<S: DocumentStore + ?Sized>(store: &S) -> Result<Self> {
        let tasks = store.active_tasks().await?;
        Ok(Self { tasks })
    }

    /// Build a snapshot from an already-fetched task list.
    pub fn from_tasks(tasks: Vec<TaskRecord>) -> Self {
        Self { tasks }
    }

    /// The raw task records in this snapshot.
    pub fn tasks(&self) -> &[TaskRecord] {
        &self.tasks
    }

    /// Cross-reference the snapshot against the registry.
    ///
    /// A registered target counts as running when some `"replication"` task
    /// names it as its target. Matching tasks with a nonzero
    /// `doc_write_failures` land in the failures map.
    pub fn cross_reference(&self, registry: &BackupRegistry) -> StatusReport {
        let mut running: BTreeSet<&str> = BTreeSet::new();
        let mut write_failures: BTreeMap<String, u64> = BTreeMap::new();

        for task in &self.tasks {
            if !task.is_replication() {
                continue;
            }
            let Some(target) = task.target.as_deref() else {
                continue;
            };
            if registry.get(target).is_none() {
                continue;
            }

            running.insert(target);

            if task.doc_write_failures != 0 {
                write_failures.insert(target.to_string(), task.doc_write_failures);
            }
        }

        let not_running = registry
            .names()
            .into_iter()
            .filter(|name| !running.contains(name))
            .map(String::from)
            .collect();

        StatusReport {
            not_running,
            write_failures,
        }
    }
}

/// Per-cycle view of how the registered backups are doing.
///
/// Rebuilt from scratch every cycle; never carried across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Registered targets with no running replication task.
    pub not_running: BTreeSet<String>,

    /// Write-failure counts for running replications that reported any.
    pub write_failures: BTreeMap<String, u64>,
}

impl StatusReport {
    /// Check whether a target's replication was observed running.
    pub fn is_running(&self, name: &str) -> bool {
        !self.not_running.contains(name)
    }

    /// Write-failure count for a target; 0 when none were reported.
    pub fn write_failures_for(&self, name: &str) -> u64 {
        self.write_failures.get(name).copied().unwrap_or(0)
    }
}
