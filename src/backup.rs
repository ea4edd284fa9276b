// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-target backup lifecycle.
//!
//! A [`DatabaseBackup`] drives one target through its lifecycle against the
//! document store:
//!
//! 1. **Verify** the source carries the marker design doc at the required
//!    version (read-only; the gate for everything else).
//! 2. **Prepare** the source: upsert the marker, then query its view once to
//!    force CouchDB to build the index.
//! 3. **Initialize** the backup: verify source, ensure the target database
//!    exists, push the same marker to the target, then register replication.
//! 4. **Replace** the replication entry in `_replicator`.
//!
//! # Why replace instead of edit
//!
//! CouchDB keys an in-flight replication off the identity *and revision* of
//! its `_replicator` document. Editing the document in place does not
//! reliably restart the stream. Registration therefore always retires the
//! old entry (tombstone write) and creates a brand-new document under the
//! same deterministic id. At most one live entry per target exists at any
//! time.
//!
//! Each lifecycle operation is fail-fast: the first failing step aborts the
//! remainder, with no partial rollback. Nothing here retries; callers that
//! want resilience re-invoke the operation.

use crate::error::{BackupError, Result};
use crate::marker;
use crate::registry::BackupTargetSpec;
use crate::store::DocumentStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// The replication registration database on the backup server.
pub const REPLICATOR_DB: &str = "_replicator";

/// Materialized document counts for one target, captured in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DocumentCounts {
    /// Non-design documents in the source database.
    pub source_count: u64,

    /// Non-design documents in the target database.
    pub dest_count: u64,
}

impl DocumentCounts {
    /// Source minus destination. Positive means the backup is behind.
    pub fn delta(&self) -> i64 {
        self.source_count as i64 - self.dest_count as i64
    }
}

/// Lifecycle controller for one backup target.
pub struct DatabaseBackup<S> {
    store: Arc<S>,
    spec: BackupTargetSpec,
}

impl<S> Clone for DatabaseBackup<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            spec: self.spec.clone(),
        }
    }
}

impl<S: DocumentStore> DatabaseBackup<S> {
    /// Create a controller for one target.
    pub fn new(store: Arc<S>, spec: BackupTargetSpec) -> Self {
        Self { store, spec }
    }

    /// Target database name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Source database locator.
    pub fn source(&self) -> &str {
        &self.spec.source
    }

    /// Deterministic id of this target's `_replicator` entry.
    pub fn replication_entry_id(&self) -> String {
        format!("{}-backup", self.spec.name)
    }

    /// Build a fresh replication entry for this target.
    pub fn replication_entry(&self) -> Value {
        json!({
            "_id": self.replication_entry_id(),
            "source": self.spec.source,
            "target": self.spec.name,
            "continuous": true,
            "filter": marker::REPLICATION_FILTER,
        })
    }

    /// Check that the source is prepared for backup. Read-only.
    ///
    /// Fails with [`BackupError::SourceNotPrepared`] when the marker is
    /// absent and [`BackupError::SourceVersionMismatch`] when it is present
    /// at the wrong version.
    pub async fn verify_source(&self) -> Result<()> {
        let marker_doc = self.store.get_doc(&self.spec.source, marker::DESIGN_DOC_ID).await?;

        let Some(marker_doc) = marker_doc else {
            return Err(BackupError::SourceNotPrepared {
                db: self.spec.source.clone(),
            });
        };

        if !marker::is_current_version(&marker_doc) {
            return Err(BackupError::SourceVersionMismatch {
                name: self.spec.name.clone(),
                expected: marker::REQUIRED_VERSION.to_string(),
                found: marker::version_of(&marker_doc).unwrap_or("unknown").to_string(),
            });
        }

        Ok(())
    }

    /// Prepare the source database for backup. Idempotent.
    ///
    /// Upserts the marker (skipping the write entirely when the stored
    /// version already matches), then queries the count view once. The
    /// count is discarded; the query exists to make the store build the
    /// index now rather than during the first monitor cycle.
    pub async fn prepare_source(&self) -> Result<()> {
        self.upsert_marker(&self.spec.source).await?;
        self.materialize_index(&self.spec.source).await?;
        info!(target_db = %self.spec.name, source = %self.spec.source, "source prepared for backup");
        Ok(())
    }

    /// Create the target database if it does not exist yet.
    pub async fn ensure_target_exists(&self) -> Result<()> {
        if self.store.db_exists(&self.spec.name).await? {
            return Ok(());
        }
        info!(target_db = %self.spec.name, "creating backup database");
        self.store.create_db(&self.spec.name).await
    }

    /// Bring this target into a replicating state.
    ///
    /// Verify source, ensure the target database exists, push the marker to
    /// the target, register replication. Fail-fast: the first failing step
    /// aborts the rest.
    pub async fn initialize(&self) -> Result<()> {
        debug!(target_db = %self.spec.name, "initializing backup");

        self.verify_source().await?;
        self.ensure_target_exists().await?;
        self.upsert_marker(&self.spec.name).await?;
        self.materialize_index(&self.spec.name).await?;
        self.replace_replication_entry().await?;

        info!(target_db = %self.spec.name, source = %self.spec.source, "backup initialized");
        Ok(())
    }

    /// Retire any existing replication entry and register a fresh one.
    ///
    /// When a live entry exists it is tombstoned first; the tombstone is
    /// skipped otherwise. A conflict on either write means another writer
    /// is managing this target's entry, which is unsupported.
    pub async fn replace_replication_entry(&self) -> Result<()> {
        let entry_id = self.replication_entry_id();

        let current = self.store.get_doc(REPLICATOR_DB, &entry_id).await?;
        if let Some(mut entry) = current {
            entry["_deleted"] = Value::Bool(true);
            debug!(target_db = %self.spec.name, entry_id = %entry_id, "retiring previous replication entry");
            self.store.insert_doc(REPLICATOR_DB, &entry_id, entry).await?;
        }

        self.store
            .insert_doc(REPLICATOR_DB, &entry_id, self.replication_entry())
            .await?;
        info!(target_db = %self.spec.name, entry_id = %entry_id, "replication entry registered");
        Ok(())
    }

    /// Materialized document counts for source and target.
    ///
    /// Assumes both indexes exist, which `prepare_source`/`initialize`
    /// guarantee; a missing index surfaces as a store error.
    pub async fn document_counts(&self) -> Result<DocumentCounts> {
        let source_count = self.materialize_index(&self.spec.source).await?;
        let dest_count = self.materialize_index(&self.spec.name).await?;
        Ok(DocumentCounts {
            source_count,
            dest_count,
        })
    }

    /// Conditionally write the marker into `db`.
    ///
    /// No write when the stored version already matches. An existing marker
    /// at any other version is overwritten under its current revision
    /// token, so the upgrade never conflicts with itself.
    async fn upsert_marker(&self, db: &str) -> Result<()> {
        let existing = self.store.get_doc(db, marker::DESIGN_DOC_ID).await?;

        if let Some(ref doc) = existing {
            if marker::is_current_version(doc) {
                debug!(db = %db, "marker already at required version");
                return Ok(());
            }
        }

        let mut fresh = marker::marker_document();
        if let Some(rev) = existing.as_ref().and_then(|d| d.get("_rev")) {
            fresh["_rev"] = rev.clone();
        }

        info!(
            db = %db,
            found = existing.as_ref().and_then(marker::version_of).unwrap_or("none"),
            "writing marker design doc"
        );
        self.store.insert_doc(db, marker::DESIGN_DOC_ID, fresh).await?;
        Ok(())
    }

    /// Query the count view with `reduce=true`, forcing index build.
    async fn materialize_index(&self, db: &str) -> Result<u64> {
        self.store
            .reduced_view_count(db, marker::DESIGN_DOC_NAME, marker::VIEW_NAME)
            .await
    }
}
