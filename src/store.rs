// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document store integration trait.
//!
//! Defines the interface the backup controller and monitor need from a
//! CouchDB-compatible store: document get/insert, database creation and
//! existence checks, reduced view queries, and active-task introspection.
//!
//! Database parameters are *locators*: either a bare database name (resolved
//! against the implementation's configured server) or an absolute URL to a
//! database on another server. Implementations must accept both, because a
//! backup target's source usually lives on a different server than the
//! target itself.
//!
//! # Example
//!
//! ```rust,no_run
//! use savemyseat::store::{DocumentStore, BoxFuture, TaskRecord};
//! use serde_json::Value;
//!
//! struct MyStore { /* ... */ }
//!
//! impl DocumentStore for MyStore {
//!     fn get_doc(&self, db: &str, id: &str) -> BoxFuture<'_, Option<Value>> {
//!         Box::pin(async move { Ok(None) })
//!     }
//!
//!     fn insert_doc(&self, db: &str, id: &str, doc: Value) -> BoxFuture<'_, Value> {
//!         Box::pin(async move { Ok(serde_json::json!({"ok": true})) })
//!     }
//!
//!     fn create_db(&self, db: &str) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn db_exists(&self, db: &str) -> BoxFuture<'_, bool> {
//!         Box::pin(async move { Ok(false) })
//!     }
//!
//!     fn reduced_view_count(&self, db: &str, design: &str, view: &str) -> BoxFuture<'_, u64> {
//!         Box::pin(async move { Ok(0) })
//!     }
//!
//!     fn active_tasks(&self) -> BoxFuture<'_, Vec<TaskRecord>> {
//!         Box::pin(async move { Ok(Vec::new()) })
//!     }
//! }
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// One record from the store's active-task introspection endpoint.
///
/// CouchDB's `_active_tasks` reports every in-flight task (compaction,
/// indexing, replication). Only the three fields the monitor cross-references
/// are kept; everything else is ignored at parse time. Non-replication tasks
/// routinely omit `target`, and replication tasks that have not failed a
/// write yet may omit `doc_write_failures`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task kind as reported by the store, e.g. `"replication"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Replication target database name, if this is a replication task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Cumulative count of documents the task failed to write.
    #[serde(default)]
    pub doc_write_failures: u64,
}

impl TaskRecord {
    /// Check if this is a replication task.
    pub fn is_replication(&self) -> bool {
        self.kind == "replication"
    }
}

/// Trait defining what we need from the document store.
///
/// The CouchDB implementation is [`CouchStore`](crate::couch::CouchStore);
/// tests drive the controller and monitor against in-memory mocks instead.
///
/// Error mapping contract for implementations:
/// - `get_doc` returns `Ok(None)` for a missing document, never an error.
/// - `insert_doc` returns [`BackupError::Conflict`](crate::BackupError::Conflict)
///   when the supplied revision is stale.
/// - `create_db` succeeds when the database already exists.
/// - Transport failures map to [`BackupError::Store`](crate::BackupError::Store).
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch a document by id. `Ok(None)` if the document does not exist.
    fn get_doc(&self, db: &str, id: &str) -> BoxFuture<'_, Option<Value>>;

    /// Insert or update a document under `id`.
    ///
    /// Updating an existing document requires the current `_rev` inside
    /// `doc`; a stale or missing revision yields a conflict error.
    /// Returns the store's response body (`{"ok": true, "id": ..., "rev": ...}`).
    fn insert_doc(&self, db: &str, id: &str, doc: Value) -> BoxFuture<'_, Value>;

    /// Create a database. Succeeds if it already exists.
    fn create_db(&self, db: &str) -> BoxFuture<'_, ()>;

    /// Check whether a database exists.
    fn db_exists(&self, db: &str) -> BoxFuture<'_, bool>;

    /// Query a view with `reduce=true` and return the aggregate count.
    ///
    /// Forces index materialization as a side effect: the first query after
    /// a design doc change blocks while the store builds the index. A view
    /// with no rows reduces to 0.
    fn reduced_view_count(&self, db: &str, design: &str, view: &str) -> BoxFuture<'_, u64>;

    /// Fetch the store's currently running tasks.
    fn active_tasks(&self) -> BoxFuture<'_, Vec<TaskRecord>>;
}

/// A no-op implementation for wiring tests and dry runs.
///
/// Logs operations but reports an empty store.
#[derive(Clone)]
pub struct NoOpStore;

impl DocumentStore for NoOpStore {
    fn get_doc(&self, db: &str, id: &str) -> BoxFuture<'_, Option<Value>> {
        let db = db.to_string();
        let id = id.to_string();
        Box::pin(async move {
            tracing::debug!(db = %db, id = %id, "NoOp: would fetch doc");
            Ok(None)
        })
    }

    fn insert_doc(&self, db: &str, id: &str, _doc: Value) -> BoxFuture<'_, Value> {
        let db = db.to_string();
        let id = id.to_string();
        Box::pin(async move {
            tracing::debug!(db = %db, id = %id, "NoOp: would insert doc");
            Ok(serde_json::json!({"ok": true, "id": id, "rev": "1-noop"}))
        })
    }

    fn create_db(&self, db: &str) -> BoxFuture<'_, ()> {
        let db = db.to_string();
        Box::pin(async move {
            tracing::debug!(db = %db, "NoOp: would create database");
            Ok(())
        })
    }

    fn db_exists(&self, db: &str) -> BoxFuture<'_, bool> {
        let db = db.to_string();
        Box::pin(async move {
            tracing::trace!(db = %db, "NoOp: db_exists check (returning false)");
            Ok(false)
        })
    }

    fn reduced_view_count(&self, db: &str, _design: &str, _view: &str) -> BoxFuture<'_, u64> {
        let db = db.to_string();
        Box::pin(async move {
            tracing::trace!(db = %db, "NoOp: reduced view count (returning 0)");
            Ok(0)
        })
    }

    fn active_tasks(&self) -> BoxFuture<'_, Vec<TaskRecord>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}
