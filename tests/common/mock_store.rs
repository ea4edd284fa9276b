//! Mock DocumentStore for testing.
//!
//! Keeps documents in memory per (db, id), records every write for
//! assertions, and supports per-operation failure injection. A document
//! inserted with `"_deleted": true` is removed, mirroring how the real
//! store treats tombstones.

use savemyseat::error::BackupError;
use savemyseat::store::{BoxFuture, DocumentStore, TaskRecord};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// A recorded insert_doc() call.
#[derive(Debug, Clone)]
pub struct InsertCall {
    pub db: String,
    pub id: String,
    pub doc: Value,
}

/// In-memory DocumentStore that records all writes.
///
/// # Example
/// ```rust,ignore
/// let store = MockStore::new();
///
/// // Seed state
/// store.add_db("docs").await;
/// store.set_view_count("docs", 42).await;
///
/// // Use in tests...
///
/// // Assert what was written
/// let inserts = store.inserts().await;
/// assert_eq!(inserts.len(), 2);
/// ```
pub struct MockStore {
    /// Live documents by (db, id).
    docs: RwLock<HashMap<(String, String), Value>>,
    /// Databases that exist.
    dbs: RwLock<HashSet<String>>,
    /// Reduced view counts per database locator.
    view_counts: RwLock<HashMap<String, u64>>,
    /// Tasks returned by active_tasks().
    tasks: RwLock<Vec<TaskRecord>>,
    /// Recorded insert_doc() calls, in order.
    inserts: RwLock<Vec<InsertCall>>,
    /// Recorded create_db() calls, in order.
    creates: RwLock<Vec<String>>,
    /// Databases passed to reduced_view_count(), in order.
    view_queries: RwLock<Vec<String>>,
    /// Operation names forced to fail.
    failing_ops: RwLock<HashSet<String>>,
    /// Number of active_tasks() calls.
    task_fetches: AtomicU64,
}

impl MockStore {
    /// Create an empty store with no databases and no tasks.
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            dbs: RwLock::new(HashSet::new()),
            view_counts: RwLock::new(HashMap::new()),
            tasks: RwLock::new(Vec::new()),
            inserts: RwLock::new(Vec::new()),
            creates: RwLock::new(Vec::new()),
            view_queries: RwLock::new(Vec::new()),
            failing_ops: RwLock::new(HashSet::new()),
            task_fetches: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Place a document without recording an insert call.
    pub async fn set_doc(&self, db: &str, id: &str, doc: Value) {
        self.docs
            .write()
            .await
            .insert((db.to_string(), id.to_string()), doc);
    }

    /// Mark a database as existing.
    #[allow(dead_code)] // Only the lifecycle suite pre-creates databases
    pub async fn add_db(&self, db: &str) {
        self.dbs.write().await.insert(db.to_string());
    }

    /// Set the count the reduced view reports for a database.
    pub async fn set_view_count(&self, db: &str, count: u64) {
        self.view_counts.write().await.insert(db.to_string(), count);
    }

    /// Set the tasks active_tasks() returns.
    #[allow(dead_code)] // Only the monitor suite drives task traffic
    pub async fn set_tasks(&self, tasks: Vec<TaskRecord>) {
        *self.tasks.write().await = tasks;
    }

    // =========================================================================
    // Failure injection
    // =========================================================================

    /// Make an operation fail until cleared. Operation names match the
    /// trait methods: `get_doc`, `insert_doc`, `create_db`, `db_exists`,
    /// `reduced_view_count`, `active_tasks`.
    pub async fn fail_on(&self, operation: &str) {
        self.failing_ops.write().await.insert(operation.to_string());
    }

    /// Clear all injected failures.
    pub async fn clear_failures(&self) {
        self.failing_ops.write().await.clear();
    }

    async fn check_failure(&self, operation: &str) -> Result<(), BackupError> {
        if self.failing_ops.read().await.contains(operation) {
            return Err(BackupError::store_msg(operation, "simulated failure"));
        }
        Ok(())
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    /// All recorded insert_doc() calls.
    pub async fn inserts(&self) -> Vec<InsertCall> {
        self.inserts.read().await.clone()
    }

    /// Recorded insert_doc() calls into one database.
    #[allow(dead_code)] // Only the lifecycle suite asserts per-database writes
    pub async fn inserts_into(&self, db: &str) -> Vec<InsertCall> {
        self.inserts
            .read()
            .await
            .iter()
            .filter(|call| call.db == db)
            .cloned()
            .collect()
    }

    /// All recorded create_db() calls.
    #[allow(dead_code)] // Only the lifecycle suite asserts on creation
    pub async fn created_dbs(&self) -> Vec<String> {
        self.creates.read().await.clone()
    }

    /// Databases queried through reduced_view_count(), in order.
    #[allow(dead_code)] // Not every suite asserts on view traffic
    pub async fn view_queries(&self) -> Vec<String> {
        self.view_queries.read().await.clone()
    }

    /// Current live content of a document.
    pub async fn doc(&self, db: &str, id: &str) -> Option<Value> {
        self.docs
            .read()
            .await
            .get(&(db.to_string(), id.to_string()))
            .cloned()
    }

    /// Whether a database currently exists.
    #[allow(dead_code)] // Only the lifecycle suite asserts on existence
    pub async fn has_db(&self, db: &str) -> bool {
        self.dbs.read().await.contains(db)
    }

    /// How many times active_tasks() was called.
    pub fn task_fetch_count(&self) -> u64 {
        self.task_fetches.load(Ordering::SeqCst)
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MockStore {
    fn get_doc(&self, db: &str, id: &str) -> BoxFuture<'_, Option<Value>> {
        let db = db.to_string();
        let id = id.to_string();
        Box::pin(async move {
            self.check_failure("get_doc").await?;
            Ok(self.docs.read().await.get(&(db, id)).cloned())
        })
    }

    fn insert_doc(&self, db: &str, id: &str, doc: Value) -> BoxFuture<'_, Value> {
        let db = db.to_string();
        let id = id.to_string();
        Box::pin(async move {
            self.check_failure("insert_doc").await?;

            self.inserts.write().await.push(InsertCall {
                db: db.clone(),
                id: id.clone(),
                doc: doc.clone(),
            });

            let key = (db, id.clone());
            if doc.get("_deleted") == Some(&Value::Bool(true)) {
                self.docs.write().await.remove(&key);
            } else {
                self.docs.write().await.insert(key, doc);
            }

            Ok(serde_json::json!({"ok": true, "id": id, "rev": "1-mock"}))
        })
    }

    fn create_db(&self, db: &str) -> BoxFuture<'_, ()> {
        let db = db.to_string();
        Box::pin(async move {
            self.check_failure("create_db").await?;
            self.creates.write().await.push(db.clone());
            self.dbs.write().await.insert(db);
            Ok(())
        })
    }

    fn db_exists(&self, db: &str) -> BoxFuture<'_, bool> {
        let db = db.to_string();
        Box::pin(async move {
            self.check_failure("db_exists").await?;
            Ok(self.dbs.read().await.contains(&db))
        })
    }

    fn reduced_view_count(&self, db: &str, _design: &str, _view: &str) -> BoxFuture<'_, u64> {
        let db = db.to_string();
        Box::pin(async move {
            self.check_failure("reduced_view_count").await?;
            self.view_queries.write().await.push(db.clone());
            Ok(self.view_counts.read().await.get(&db).copied().unwrap_or(0))
        })
    }

    fn active_tasks(&self) -> BoxFuture<'_, Vec<TaskRecord>> {
        Box::pin(async move {
            self.task_fetches.fetch_add(1, Ordering::SeqCst);
            self.check_failure("active_tasks").await?;
            Ok(self.tasks.read().await.clone())
        })
    }
}

/// A replication task entry as `_active_tasks` would report it.
#[allow(dead_code)] // Only the monitor suite fabricates task traffic
pub fn replication_task(target: &str, doc_write_failures: u64) -> TaskRecord {
    TaskRecord {
        kind: "replication".to_string(),
        target: Some(target.to_string()),
        doc_write_failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_inserts() {
        let store = MockStore::new();

        store
            .insert_doc("docs", "doc-1", serde_json::json!({"a": 1}))
            .await
            .unwrap();

        let inserts = store.inserts().await;
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].db, "docs");
        assert_eq!(inserts[0].id, "doc-1");
        assert_eq!(inserts[0].doc["a"], 1);
        assert_eq!(store.doc("docs", "doc-1").await, Some(serde_json::json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_mock_tombstone_removes_doc() {
        let store = MockStore::new();
        store.set_doc("_replicator", "docs-backup", serde_json::json!({"x": 1})).await;

        store
            .insert_doc(
                "_replicator",
                "docs-backup",
                serde_json::json!({"x": 1, "_deleted": true}),
            )
            .await
            .unwrap();

        assert!(store.doc("_replicator", "docs-backup").await.is_none());
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let store = MockStore::new();
        store.fail_on("active_tasks").await;
        assert!(store.active_tasks().await.is_err());

        store.clear_failures().await;
        assert!(store.active_tasks().await.is_ok());
        assert_eq!(store.task_fetch_count(), 2);
    }
}
