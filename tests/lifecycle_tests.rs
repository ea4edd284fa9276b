// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! End-to-end lifecycle tests for backup registration.
//!
//! Drives the prepare/initialize flows against the in-memory mock store
//! and asserts on exactly what was written where: marker design docs,
//! target database creation, and `_replicator` entries.

mod common;

use common::MockStore;
use savemyseat::backup::{DatabaseBackup, REPLICATOR_DB};
use savemyseat::marker;
use savemyseat::registry::BackupTargetSpec;
use serde_json::json;
use std::sync::Arc;

const SOURCE: &str = "http://upstream:5984/docs";

fn make_backup(store: &Arc<MockStore>) -> DatabaseBackup<MockStore> {
    DatabaseBackup::new(Arc::clone(store), BackupTargetSpec::new("docs", SOURCE))
}

// =============================================================================
// Source preparation
// =============================================================================

#[tokio::test]
async fn test_prepare_source_writes_marker_and_builds_index() {
    let store = Arc::new(MockStore::new());
    let backup = make_backup(&store);

    backup.prepare_source().await.unwrap();

    let marker_doc = store
        .doc(SOURCE, marker::DESIGN_DOC_ID)
        .await
        .expect("marker written to source");
    assert!(marker::is_current_version(&marker_doc));

    // The count view is queried to force index materialization
    assert_eq!(store.view_queries().await, vec![SOURCE.to_string()]);
}

#[tokio::test]
async fn test_prepare_source_skips_write_when_current() {
    let store = Arc::new(MockStore::new());
    let backup = make_backup(&store);

    backup.prepare_source().await.unwrap();
    assert_eq!(store.inserts().await.len(), 1);

    backup.prepare_source().await.unwrap();
    assert_eq!(
        store.inserts().await.len(),
        1,
        "second prepare must not write"
    );

    // The index query still happens each run
    assert_eq!(store.view_queries().await.len(), 2);
}

#[tokio::test]
async fn test_prepare_source_upgrades_stale_marker_under_current_rev() {
    let store = Arc::new(MockStore::new());
    let mut stale = marker::marker_document();
    stale["version"] = json!("0.9.0");
    stale["_rev"] = json!("3-9c65296036141e575d32ba9c034dd3ee");
    store.set_doc(SOURCE, marker::DESIGN_DOC_ID, stale).await;

    make_backup(&store).prepare_source().await.unwrap();

    let writes = store.inserts_into(SOURCE).await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].doc["version"], marker::REQUIRED_VERSION);
    assert_eq!(writes[0].doc["_rev"], "3-9c65296036141e575d32ba9c034dd3ee");
}

// =============================================================================
// Source verification
// =============================================================================

#[tokio::test]
async fn test_verify_source_rejects_unprepared_source() {
    let store = Arc::new(MockStore::new());

    let err = make_backup(&store).verify_source().await.unwrap_err();
    assert!(err.is_source_not_prepared());
    assert_eq!(
        err.to_string(),
        format!("{} is missing the required design doc", SOURCE)
    );
}

#[tokio::test]
async fn test_verify_source_reports_found_version() {
    let store = Arc::new(MockStore::new());
    let mut stale = marker::marker_document();
    stale["version"] = json!("0.9.0");
    store.set_doc(SOURCE, marker::DESIGN_DOC_ID, stale).await;

    let err = make_backup(&store).verify_source().await.unwrap_err();
    assert!(err.is_source_not_prepared());
    assert_eq!(
        err.to_string(),
        "The design doc for docs is not at the correct version. \
         Expected 1.0.0. Design Doc @ 0.9.0"
    );
}

// =============================================================================
// Initialization
// =============================================================================

#[tokio::test]
async fn test_initialize_requires_prepared_source() {
    let store = Arc::new(MockStore::new());

    let err = make_backup(&store).initialize().await.unwrap_err();
    assert!(err.is_source_not_prepared());

    // Fail-fast: nothing was created or written
    assert!(store.created_dbs().await.is_empty());
    assert!(store.inserts().await.is_empty());
}

#[tokio::test]
async fn test_initialize_after_prepare_registers_replication() {
    let store = Arc::new(MockStore::new());
    let backup = make_backup(&store);

    backup.prepare_source().await.unwrap();
    backup.initialize().await.unwrap();

    assert!(store.has_db("docs").await);

    let entry = store
        .doc(REPLICATOR_DB, "docs-backup")
        .await
        .expect("replication entry registered");
    assert_eq!(entry["_id"], "docs-backup");
    assert_eq!(entry["source"], SOURCE);
    assert_eq!(entry["target"], "docs");
    assert_eq!(entry["continuous"], true);
    assert_eq!(entry["filter"], "savemyseat/nonDesignDocs");

    // Marker lives in both the source and the target database
    let target_marker = store
        .doc("docs", marker::DESIGN_DOC_ID)
        .await
        .expect("marker written to target");
    assert!(marker::is_current_version(&target_marker));
}

#[tokio::test]
async fn test_initialize_stops_at_target_creation_failure() {
    let store = Arc::new(MockStore::new());
    store
        .set_doc(SOURCE, marker::DESIGN_DOC_ID, marker::marker_document())
        .await;
    store.fail_on("create_db").await;

    let err = make_backup(&store).initialize().await.unwrap_err();
    assert!(err.is_retryable());

    // Nothing past the failing step ran
    assert!(store.inserts().await.is_empty());
}

#[tokio::test]
async fn test_initialize_twice_keeps_single_live_entry() {
    let store = Arc::new(MockStore::new());
    let backup = make_backup(&store);

    backup.prepare_source().await.unwrap();
    backup.initialize().await.unwrap();
    backup.initialize().await.unwrap();

    // First pass registers fresh; second tombstones then re-registers
    let writes = store.inserts_into(REPLICATOR_DB).await;
    assert_eq!(writes.len(), 3);

    let live = store
        .doc(REPLICATOR_DB, "docs-backup")
        .await
        .expect("entry still live after re-initialization");
    assert!(live.get("_deleted").is_none());
    assert_eq!(live["target"], "docs");
}

// =============================================================================
// Target database creation
// =============================================================================

#[tokio::test]
async fn test_ensure_target_creates_missing_db() {
    let store = Arc::new(MockStore::new());

    make_backup(&store).ensure_target_exists().await.unwrap();
    assert_eq!(store.created_dbs().await, vec!["docs".to_string()]);
}

#[tokio::test]
async fn test_ensure_target_skips_existing_db() {
    let store = Arc::new(MockStore::new());
    store.add_db("docs").await;

    make_backup(&store).ensure_target_exists().await.unwrap();
    assert!(store.created_dbs().await.is_empty());
}

// =============================================================================
// Replication entry replacement
// =============================================================================

#[tokio::test]
async fn test_replace_replication_entry_fresh_when_absent() {
    let store = Arc::new(MockStore::new());

    make_backup(&store)
        .replace_replication_entry()
        .await
        .unwrap();

    let writes = store.inserts_into(REPLICATOR_DB).await;
    assert_eq!(writes.len(), 1);
    assert!(writes[0].doc.get("_deleted").is_none());
    assert!(writes[0].doc.get("_rev").is_none());
}

#[tokio::test]
async fn test_replace_replication_entry_tombstones_then_recreates() {
    let store = Arc::new(MockStore::new());
    store
        .set_doc(
            REPLICATOR_DB,
            "docs-backup",
            json!({
                "_id": "docs-backup",
                "_rev": "5-old",
                "source": SOURCE,
                "target": "docs",
                "continuous": true,
                "filter": "savemyseat/nonDesignDocs",
            }),
        )
        .await;

    make_backup(&store)
        .replace_replication_entry()
        .await
        .unwrap();

    let writes = store.inserts_into(REPLICATOR_DB).await;
    assert_eq!(writes.len(), 2);

    // The tombstone carries the stale entry's revision
    assert_eq!(writes[0].doc["_deleted"], true);
    assert_eq!(writes[0].doc["_rev"], "5-old");

    // The replacement starts a fresh revision history
    assert!(writes[1].doc.get("_deleted").is_none());
    assert!(writes[1].doc.get("_rev").is_none());

    let live = store
        .doc(REPLICATOR_DB, "docs-backup")
        .await
        .expect("replacement entry live");
    assert_eq!(live["target"], "docs");
}

// =============================================================================
// Document counts
// =============================================================================

#[tokio::test]
async fn test_document_counts_reads_both_sides() {
    let store = Arc::new(MockStore::new());
    store.set_view_count(SOURCE, 112).await;
    store.set_view_count("docs", 100).await;

    let counts = make_backup(&store).document_counts().await.unwrap();
    assert_eq!(counts.source_count, 112);
    assert_eq!(counts.dest_count, 100);
    assert_eq!(counts.delta(), 12);
}

#[tokio::test]
async fn test_document_counts_destination_ahead() {
    // Deleted-then-compacted source documents can leave the backup ahead
    let store = Arc::new(MockStore::new());
    store.set_view_count(SOURCE, 10).await;
    store.set_view_count("docs", 12).await;

    let counts = make_backup(&store).document_counts().await.unwrap();
    assert_eq!(counts.delta(), -2);
}
