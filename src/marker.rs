//! The backup marker design doc.
//!
//! Every prepared source (and every initialized target) carries a design doc
//! `_design/savemyseat` that serves three jobs at once:
//!
//! - **Readiness sentinel**: its presence at the required version is what
//!   `verify_source` checks before any replication is registered.
//! - **Count view**: a map/reduce view over non-design documents, queried
//!   with `reduce=true` to produce the fast document counts the monitor
//!   compares between source and target.
//! - **Replication filter**: a filter function that keeps design docs (this
//!   one included) out of the replicated stream, so the target's marker is
//!   managed by us rather than clobbered by replication.
//!
//! The map and filter bodies are JavaScript executed inside CouchDB's own
//! view engine. They are shipped as opaque string payloads and compared by
//! the `version` field only; do not edit them without bumping
//! [`REQUIRED_VERSION`].

use serde_json::{json, Value};

/// Version the design doc must carry for this build to accept a source.
pub const REQUIRED_VERSION: &str = "1.0.0";

/// Name of the design doc (and the namespace of its view and filter).
pub const DESIGN_DOC_NAME: &str = "savemyseat";

/// Name shared by the count view and the replication filter.
pub const VIEW_NAME: &str = "nonDesignDocs";

/// Full document id of the marker design doc.
pub const DESIGN_DOC_ID: &str = "_design/savemyseat";

/// Filter reference written into every replication entry.
pub const REPLICATION_FILTER: &str = "savemyseat/nonDesignDocs";

/// Map function for the count view. Runs inside CouchDB.
pub const COUNT_VIEW_MAP: &str = r#"function(doc) {
        // Get a count of all non-design documents
        if(doc._id.substr(0, 1) !== '_') {
          emit(doc._id, null);
        }

      }"#;

/// Filter function excluding design docs from replication. Runs inside CouchDB.
pub const REPLICATION_FILTER_FN: &str = r#"function(doc, req) {
      // Skip design docs
      if(doc._id.substr(0, 1) === '_') {
        return false;
      }
      return true;
    }"#;

/// Build a fresh marker design doc (no revision token).
///
/// Callers upserting over an existing doc must copy the current `_rev` in
/// before writing, or the store rejects the write with a conflict.
pub fn marker_document() -> Value {
    json!({
        "_id": DESIGN_DOC_ID,
        "version": REQUIRED_VERSION,
        "views": {
            VIEW_NAME: {
                "map": COUNT_VIEW_MAP,
                "reduce": "_count",
            }
        },
        "filters": {
            VIEW_NAME: REPLICATION_FILTER_FN,
        }
    })
}

/// Extract the `version` field of a loaded marker, if it is a string.
pub fn version_of(doc: &Value) -> Option<&str> {
    doc.get("version").and_then(Value::as_str)
}

/// Check whether a loaded marker is at the version this build requires.
///
/// A missing or non-string `version` field counts as not current.
pub fn is_current_version(doc: &Value) -> bool {
    version_of(doc) == Some(REQUIRED_VERSION)
}
