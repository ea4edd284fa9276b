//! CouchDB implementation of the document store trait.
//!
//! One [`CouchStore`] wraps one backup server. Database locators given to
//! the trait methods are resolved here: a bare name is appended to the
//! configured server URL, an absolute `http(s)://` locator is used as-is.
//! That asymmetry is what lets a single store handle both the local target
//! databases and remote source databases in one call site.
//!
//! Status mapping follows CouchDB semantics:
//! - `404` on a document fetch means absent, not an error.
//! - `409` on a write is a revision conflict.
//! - `412` on database creation means it already exists, which is fine.

use crate::error::{BackupError, Result};
use crate::store::{BoxFuture, DocumentStore, TaskRecord};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// CouchDB-backed document store.
///
/// Cheap to clone; the underlying HTTP client is shared.
#[derive(Clone, Debug)]
pub struct CouchStore {
    client: reqwest::Client,
    base_url: String,
}

impl CouchStore {
    /// Create a store for the given server URL.
    pub fn new(server_url: &str) -> Result<Self> {
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            return Err(BackupError::Config(format!(
                "couch_url must be an http(s) URL, got: {}",
                server_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackupError::store("client init", e))?;
        Ok(Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    /// The server URL this store talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a database locator to an absolute URL.
    ///
    /// Bare names get a slash in the name percent-encoded; absolute URLs
    /// pass through untouched (their encoding is the caller's business).
    fn resolve(&self, db: &str) -> String {
        if db.starts_with("http://") || db.starts_with("https://") {
            db.trim_end_matches('/').to_string()
        } else {
            format!("{}/{}", self.base_url, db.replace('/', "%2F"))
        }
    }

    async fn read_json(response: reqwest::Response, operation: &str) -> Result<Value> {
        response
            .json::<Value>()
            .await
            .map_err(|e| BackupError::store(operation.to_string(), e))
    }
}

/// Pull the aggregate count out of a `reduce=true` view response.
///
/// CouchDB answers `{"rows": [{"key": null, "value": N}]}`, except over a
/// view with no entries where `rows` is empty; that reduces to 0.
fn count_from_view_body(body: &Value, operation: &str) -> Result<u64> {
    let rows = body
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| BackupError::Parse {
            operation: operation.to_string(),
            message: "missing rows array".to_string(),
        })?;
    match rows.first() {
        None => Ok(0),
        Some(row) => row
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| BackupError::Parse {
                operation: operation.to_string(),
                message: "row value is not a count".to_string(),
            }),
    }
}

impl DocumentStore for CouchStore {
    fn get_doc(&self, db: &str, id: &str) -> BoxFuture<'_, Option<Value>> {
        let url = format!("{}/{}", self.resolve(db), id);
        let operation = format!("GET {}", id);
        Box::pin(async move {
            let response = self
                .client
                .get(&url)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| BackupError::store(operation.clone(), e))?;

            match response.status() {
                reqwest::StatusCode::NOT_FOUND => Ok(None),
                status if status.is_success() => {
                    Ok(Some(Self::read_json(response, &operation).await?))
                }
                status => Err(BackupError::store_msg(
                    operation,
                    format!("unexpected status {}", status),
                )),
            }
        })
    }

    fn insert_doc(&self, db: &str, id: &str, doc: Value) -> BoxFuture<'_, Value> {
        let url = format!("{}/{}", self.resolve(db), id);
        let operation = format!("PUT {}", id);
        let db = db.to_string();
        let id = id.to_string();
        Box::pin(async move {
            let response = self
                .client
                .put(&url)
                .json(&doc)
                .send()
                .await
                .map_err(|e| BackupError::store(operation.clone(), e))?;

            match response.status() {
                reqwest::StatusCode::CONFLICT => Err(BackupError::Conflict { db, id }),
                status if status.is_success() => Self::read_json(response, &operation).await,
                status => Err(BackupError::store_msg(
                    operation,
                    format!("unexpected status {}", status),
                )),
            }
        })
    }

    fn create_db(&self, db: &str) -> BoxFuture<'_, ()> {
        let url = self.resolve(db);
        let operation = format!("PUT db {}", db);
        Box::pin(async move {
            let response = self
                .client
                .put(&url)
                .send()
                .await
                .map_err(|e| BackupError::store(operation.clone(), e))?;

            match response.status() {
                // 412 means the database already exists
                reqwest::StatusCode::PRECONDITION_FAILED => Ok(()),
                status if status.is_success() => Ok(()),
                status => Err(BackupError::store_msg(
                    operation,
                    format!("unexpected status {}", status),
                )),
            }
        })
    }

    fn db_exists(&self, db: &str) -> BoxFuture<'_, bool> {
        let url = self.resolve(db);
        let operation = format!("HEAD db {}", db);
        Box::pin(async move {
            let response = self
                .client
                .head(&url)
                .send()
                .await
                .map_err(|e| BackupError::store(operation.clone(), e))?;

            match response.status() {
                reqwest::StatusCode::NOT_FOUND => Ok(false),
                status if status.is_success() => Ok(true),
                status => Err(BackupError::store_msg(
                    operation,
                    format!("unexpected status {}", status),
                )),
            }
        })
    }

    fn reduced_view_count(&self, db: &str, design: &str, view: &str) -> BoxFuture<'_, u64> {
        let url = format!(
            "{}/_design/{}/_view/{}?reduce=true",
            self.resolve(db),
            design,
            view
        );
        let operation = format!("GET view {}/{}", design, view);
        Box::pin(async move {
            let response = self
                .client
                .get(&url)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| BackupError::store(operation.clone(), e))?;

            if !response.status().is_success() {
                return Err(BackupError::store_msg(
                    operation,
                    format!("unexpected status {}", response.status()),
                ));
            }
            let body = Self::read_json(response, &operation).await?;
            count_from_view_body(&body, &operation)
        })
    }

    fn active_tasks(&self) -> BoxFuture<'_, Vec<TaskRecord>> {
        let url = format!("{}/_active_tasks", self.base_url);
        Box::pin(async move {
            let response = self
                .client
                .get(&url)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| BackupError::store("GET _active_tasks", e))?;

            if !response.status().is_success() {
                return Err(BackupError::store_msg(
                    "GET _active_tasks",
                    format!("unexpected status {}", response.status()),
                ));
            }
            let body = response
                .bytes()
                .await
                .map_err(|e| BackupError::store("GET _active_tasks", e))?;
            serde_json::from_slice(&body).map_err(|e| BackupError::parse("_active_tasks", e))
        })
    }
}
