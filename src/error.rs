// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the backup system.
//!
//! This module defines the error types used throughout the backup controller
//! and monitoring daemon. Errors are categorized by their source (store
//! transport, document state, configuration) and include context to help with
//! debugging.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Store` | Yes | Network/protocol failures talking to CouchDB |
//! | `SourceNotPrepared` | No | Source lacks the backup design doc |
//! | `SourceVersionMismatch` | No | Design doc present but wrong version |
//! | `Conflict` | No | Document write conflict (revision raced) |
//! | `Parse` | No | Store response had an unexpected shape |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Daemon lifecycle violation |
//!
//! # Retry Behavior
//!
//! Use [`BackupError::is_retryable()`] to determine if an operation should be
//! retried. Transport errors are transient; everything else needs either an
//! operator (`Config`, `SourceNotPrepared`) or a code path change
//! (`prepare_source` is the only fix for an unprepared source). Write
//! conflicts are surfaced unchanged: the system assumes a single writer per
//! target, so a conflict means a second daemon instance is running against
//! the same backup set.

use thiserror::Error;

/// Result type alias for backup operations.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Errors that can occur while registering or monitoring backups.
///
/// Each variant includes context about where the error occurred.
/// Use [`is_retryable()`](Self::is_retryable) to check if the operation
/// should be retried.
#[derive(Error, Debug)]
pub enum BackupError {
    /// The source database has never been prepared for backup.
    ///
    /// The required design doc is absent. Only `prepare_source` fixes this;
    /// `verify_source` and `initialize` fail for this target until it runs.
    #[error("{db} is missing the required design doc")]
    SourceNotPrepared { db: String },

    /// The source's design doc exists but carries the wrong version.
    ///
    /// Raised when the marker predates (or postdates) the version this
    /// build requires. Re-running `prepare_source` upgrades it in place.
    #[error("The design doc for {name} is not at the correct version. Expected {expected}. Design Doc @ {found}")]
    SourceVersionMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// Store transport error.
    ///
    /// Network failures, timeouts, or unexpected HTTP statuses from CouchDB.
    /// Retryable. Inside the monitor loop these degrade the current cycle to
    /// a fault event without stopping the daemon.
    #[error("Store error ({operation}): {message}")]
    Store {
        operation: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Document write conflict.
    ///
    /// The revision we supplied was stale. Not retried automatically:
    /// a conflict under the single-writer assumption indicates concurrent
    /// daemon instances, which operators must resolve.
    #[error("Conflict writing {id} in {db}")]
    Conflict { db: String, id: String },

    /// Store response parsing failure.
    ///
    /// The store answered but the body had an unexpected shape.
    /// Not retryable until the store (or this build) changes.
    #[error("Response parse error ({operation}): {message}")]
    Parse { operation: String, message: String },

    /// Invalid or missing configuration.
    ///
    /// Occurs during startup if config is malformed.
    /// Not retryable. Fix the configuration and restart.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Daemon lifecycle violation.
    ///
    /// Occurs when an operation is attempted in the wrong state
    /// (e.g., calling `start()` on an already-running daemon).
    /// Not retryable. Indicates a bug in the caller.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl BackupError {
    /// Create a Store error from a reqwest error.
    pub fn store(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Store {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a Store error without a source (e.g. unexpected status code).
    pub fn store_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a Parse error from a serde_json error.
    pub fn parse(operation: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Parse {
            operation: operation.into(),
            message: source.to_string(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store { .. } => true, // Network errors are retryable
            Self::SourceNotPrepared { .. } => false,
            Self::SourceVersionMismatch { .. } => false,
            Self::Conflict { .. } => false, // Single-writer assumption violated
            Self::Parse { .. } => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
        }
    }

    /// Check if this is a source-preparation failure (absent or wrong-version
    /// marker). `initialize` callers use this to suggest `prepare_source`.
    pub fn is_source_not_prepared(&self) -> bool {
        matches!(
            self,
            Self::SourceNotPrepared { .. } | Self::SourceVersionMismatch { .. }
        )
    }

    /// Check if this is a document write conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<reqwest::Error> for BackupError {
    fn from(e: reqwest::Error) -> Self {
        Self::store("unknown", e)
    }
}
