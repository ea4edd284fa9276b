//! Per-target backup health.
//!
//! Not a named-state machine: each target owns a [`BackupHealth`] aggregate
//! whose three inputs (running flag, write failures, document count delta)
//! are overwritten every monitor cycle, and whose single output flag is
//! recomputed from them on demand.
//!
//! # Edge triggering
//!
//! ```text
//! cycle:        1        2        3        4        5
//! input:       ok      fail     fail      ok       ok
//! is_in_error: false   true     true     false    false
//! has_changed:  -       yes      no       yes      no
//!                        │                 │
//!                        └─ error-triggered└─ error-resolved
//! ```
//!
//! `evaluate()` always updates the stored flag, but `has_changed` is true
//! only on the cycle where the flag flips. The monitor emits events solely
//! on those edges, so a target stuck in error for a week pages once, not
//! every ten seconds.
//!
//! The episode id is minted when the aggregate is constructed and never
//! rotated, so a trigger and its matching resolve always correlate.

use uuid::Uuid;

/// Count drift tolerated before a target is considered in error.
pub const DEFAULT_DELTA_THRESHOLD: i64 = 100;

/// Health aggregate for one backup target.
///
/// Owned exclusively by the monitor loop; nothing else reads or writes it.
/// A fresh aggregate assumes the backup is healthy until observed otherwise.
#[derive(Debug, Clone)]
pub struct BackupHealth {
    is_running: bool,
    doc_write_failures: u64,
    document_count_delta: i64,
    is_in_error: bool,
    threshold: i64,
    episode_id: Uuid,
}

/// Outcome of one [`BackupHealth::evaluate`] call.
#[derive(Debug, Clone)]
pub struct HealthEvaluation {
    /// Whether the target is currently in error.
    pub is_in_error: bool,

    /// Whether `is_in_error` differs from the previous evaluation.
    pub has_changed: bool,

    /// One reason per failing condition, in fixed order:
    /// not-running, write-failures, count-drift. Empty when healthy.
    pub reasons: Vec<String>,

    /// Correlates the trigger/resolve pair for downstream alerting.
    pub episode_id: Uuid,
}

impl Default for BackupHealth {
    fn default() -> Self {
        Self::new(DEFAULT_DELTA_THRESHOLD)
    }
}

impl BackupHealth {
    /// Create a healthy aggregate with the given drift threshold.
    pub fn new(threshold: i64) -> Self {
        Self {
            is_running: true,
            doc_write_failures: 0,
            document_count_delta: 0,
            is_in_error: false,
            threshold,
            episode_id: Uuid::new_v4(),
        }
    }

    /// Overwrite the three observed inputs for this cycle.
    pub fn record_observation(
        &mut self,
        is_running: bool,
        doc_write_failures: u64,
        document_count_delta: i64,
    ) {
        self.is_running = is_running;
        self.doc_write_failures = doc_write_failures;
        self.document_count_delta = document_count_delta;
    }

    /// Recompute the error flag from the current inputs.
    ///
    /// Strictly-greater on the threshold: a delta equal to the threshold is
    /// healthy. The stored flag is always updated, whether or not it
    /// changed.
    pub fn evaluate(&mut self) -> HealthEvaluation {
        let mut reasons = Vec::new();
        let mut is_in_error = false;

        if !self.is_running {
            is_in_error = true;
            reasons.push("Backup is not running".to_string());
        }
        if self.doc_write_failures > 0 {
            is_in_error = true;
            reasons.push("Document write failures are greater than 0".to_string());
        }
        if self.document_count_delta > self.threshold {
            is_in_error = true;
            reasons.push(format!(
                "The source contains {} more documents than the backup which is above the threshold of {}",
                self.document_count_delta, self.threshold
            ));
        }

        let has_changed = self.is_in_error != is_in_error;
        self.is_in_error = is_in_error;

        HealthEvaluation {
            is_in_error,
            has_changed,
            reasons,
            episode_id: self.episode_id,
        }
    }

    /// The stored error flag from the last evaluation.
    pub fn is_in_error(&self) -> bool {
        self.is_in_error
    }

    /// Stable id correlating this aggregate's trigger/resolve events.
    pub fn episode_id(&self) -> Uuid {
        self.episode_id
    }

    /// The configured drift threshold.
    pub fn threshold(&self) -> i64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_health_is_healthy() {
        let mut health = BackupHealth::default();
        let eval = health.evaluate();

        assert!(!eval.is_in_error);
        assert!(!eval.has_changed);
        assert!(eval.reasons.is_empty());
        assert_eq!(health.threshold(), DEFAULT_DELTA_THRESHOLD);
    }

    #[test]
    fn test_not_running_always_errors() {
        let mut health = BackupHealth::default();
        health.record_observation(false, 0, 0);
        let eval = health.evaluate();

        assert!(eval.is_in_error);
        assert!(eval.has_changed);
        assert_eq!(eval.reasons, vec!["Backup is not running".to_string()]);
    }

    #[test]
    fn test_write_failures_error() {
        let mut health = BackupHealth::default();
        health.record_observation(true, 3, 0);
        let eval = health.evaluate();

        assert!(eval.is_in_error);
        assert_eq!(
            eval.reasons,
            vec!["Document write failures are greater than 0".to_string()]
        );
    }

    #[test]
    fn test_delta_threshold_is_strict() {
        let mut health = BackupHealth::new(100);

        health.record_observation(true, 0, 100);
        assert!(!health.evaluate().is_in_error);

        health.record_observation(true, 0, 101);
        let eval = health.evaluate();
        assert!(eval.is_in_error);
        assert_eq!(
            eval.reasons,
            vec![
                "The source contains 101 more documents than the backup which is above the threshold of 100"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_negative_delta_is_healthy() {
        // Target ahead of source (e.g. source purged); drift is one-sided
        let mut health = BackupHealth::new(100);
        health.record_observation(true, 0, -5000);
        assert!(!health.evaluate().is_in_error);
    }

    #[test]
    fn test_reasons_fixed_order_all_conditions() {
        let mut health = BackupHealth::new(10);
        health.record_observation(false, 7, 50);
        let eval = health.evaluate();

        assert_eq!(eval.reasons.len(), 3);
        assert_eq!(eval.reasons[0], "Backup is not running");
        assert_eq!(eval.reasons[1], "Document write failures are greater than 0");
        assert!(eval.reasons[2].starts_with("The source contains 50"));
    }

    #[test]
    fn test_has_changed_only_on_edges() {
        let mut health = BackupHealth::default();

        health.record_observation(true, 3, 0);
        assert!(health.evaluate().has_changed); // healthy -> error

        health.record_observation(true, 5, 0);
        assert!(!health.evaluate().has_changed); // still error

        health.record_observation(true, 0, 0);
        let resolved = health.evaluate();
        assert!(resolved.has_changed); // error -> healthy
        assert!(!resolved.is_in_error);
        assert!(resolved.reasons.is_empty());

        assert!(!health.evaluate().has_changed); // still healthy
    }

    #[test]
    fn test_stored_flag_updated_without_change() {
        let mut health = BackupHealth::default();
        health.record_observation(false, 0, 0);
        health.evaluate();
        assert!(health.is_in_error());

        health.record_observation(false, 2, 0);
        let eval = health.evaluate();
        assert!(!eval.has_changed);
        assert!(health.is_in_error());
    }

    #[test]
    fn test_episode_id_stable_across_flips() {
        let mut health = BackupHealth::default();
        let initial = health.episode_id();

        health.record_observation(false, 0, 0);
        let triggered = health.evaluate();

        health.record_observation(true, 0, 0);
        let resolved = health.evaluate();

        assert_eq!(triggered.episode_id, initial);
        assert_eq!(resolved.episode_id, initial);
    }

    #[test]
    fn test_distinct_targets_get_distinct_episode_ids() {
        let a = BackupHealth::default();
        let b = BackupHealth::default();
        assert_ne!(a.episode_id(), b.episode_id());
    }
}
