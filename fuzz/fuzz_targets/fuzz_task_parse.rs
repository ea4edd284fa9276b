//! Fuzz target for active-task parsing and cross-referencing.
//!
//! This tests that task-list JSON of any shape either fails to parse or
//! cross-references cleanly, without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use savemyseat::registry::{BackupRegistry, BackupTargetSpec};
use savemyseat::store::TaskRecord;
use savemyseat::tasks::StatusSnapshot;

fuzz_target!(|data: &[u8]| {
    let Ok(tasks) = serde_json::from_slice::<Vec<TaskRecord>>(data) else {
        return;
    };

    let registry = BackupRegistry::from_specs(vec![
        BackupTargetSpec::new("docs", "http://prod:5984/docs"),
        BackupTargetSpec::new("users", "http://prod:5984/users"),
    ]);

    // Cross-referencing must accept whatever parsed
    let report = StatusSnapshot::from_tasks(tasks).cross_reference(&registry);

    // Targets outside the registry never appear in the report
    assert!(report.not_running.len() <= registry.len());
    for name in report.write_failures.keys() {
        assert!(registry.get(name).is_some());
    }
});
