//! Fuzz target for configuration parsing.
//!
//! This tests that arbitrary config JSON either fails to parse or yields
//! a config whose accessors never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use savemyseat::config::BackupConfig;
use savemyseat::registry::BackupRegistry;

fuzz_target!(|data: &[u8]| {
    let Ok(config) = serde_json::from_slice::<BackupConfig>(data) else {
        return;
    };

    // Validation may reject, but must not panic
    let _ = config.validate();

    // Malformed intervals fall back instead of panicking
    let _ = config.monitor.poll_interval_duration();

    let registry = BackupRegistry::load(&config);
    assert_eq!(registry.len(), config.targets.len());
});
