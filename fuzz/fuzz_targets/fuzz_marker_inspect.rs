//! Fuzz target for marker version inspection.
//!
//! This tests that version detection never panics on documents of any
//! shape.

#![no_main]

use libfuzzer_sys::fuzz_target;
use savemyseat::marker;

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let version = marker::version_of(&doc);
    let current = marker::is_current_version(&doc);

    // Only the required version string counts as current
    if current {
        assert_eq!(version, Some(marker::REQUIRED_VERSION));
    }
});
