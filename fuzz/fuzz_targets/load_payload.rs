#![no_main]

use keytrack_state::InstanceRegistry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };

    let mut registry = InstanceRegistry::default();
    if registry.load_json(json).is_err() {
        return;
    }

    // Whatever survived filtering must save and reload unchanged
    let saved = registry.to_records();
    let mut reloaded = InstanceRegistry::default();
    let report = reloaded.load(saved.clone());
    assert!(report.is_clean());
    assert_eq!(reloaded.to_records(), saved);
});
