#![no_main]
use libfuzzer_sys::fuzz_target;
use triagebox::rules::{RuleSet, ScanLimits};

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else { return };
    if let Ok(rules) = RuleSet::compile(source) {
        let _ = rules.scan_bytes(data, &ScanLimits::default());
    }
});
