#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let labels = triagebox::triage::signatures::scan_bytes(data);
    if data.starts_with(b"PK\x03\x04") {
        assert!(!labels.is_empty());
    }
});
