#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let r = triagebox::triage::sniffers::ContentSniffer::sniff_bytes(data);
    assert_eq!(r.mime.is_none(), r.extension.is_none());
});
