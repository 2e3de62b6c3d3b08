use crate::common::*;
use triagebox::triage::{Analyzer, ErrorKind};
use triagebox::TriageError;

#[tokio::test]
async fn traversal_entry_rejects_whole_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "evil.zip",
        &[("ok.txt", b"harmless"), ("../../etc/passwd", b"root:x:0:0")],
    );
    let config = test_config(tmp.path());
    let extract_root = config.storage.extract_dir.clone();

    let err = pipeline(config).triage_archive(&archive).await.unwrap_err();
    assert!(
        matches!(err, TriageError::PathTraversal { ref entry } if entry == "../../etc/passwd"),
        "{err:?}"
    );
    assert!(!tmp.path().join("etc/passwd").exists());
    assert!(!tmp.path().join("etc").exists());
    assert_eq!(count_entries(&extract_root), 0, "scratch directory left behind");
}

#[tokio::test]
async fn absolute_entry_is_traversal() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(tmp.path(), "abs.zip", &[("/tmp/owned", b"x")]);

    let err = pipeline(test_config(tmp.path()))
        .triage_archive(&archive)
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::PathTraversal { .. }), "{err:?}");
}

#[tokio::test]
async fn non_archive_upload_fails_to_open() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("not.zip");
    std::fs::write(&path, b"this is plainly not a zip archive").unwrap();

    let err = pipeline(test_config(tmp.path()))
        .triage_archive(&path)
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::ArchiveOpen(_)), "{err:?}");
    assert!(err.is_fatal());
}

#[tokio::test]
async fn entry_limit_is_enforced() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "many.zip",
        &[("a", b"1"), ("b", b"2"), ("c", b"3")],
    );
    let mut config = test_config(tmp.path());
    config.extraction.max_entries = 2;

    let err = pipeline(config).triage_archive(&archive).await.unwrap_err();
    assert!(
        matches!(err, TriageError::ArchiveTooLarge { resource: "entries", used: 3, limit: 2 }),
        "{err:?}"
    );
}

#[tokio::test]
async fn expanded_size_limit_is_enforced() {
    let tmp = tempfile::tempdir().unwrap();
    let big = vec![0u8; 64 * 1024];
    let archive = write_zip(tmp.path(), "bomb.zip", &[("zeros.bin", big.as_slice())]);
    let mut config = test_config(tmp.path());
    config.extraction.max_file_bytes = 1024;
    let extract_root = config.storage.extract_dir.clone();

    let err = pipeline(config).triage_archive(&archive).await.unwrap_err();
    assert!(matches!(err, TriageError::ArchiveTooLarge { .. }), "{err:?}");
    assert_eq!(count_entries(&extract_root), 0);
}

#[tokio::test]
async fn truncated_image_degrades_only_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let mut jpeg = jpeg_with_make();
    jpeg.truncate(16);
    let archive = write_zip(
        tmp.path(),
        "broken.zip",
        &[("broken.jpg", jpeg.as_slice()), ("fine.png", PNG_1X1)],
    );

    let report = pipeline(test_config(tmp.path()))
        .triage_archive(&archive)
        .await
        .unwrap();
    assert_eq!(report.len(), 2);

    let broken = &report.files[0];
    assert_eq!(broken.file_mime_type(), Some("image/jpeg"));
    assert_eq!(broken.embedded_files(), &["JPEG image".to_string()]);
    assert!(broken.exif_data().is_empty());
    let err = broken
        .error_for(Analyzer::MetadataExtractor)
        .expect("metadata failure recorded");
    assert_eq!(err.kind, ErrorKind::UnsupportedImage);
    assert_eq!(broken.errors().len(), 1);

    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v[0]["errors"][0]["analyzer"], "metadata_extractor");
    assert_eq!(v[0]["errors"][0]["kind"], "unsupported_image");
    assert!(v[1].get("errors").is_none());
}

#[tokio::test]
async fn rule_budget_failure_is_not_evaluated() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(tmp.path(), "a.zip", &[("aaaa.txt", b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")]);
    let mut config = test_config(tmp.path());
    config.analysis.max_matches_per_string = 4;
    let rules = triagebox::rules::RuleSet::compile(
        r#"rule many_a { strings: $a = "a" condition: #a > 100 }"#,
    )
    .unwrap();
    let pipeline = triagebox::triage::Pipeline::new(
        std::sync::Arc::new(config),
        std::sync::Arc::new(rules),
    );

    let report = pipeline.triage_archive(&archive).await.unwrap();
    let file = &report.files[0];
    assert_eq!(file.matched_rules(), None);
    let err = file.error_for(Analyzer::RuleEngine).expect("rule failure recorded");
    assert_eq!(err.kind, ErrorKind::RuleEvaluation);
    assert!(file.rules.error().is_some());
}

#[tokio::test]
async fn empty_member_has_unknown_type() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(tmp.path(), "e.zip", &[("empty.dat", b"")]);

    let report = pipeline(test_config(tmp.path()))
        .triage_archive(&archive)
        .await
        .unwrap();
    let file = &report.files[0];
    assert_eq!(file.size_bytes, 0);
    assert_eq!(file.file_mime_type(), None);
    assert!(file.embedded_files().is_empty());
    assert!(file.errors().is_empty(), "{:?}", file.errors());
}

#[tokio::test]
async fn corrupt_member_rejects_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("crc.zip");
    std::fs::write(&archive, corrupt_member_zip()).unwrap();
    let config = test_config(tmp.path());
    let extract_root = config.storage.extract_dir.clone();

    let err = pipeline(config).triage_archive(&archive).await.unwrap_err();
    assert!(
        matches!(err, TriageError::ArchiveEntry { ref entry, .. } if entry == "ledger.csv"),
        "{err:?}"
    );
    assert!(err.is_fatal());
    assert!(!err.to_string().contains(&*extract_root.to_string_lossy()), "{err}");
    assert_eq!(count_entries(&extract_root), 0);
}

#[tokio::test]
async fn colliding_paths_reject_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(tmp.path(), "clash.zip", &[("a", b"file"), ("a/b", b"nested")]);
    let config = test_config(tmp.path());
    let extract_root = config.storage.extract_dir.clone();

    let err = pipeline(config).triage_archive(&archive).await.unwrap_err();
    assert!(
        matches!(err, TriageError::ArchiveEntry { ref entry, .. } if entry == "a/b"),
        "{err:?}"
    );
    assert!(!err.to_string().contains(&*extract_root.to_string_lossy()), "{err}");
    assert_eq!(count_entries(&extract_root), 0);
}

#[tokio::test]
async fn slow_rule_scan_times_out_and_other_fields_survive() {
    let tmp = tempfile::tempdir().unwrap();
    let heavy = vec![b'a'; 2 * 1024 * 1024];
    let archive = write_zip(
        tmp.path(),
        "slow.zip",
        &[("heavy.txt", heavy.as_slice()), ("pic.png", PNG_1X1)],
    );
    let mut config = test_config(tmp.path());
    config.analysis.rule_timeout_ms = Some(1);
    config.analysis.max_matches_per_string = usize::MAX;
    let rules = triagebox::rules::RuleSet::compile(
        r#"rule pairs { strings: $lit = "aa" $re = /a{2}/ condition: #lit > 0 and #re > 0 }"#,
    )
    .unwrap();
    let pipeline = triagebox::triage::Pipeline::new(
        std::sync::Arc::new(config),
        std::sync::Arc::new(rules),
    );

    let report = pipeline.triage_archive(&archive).await.unwrap();
    assert_eq!(report.len(), 2);

    let heavy = &report.files[0];
    assert_eq!(heavy.file_name, "heavy.txt");
    assert_eq!(heavy.matched_rules(), None);
    let err = heavy.error_for(Analyzer::RuleEngine).expect("timeout recorded");
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(heavy.signatures.value().is_some());
    assert!(heavy.file_type.value().is_some());
    assert_eq!(heavy.errors().len(), 1);

    let pic = &report.files[1];
    assert_eq!(pic.file_mime_type(), Some("image/png"));
    assert_eq!(pic.embedded_files(), &["PNG image".to_string()]);

    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v[0]["matched_yara_rules"], serde_json::Value::Null);
    assert_eq!(v[0]["errors"][0]["analyzer"], "rule_engine");
    assert_eq!(v[0]["errors"][0]["kind"], "timeout");
}

#[tokio::test]
async fn analyzer_io_errors_name_the_archive_path() {
    let tmp = tempfile::tempdir().unwrap();
    let scratch = tmp.path().join("extracted").join("extract-gone");
    let file = triagebox::triage::ExtractedFile {
        relative_path: std::path::PathBuf::from("docs").join("gone.bin"),
        path: scratch.join("docs").join("gone.bin"),
        size_bytes: 0,
    };

    let report = pipeline(test_config(tmp.path())).analyze_file(file).await.unwrap();
    let err = report.error_for(Analyzer::TypeSniffer).expect("sniffer failure recorded");
    assert_eq!(err.kind, ErrorKind::Io);

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("docs/gone.bin"), "{json}");
    assert!(!json.contains(&*scratch.to_string_lossy()), "{json}");
}
