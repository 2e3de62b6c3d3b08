use crate::common::*;
use serde_json::json;

#[tokio::test]
async fn png_and_garbage_produce_two_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "case.zip",
        &[("photo.png", PNG_1X1), ("notes.bin", GARBAGE)],
    );
    let config = test_config(tmp.path());
    let extract_root = config.storage.extract_dir.clone();

    let report = pipeline(config).triage_archive(&archive).await.unwrap();
    assert_eq!(report.len(), 2);

    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(
        v,
        json!([
            {
                "file_name": "photo.png",
                "file_extension": "png",
                "file_mime_type": "image/png",
                "embedded_files": ["PNG image"],
                "exif_data": {},
                "matched_yara_rules": ["png_header"]
            },
            {
                "file_name": "notes.bin",
                "file_extension": null,
                "file_mime_type": null,
                "embedded_files": [],
                "exif_data": {},
                "matched_yara_rules": ["tiny_file"]
            }
        ])
    );

    assert_eq!(count_entries(&extract_root), 0, "scratch directory left behind");
}

#[tokio::test]
async fn nested_directories_count_only_regular_files() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        "tree.zip",
        &[
            ("docs/", b""),
            ("docs/a.txt", b"first file with enough text"),
            ("docs/sub/", b""),
            ("docs/sub/b.txt", b"second file with enough text"),
            ("c.txt", b"third file with enough text"),
        ],
    );

    let report = pipeline(test_config(tmp.path()))
        .triage_archive(&archive)
        .await
        .unwrap();

    let paths: Vec<&str> = report.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["docs/a.txt", "docs/sub/b.txt", "c.txt"]);
    let names: Vec<&str> = report.files.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    for file in &report.files {
        assert!(file.errors().is_empty(), "{:?}", file.errors());
        assert_eq!(file.matched_rules(), None);
    }
}

#[tokio::test]
async fn inner_archives_are_reported_not_expanded() {
    let tmp = tempfile::tempdir().unwrap();
    let inner = zip_bytes(&[("deep.txt", b"hidden")]);
    let archive = write_zip(tmp.path(), "outer.zip", &[("inner.zip", &inner)]);

    let report = pipeline(test_config(tmp.path()))
        .triage_archive(&archive)
        .await
        .unwrap();

    assert_eq!(report.len(), 1);
    let file = &report.files[0];
    assert_eq!(file.file_mime_type(), Some("application/zip"));
    assert_eq!(
        file.embedded_files(),
        &["ZIP archive or Microsoft Office Open XML (DOCX, XLSX, PPTX)".to_string()]
    );
}

#[tokio::test]
async fn jpeg_metadata_reaches_report() {
    let tmp = tempfile::tempdir().unwrap();
    let jpeg = jpeg_with_make();
    let archive = write_zip(tmp.path(), "dcim.zip", &[("DCIM/IMG_0001.JPG", &jpeg)]);

    let report = pipeline(test_config(tmp.path()))
        .triage_archive(&archive)
        .await
        .unwrap();

    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v[0]["file_name"], "IMG_0001.JPG");
    assert_eq!(v[0]["file_mime_type"], "image/jpeg");
    assert_eq!(v[0]["exif_data"]["Make"], "Canon");
    assert_eq!(v[0]["embedded_files"], json!(["JPEG image"]));
}

#[tokio::test]
async fn content_wins_over_file_name() {
    let tmp = tempfile::tempdir().unwrap();
    let elf = b"\x7FELF\x02\x01\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x02\x00\x3E\x00";
    let archive = write_zip(tmp.path(), "mail.zip", &[("invoice.pdf", elf)]);

    let report = pipeline(test_config(tmp.path()))
        .triage_archive(&archive)
        .await
        .unwrap();

    let file = &report.files[0];
    assert_eq!(file.file_name, "invoice.pdf");
    assert_eq!(file.file_extension(), Some("elf"));
    assert_eq!(file.embedded_files(), &["Linux ELF Executable".to_string()]);
}

#[tokio::test]
async fn empty_archive_yields_empty_report() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(tmp.path(), "empty.zip", &[]);

    let report = pipeline(test_config(tmp.path()))
        .triage_archive(&archive)
        .await
        .unwrap();

    assert!(report.is_empty());
    assert_eq!(report.to_json_string().unwrap(), "[]");
}
