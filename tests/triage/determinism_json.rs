use crate::common::*;

fn mixed_archive(dir: &std::path::Path) -> std::path::PathBuf {
    let jpeg = jpeg_with_make();
    let inner = zip_bytes(&[("x.txt", b"x")]);
    write_zip(
        dir,
        "mixed.zip",
        &[
            ("b/photo.jpg", jpeg.as_slice()),
            ("a/pic.png", PNG_1X1),
            ("z.bin", GARBAGE),
            ("nested.zip", inner.as_slice()),
            ("readme.txt", b"plain text that is long enough"),
        ],
    )
}

#[tokio::test]
async fn json_output_is_stable_for_same_input() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = mixed_archive(tmp.path());
    let pipeline = pipeline(test_config(tmp.path()));

    let j1 = pipeline.triage_archive(&archive).await.unwrap().to_json_string().unwrap();
    let j2 = pipeline.triage_archive(&archive).await.unwrap().to_json_string().unwrap();
    assert_eq!(j1, j2, "JSON outputs differ across identical runs");
}

#[tokio::test]
async fn worker_count_does_not_change_output() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = mixed_archive(tmp.path());

    let mut serial = test_config(tmp.path());
    serial.analysis.workers = 1;
    let mut wide = test_config(tmp.path());
    wide.analysis.workers = 8;

    let a = pipeline(serial).triage_archive(&archive).await.unwrap();
    let b = pipeline(wide).triage_archive(&archive).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_json_pretty().unwrap(), b.to_json_pretty().unwrap());

    let names: Vec<&str> = a.files.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["photo.jpg", "pic.png", "z.bin", "nested.zip", "readme.txt"]);
}

#[tokio::test]
async fn field_order_is_fixed() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(tmp.path(), "one.zip", &[("pic.png", PNG_1X1)]);

    let json = pipeline(test_config(tmp.path()))
        .triage_archive(&archive)
        .await
        .unwrap()
        .to_json_string()
        .unwrap();

    let keys = [
        "\"file_name\"",
        "\"file_extension\"",
        "\"file_mime_type\"",
        "\"embedded_files\"",
        "\"exif_data\"",
        "\"matched_yara_rules\"",
    ];
    let positions: Vec<usize> = keys.iter().map(|k| json.find(k).unwrap()).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
}
