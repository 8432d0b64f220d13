mod common;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use common::write_delivery;

use cdr::audio::{check_archive, list_directory, select_archives};

#[test]
fn test_conforming_delivery_passes() {
    let dir = TempDir::new().unwrap();
    let paths = ["Week_2024_15/1234_en.mp3", "Week_2024_15/1234_es.mp3"];
    let archive = write_delivery(dir.path(), "Week_2024_15.zip", &paths, &paths);

    let report = check_archive(&archive).unwrap();
    assert!(report.is_ok(), "{:?}", report.problems);
    assert_eq!(report.workbook.as_deref(), Some("Week_2024_15/Week_2024_15.xlsx"));
    assert_eq!(report.mp3_paths, paths);
}

#[test]
fn test_badly_named_mp3_is_reported() {
    let dir = TempDir::new().unwrap();
    let listed = ["Week_2024_15/1234_en.mp3"];
    let archive = write_delivery(
        dir.path(),
        "Week_2024_15.zip",
        &listed,
        &["Week_2024_15/1234_en.mp3", "Week_2024_15/bad name.mp3"],
    );

    let report = check_archive(&archive).unwrap();
    assert!(!report.is_ok());
    assert!(report
        .problems
        .iter()
        .any(|p| p.starts_with("Week_2024_15/bad name.mp3") && p.contains("MP3 path rule")));
    assert!(report
        .problems
        .iter()
        .any(|p| p == "Week_2024_15/bad name.mp3: in archive but not listed in workbook"));
}

#[test]
fn test_workbook_and_archive_disagree() {
    let dir = TempDir::new().unwrap();
    let archive = write_delivery(
        dir.path(),
        "Week_2024_16_Rev1.zip",
        &["Week_2024_16_Rev1/55_en.mp3", "Week_2024_16_Rev1/56_en.mp3"],
        &["Week_2024_16_Rev1/55_en.mp3"],
    );

    let report = check_archive(&archive).unwrap();
    assert_eq!(
        report.problems,
        vec!["Week_2024_16_Rev1/56_en.mp3: listed in workbook but not in archive".to_string()]
    );
}

#[test]
fn test_directory_selection_skips_nonconforming_names() {
    let dir = TempDir::new().unwrap();
    write_delivery(dir.path(), "Week_2024_15.zip", &[], &[]);
    write_delivery(dir.path(), "week_2024_14_Rev2.zip", &[], &[]);
    dir.child("notes.zip").write_binary(b"PK").unwrap();
    dir.child("readme.txt").write_str("not an archive").unwrap();

    let selection = select_archives(list_directory(dir.path()).unwrap());
    assert_eq!(selection.accepted, vec!["week_2024_14_Rev2.zip", "Week_2024_15.zip"]);
    assert_eq!(selection.rejected, vec!["notes.zip"]);
}
