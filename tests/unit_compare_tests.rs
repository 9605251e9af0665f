//! # Output Comparison Unit Tests / 输出比较单元测试

use std::fs;
use subtest_runner::core::compare::{compare_bad_files, compare_files, diff_text, strip_module_line_numbers};
use tempfile::tempdir;

#[test]
fn test_equal_texts_have_no_diff() {
    assert_eq!(diff_text("a\nb\n", "a\nb\n", ("good", "log")), None);
}

#[test]
fn test_diff_shows_both_sides() {
    let diff = diff_text("expected line\n", "actual line\n", ("t.good", "t.exec.out.tmp")).unwrap();
    assert!(diff.contains("--- t.good"));
    assert!(diff.contains("+++ t.exec.out.tmp"));
    assert!(diff.contains("-expected line"));
    assert!(diff.contains("+actual line"));
}

#[test]
fn test_module_line_numbers_are_masked() {
    assert_eq!(
        strip_module_line_numbers("/home/modules/standard/IO.chpl:123: error: bad\nt.chpl:4: note\n"),
        "/home/modules/standard/IO.chpl:nnnn: error: bad\nt.chpl:4: note\n"
    );
}

#[test]
fn test_compare_files_on_disk() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("t.good");
    let log = dir.path().join("t.exec.out.tmp");
    fs::write(&good, "same\n").unwrap();
    fs::write(&log, "same\n").unwrap();
    assert!(compare_files(&good, &log).unwrap());

    fs::write(&log, "different\n").unwrap();
    assert!(!compare_files(&good, &log).unwrap());
}

#[test]
fn test_binary_files_compare_bytewise() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("t.good");
    let log = dir.path().join("t.log");
    fs::write(&good, [0xff, 0xfe, 0x00]).unwrap();
    fs::write(&log, [0xff, 0xfe, 0x00]).unwrap();
    assert!(compare_files(&good, &log).unwrap());

    fs::write(&log, [0xff, 0xfe, 0x01]).unwrap();
    assert!(!compare_files(&good, &log).unwrap());
}

#[test]
fn test_bad_file_comparison_ignores_module_lines() {
    let dir = tempdir().unwrap();
    let bad = dir.path().join("t.bad");
    let log = dir.path().join("t.log");
    fs::write(&bad, "$CHPL_HOME/modules/internal/A.chpl:10: error\n").unwrap();
    fs::write(&log, "$CHPL_HOME/modules/internal/A.chpl:42: error\n").unwrap();
    assert!(compare_bad_files(&bad, &log).unwrap());

    fs::write(&log, "$CHPL_HOME/modules/internal/A.chpl:42: warning\n").unwrap();
    assert!(!compare_bad_files(&bad, &log).unwrap());
}

#[test]
fn test_missing_good_file_is_an_error() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("t.log");
    fs::write(&log, "x").unwrap();
    assert!(compare_files(&dir.path().join("absent.good"), &log).is_err());
}
