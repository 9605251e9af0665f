//! # CLI Tests / 命令行测试
//!
//! Runs the `sub-test` binary against fixture directories and checks the
//! bracketed records it prints and its exit status.
//!
//! 针对测试目录运行 `sub-test` 可执行文件，检查其打印的方括号记录和退出状态。

mod common;

use assert_cmd::prelude::*;
use common::Suite;
use predicates::prelude::*;
use std::process::Command;

fn sub_test(suite: &Suite, extra: &[(&str, &str)]) -> Command {
    let mut cmd = Command::cargo_bin("sub-test").unwrap();
    cmd.current_dir(&suite.dir)
        .env_clear()
        .envs(suite.env(extra))
        .arg(&suite.compiler);
    cmd
}

/// A passing test prints the compile, match and timing records.
///
/// 通过的测试会打印编译、匹配和计时记录。
#[test]
fn test_successful_directory_run() {
    let suite = Suite::new();
    suite
        .file("hello.chpl", "echo hello\n")
        .file("hello.good", "hello\n");

    sub_test(&suite, &[])
        .assert()
        .success()
        .stdout(predicate::str::contains("[Starting subtest - "))
        .stdout(predicate::str::contains("[test: suite/hello.chpl]"))
        .stdout(predicate::str::contains("[Success compiling suite/hello]"))
        .stdout(predicate::str::contains("[Success matching program output for suite/hello]"))
        .stdout(predicate::str::contains(
            "[Elapsed time to compile and execute all versions of \"suite/hello\" - ",
        ));
}

/// Test failures are reported in the log; the exit status stays zero.
///
/// 测试失败只在日志中报告；退出状态仍为零。
#[test]
fn test_mismatch_is_reported_but_exit_is_clean() {
    let suite = Suite::new();
    suite
        .file("hello.chpl", "echo hello\n")
        .file("hello.good", "bonjour\n");

    sub_test(&suite, &[])
        .assert()
        .success()
        .stdout(predicate::str::contains("[Error matching program output for suite/hello]"))
        .stdout(predicate::str::contains("[Executing diff "));
}

#[test]
fn test_missing_compiler_argument_is_usage_error() {
    let suite = Suite::new();
    let mut cmd = Command::cargo_bin("sub-test").unwrap();
    cmd.current_dir(&suite.dir).env_clear().envs(suite.env(&[]));

    cmd.assert().code(2);
}

#[test]
fn test_too_many_arguments_is_usage_error() {
    let suite = Suite::new();
    sub_test(&suite, &[]).arg("extra").assert().code(2);
}

/// Fatal configuration errors exit with 173 and a single error record.
///
/// 致命配置错误以 173 退出，并打印一条错误记录。
#[test]
fn test_invalid_directory_timeout_is_fatal() {
    let suite = Suite::new();
    suite
        .file("TIMEOUT", "soon\n")
        .file("hello.chpl", "echo hello\n");

    sub_test(&suite, &[])
        .assert()
        .code(173)
        .stdout(predicate::str::contains("[Error (sub_test): Invalid integer value in"))
        .stdout(predicate::str::contains("[test: ").not());
}

#[test]
fn test_missing_util_directory_is_fatal() {
    let suite = Suite::new();
    suite.file("hello.chpl", "echo hello\n");

    sub_test(&suite, &[("CHPL_TEST_UTIL_DIR", "/nonexistent/util")])
        .assert()
        .code(173)
        .stdout(predicate::str::contains("[Error (sub_test): Cannot find test util directory"));
}

#[test]
fn test_onetest_limits_discovery() {
    let suite = Suite::new();
    suite
        .file("a.chpl", "echo a\n")
        .file("a.good", "a\n")
        .file("b.chpl", "echo b\n")
        .file("b.good", "b\n");

    sub_test(&suite, &[("CHPL_ONETEST", "b.chpl")])
        .assert()
        .success()
        .stdout(predicate::str::contains("[test: suite/b.chpl]"))
        .stdout(predicate::str::contains("[test: suite/a.chpl]").not());
}

#[test]
fn test_compile_only_skips_execution() {
    let suite = Suite::new();
    suite
        .file("hello.chpl", "echo hello\n")
        .file("hello.good", "hello\n");

    sub_test(&suite, &[("CHPL_COMPONLY", "1")])
        .assert()
        .success()
        .stdout(predicate::str::contains("[Success compiling suite/hello]"))
        .stdout(predicate::str::contains(
            "[Note: Not executing or comparing the output due to -noexec flags]",
        ))
        .stdout(predicate::str::contains("[Executing program").not());
}

#[test]
fn test_system_preexec_is_listed_and_run() {
    let suite = Suite::new();
    suite
        .file("hello.chpl", "echo hello\n")
        .file("hello.good", "hello\n");
    let hook = suite.root.path().join("sys-preexec");
    common::write_executable(&hook, "#!/bin/sh\necho preexec ran for $1 >&2\n");
    let hook_path = hook.display().to_string();

    sub_test(&suite, &[("CHPL_SYSTEM_PREEXEC", &hook_path)])
        .assert()
        .success()
        .stdout(predicate::str::contains("[system-wide preexec(s): '"))
        .stdout(predicate::str::contains("preexec ran for hello"));
}

/// The JSON report mirrors the records printed on the console.
///
/// JSON 报告与控制台打印的记录一致。
#[test]
fn test_json_report_is_written() {
    let suite = Suite::new();
    suite
        .file("hello.chpl", "echo hello\n")
        .file("hello.good", "hello\n")
        .file("bad.chpl", "echo nope\n")
        .file("bad.good", "yes\n");
    let report = suite.root.path().join("report.json");
    let report_path = report.display().to_string();

    sub_test(&suite, &[("CHPL_TEST_JSON_REPORT", &report_path)])
        .assert()
        .success();

    let content = std::fs::read_to_string(&report).expect("report should exist");
    let json: serde_json::Value = serde_json::from_str(&content).expect("report should be JSON");
    assert_eq!(json["directory"], "suite");
    assert_eq!(json["failed"], 1);
    assert_eq!(json["passed"], 3);
    assert_eq!(json["records"].as_array().map(Vec::len), Some(4));
}
