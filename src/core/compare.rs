//! # Output Comparison Module / 输出比较模块
//!
//! In-process replacements for `diff`: a line diff against the golden file,
//! a byte comparison when either side is not text, and the `.bad` comparison
//! that ignores line numbers inside library module paths.
//!
//! 进程内的 `diff` 替代实现：与期望输出文件逐行比较；任一方不是文本时按字节比较；
//! 以及忽略库模块路径中行号的 `.bad` 比较。

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use similar::TextDiff;
use std::path::Path;

use crate::core::classify;
use crate::reporting::console;

/// `.../modules/<file>.chpl:<line>` in an error location.
static MODULE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(modules/[^\s:]+\.chpl):\d+").expect("Static regex pattern should always compile")
});

/// Unified diff of `expected` against `actual`, or `None` when they are equal.
pub fn diff_text(expected: &str, actual: &str, labels: (&str, &str)) -> Option<String> {
    if expected == actual {
        return None;
    }
    Some(
        TextDiff::from_lines(expected, actual)
            .unified_diff()
            .context_radius(3)
            .header(labels.0, labels.1)
            .to_string(),
    )
}

/// Replaces the line numbers of module-file locations with a placeholder.
pub fn strip_module_line_numbers(text: &str) -> String {
    MODULE_LINE.replace_all(text, "$1:nnnn").into_owned()
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Compares a golden file with a log, echoing the differences.
/// Returns `true` on a match.
///
/// 比较期望输出文件与日志，并回显差异。匹配时返回 `true`。
pub fn compare_files(good: &Path, log: &Path) -> Result<bool> {
    let expected = read(good)?;
    let actual = read(log)?;
    match (std::str::from_utf8(&expected), std::str::from_utf8(&actual)) {
        (Ok(e), Ok(a)) => {
            console::record(&format!("[Executing diff {} {}]", good.display(), log.display()));
            let labels = (good.display().to_string(), log.display().to_string());
            match diff_text(e, a, (&labels.0, &labels.1)) {
                None => Ok(true),
                Some(diff) => {
                    console::echo(&classify::trim_output(diff.as_bytes()));
                    Ok(false)
                }
            }
        }
        _ => {
            console::record(&format!(
                "[Executing binary diff {} {}]",
                good.display(),
                log.display()
            ));
            let matched = expected == actual;
            if !matched {
                console::echo("Binary files differed");
            }
            Ok(matched)
        }
    }
}

/// Compares an expected-bad file with a log, ignoring module line numbers.
pub fn compare_bad_files(bad: &Path, log: &Path) -> Result<bool> {
    console::record(&format!(
        "[Executing diff-ignoring-module-line-numbers {} {}]",
        bad.display(),
        log.display()
    ));
    let expected = strip_module_line_numbers(&String::from_utf8_lossy(&read(bad)?));
    let actual = strip_module_line_numbers(&String::from_utf8_lossy(&read(log)?));
    let labels = (bad.display().to_string(), log.display().to_string());
    match diff_text(&expected, &actual, (&labels.0, &labels.1)) {
        None => Ok(true),
        Some(diff) => {
            console::echo(&diff);
            Ok(false)
        }
    }
}
