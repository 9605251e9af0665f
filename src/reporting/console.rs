//! # Console Reporting Module / 控制台报告模块
//!
//! Every result the harness produces is a one-line bracketed record on
//! standard output, e.g. `[Success matching program output for dir/test]`.
//! Downstream log aggregation parses these lines, so their text is fixed;
//! colour is only added when standard output is a terminal.
//!
//! 测试框架产生的每个结果都是标准输出上的一行带方括号的记录，
//! 例如 `[Success matching program output for dir/test]`。下游日志聚合会解析这些行，
//! 因此其文本是固定的；仅当标准输出是终端时才添加颜色。

use colored::*;
use std::io::{IsTerminal, Write};

/// Enables colour only for an interactive terminal.
pub fn init_color() {
    colored::control::set_override(std::io::stdout().is_terminal());
}

/// Prints one record, coloured by its status word.
///
/// 打印一条记录，并根据其状态词着色。
pub fn record(line: &str) {
    let status = line
        .find('[')
        .map(|i| &line[i + 1..])
        .unwrap_or(line);
    let colored_line = if status.starts_with("Success") || status.starts_with("Clean match") {
        line.green()
    } else if status.starts_with("Error") {
        line.red()
    } else if status.starts_with("Warning") || status.starts_with("Skipping") {
        line.yellow()
    } else if status.starts_with("Elapsed") || status.starts_with("Executing") {
        line.dimmed()
    } else {
        line.normal()
    };
    println!("{}", colored_line);
}

/// Echoes captured text verbatim, ensuring it ends with a newline.
pub fn echo(text: &str) {
    if text.is_empty() {
        return;
    }
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(text.as_bytes());
    if !text.ends_with('\n') {
        let _ = out.write_all(b"\n");
    }
    let _ = out.flush();
}

/// `[Elapsed ... - X.XXX seconds]`
pub fn elapsed(what: &str, name: &str, secs: f64) {
    record(&format!("[Elapsed {} for \"{}\" - {:.3} seconds]", what, name, secs));
}

/// `[Elapsed time to compile and execute all versions of "<t>" - X.XXX seconds]`
pub fn end_of_test(name: &str, secs: f64) {
    record(&format!(
        "[Elapsed time to compile and execute all versions of \"{}\" - {:.3} seconds]",
        name, secs
    ));
}

pub fn starting(date: &str) {
    record(&format!("[Starting subtest - {}]", date));
}

pub fn finished(localdir: &str, secs: f64) {
    record(&format!("[Finished subtest \"{}\" - {:.3} seconds]", localdir, secs));
}
