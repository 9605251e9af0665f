//! # JSON Reporting Module / JSON 报告模块
//!
//! Writes every compile and execution outcome of a directory run as one JSON
//! document, for tools that would rather not parse the bracketed log.
//!
//! 将一次目录运行中的所有编译和执行结果写成一个 JSON 文档，供不想解析方括号日志的工具使用。

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::core::models::VariantRecord;

/// Top-level document written to `CHPL_TEST_JSON_REPORT`.
///
/// 写入 `CHPL_TEST_JSON_REPORT` 的顶层文档。
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub directory: &'a str,
    pub compiler: String,
    pub started: DateTime<Local>,
    pub elapsed_secs: f64,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub records: &'a [VariantRecord],
}

impl<'a> JsonReport<'a> {
    pub fn new(
        directory: &'a str,
        compiler: &Path,
        started: DateTime<Local>,
        elapsed_secs: f64,
        records: &'a [VariantRecord],
    ) -> Self {
        let failed = records.iter().filter(|r| r.verdict.is_failure()).count();
        let skipped = records
            .iter()
            .filter(|r| matches!(r.verdict, crate::core::models::Verdict::Skipped { .. }))
            .count();
        Self {
            directory,
            compiler: compiler.display().to_string(),
            started,
            elapsed_secs,
            passed: records.len() - failed - skipped,
            failed,
            skipped,
            records,
        }
    }
}

/// Serializes `report` to `output_path`.
///
/// # Errors / 错误
/// Fails if the report cannot be serialized or the file cannot be written.
pub fn write_json_report(report: &JsonReport<'_>, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize JSON report")?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))
}
