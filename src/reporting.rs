//! # Reporting Module / 报告模块
//!
//! Results are reported as bracketed one-line records on standard output and,
//! when requested, as a JSON document.
//!
//! 结果以标准输出上的单行方括号记录报告；如有需要，也会写成 JSON 文档。

pub mod console;
pub mod json;

pub use json::{JsonReport, write_json_report};
