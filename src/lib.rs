//! # Subtest Runner Library / Subtest Runner 库
//!
//! Runs every test in one directory of a compiler's test suite: it discovers
//! the tests, resolves each one's configuration from the files beside it,
//! builds it under every compile-option variant, runs it under every
//! execution-option variant, and compares the output against golden files.
//!
//! 运行编译器测试套件中单个目录的全部测试：发现测试，根据其旁边的文件解析每个测试的配置，
//! 在每个编译选项变体下构建，在每个执行选项变体下运行，并将输出与期望输出文件比较。
//!
//! ## Modules / 模块
//!
//! - `core` - Configuration resolution, the option matrix and the test driver
//! - `infra` - Process execution, hooks, the executable limiter and file helpers
//! - `reporting` - Bracketed console records and the JSON report
//! - `cli` - Command-line entry point
//!
//! - `core` - 配置解析、选项矩阵和测试驱动
//! - `infra` - 进程执行、钩子、可执行程序限流器和文件辅助函数
//! - `reporting` - 方括号控制台记录和 JSON 报告
//! - `cli` - 命令行入口

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::execution;
pub use core::models;
