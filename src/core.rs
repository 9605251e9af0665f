//! # Core Module / 核心模块
//!
//! Settings and directory context, per-test configuration resolution, the
//! option matrix, golden-file selection, output classification and the driver
//! that ties them together.
//!
//! 设置与目录上下文、单测试配置解析、选项矩阵、期望输出文件选择、输出分类，
//! 以及将它们串联起来的驱动程序。

pub mod classify;
pub mod compare;
pub mod config;
pub mod errors;
pub mod execution;
pub mod goodfile;
pub mod models;
pub mod planner;
pub mod resolve;
pub mod trials;

// Re-exports
pub use config::{DirectoryContext, Settings};
pub use execution::run_directory;
pub use models::{TestCase, VariantRecord};
